//! Boundary with external event producers.
//!
//! A producer such as a UI control exposes its native events through
//! [`EventSource`]. An [`EventObserver`] registers with the producer, turns
//! each native event into a `send_next` on its Signal, and unregisters when
//! it is disposed or dropped.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::{disposable::Disposable, signal::Signal};

pub type EventCallback<E> = Box<dyn Fn(&E) + Send + Sync>;

/// A producer of native events that callbacks can be registered with.
pub trait EventSource<E>: Send + Sync {
    type Registration: Send + Sync + 'static;

    fn register(&self, callback: EventCallback<E>) -> Self::Registration;

    fn unregister(&self, registration: Self::Registration);
}

/// Forwards the events of an [`EventSource`] into a [`Signal`].
pub struct EventObserver<E: 'static, S: EventSource<E>> {
    source: Arc<S>,
    registration: Mutex<Option<S::Registration>>,
    signal: Signal<E>,
}

impl<E, S> EventObserver<E, S>
where
    E: Clone + 'static,
    S: EventSource<E>,
{
    pub fn new(source: Arc<S>) -> Self {
        let signal: Signal<E> = Signal::new();
        let target = signal.downgrade();
        let registration = source.register(Box::new(move |event: &E| {
            target.send_next(event.clone());
        }));
        Self {
            source,
            registration: Mutex::new(Some(registration)),
            signal,
        }
    }

    /// The Signal the producer's events are sent to.
    pub fn signal(&self) -> Signal<E> {
        self.signal.clone()
    }

    pub fn is_observing(&self) -> bool {
        self.registration.lock().is_some()
    }
}

impl<E: 'static, S: EventSource<E>> fmt::Debug for EventObserver<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EventObserver");
        s.field("observing", &self.registration.lock().is_some());
        s.field("signal", &self.signal);
        s.finish()
    }
}

impl<E: 'static, S: EventSource<E>> Disposable for EventObserver<E, S> {
    fn dispose(&self) {
        let registration = self.registration.lock().take();
        if let Some(registration) = registration {
            tracing::trace!("event observer unregistered");
            self.source.unregister(registration);
        }
    }
}

impl<E: 'static, S: EventSource<E>> Drop for EventObserver<E, S> {
    fn drop(&mut self) {
        self.dispose();
    }
}
