use std::{
    fmt,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    bag::{Bag, Token},
    disposable::Disposable,
    scheduler::{Queue, Scheduler},
};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// The internal Signal where the observers and the disposable source are
/// stored.
struct SignalInner<T> {
    observers: Mutex<Bag<Observer<T>>>,
    source: Mutex<Option<Box<dyn Disposable>>>,
}

/// A typed event source that broadcasts every value it is sent to its
/// observers.
///
/// Cloning a `Signal` creates a new handle to the same observer set.
///
/// Disposing a Signal disposes its disposable source only. For a Signal
/// produced by an operator, that cuts it off from upstream and cascades the
/// disposal up the chain. The Signal's own observers are left registered and
/// it can still be sent values directly; remove them through their
/// [`ObserverHandle`]s or a [`DisposableBag`](crate::DisposableBag).
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Eq for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Signal");
        s.field("observers", &self.observer_count());
        s.field("has_source", &self.inner.source.lock().is_some());
        s.finish()
    }
}

impl<T> Signal<T> {
    /// Create a Signal with no observers and no disposable source.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                observers: Mutex::new(Bag::new()),
                source: Mutex::new(None),
            }),
        }
    }

    /// Sends `value` to every observer registered at the time of the call.
    ///
    /// The observer set is snapshotted before delivery, so observers may add
    /// or dispose observers, or send further values, while being notified.
    pub fn send_next(&self, value: T) {
        let observers: SmallVec<[Observer<T>; 4]> =
            self.inner.observers.lock().values().cloned().collect();
        tracing::trace!(observers = observers.len(), "send next");
        for observer in observers {
            observer(&value);
        }
    }

    /// Sends `value` asynchronously on `queue` instead of on the calling
    /// thread.
    pub fn send_next_on(&self, value: T, queue: Queue)
    where
        T: Send + 'static,
    {
        let signal = self.clone();
        Scheduler::new(queue).run_async(move || signal.send_next(value));
    }

    /// Registers `observer`. Disposing the returned handle removes exactly
    /// this registration.
    pub fn add_observer(
        &self,
        observer: impl Fn(&T) + Send + Sync + 'static,
    ) -> ObserverHandle<T> {
        let token = self.inner.observers.lock().insert_item(Arc::new(observer));
        tracing::trace!(%token, "observer added");
        ObserverHandle {
            signal: Arc::downgrade(&self.inner),
            token,
        }
    }

    /// Registers `observer` and returns this Signal, for chaining.
    pub fn next(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.add_observer(observer);
        self.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Sets the Disposable that is disposed together with this Signal,
    /// replacing any previous one without disposing it.
    pub fn set_disposable_source(&self, source: impl Disposable + 'static) {
        *self.inner.source.lock() = Some(Box::new(source));
    }

    pub fn has_disposable_source(&self) -> bool {
        self.inner.source.lock().is_some()
    }

    pub(crate) fn downgrade(&self) -> WeakSignal<T> {
        WeakSignal {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Registers an observer that hands each value to `forward` together with
    /// `target`. Once `target` has been dropped the observer removes itself
    /// on the next value instead of forwarding it.
    pub(crate) fn add_forwarding_observer<U>(
        &self,
        target: WeakSignal<U>,
        forward: impl Fn(&WeakSignal<U>, &T) + Send + Sync + 'static,
    ) -> ObserverHandle<T>
    where
        T: 'static,
        U: 'static,
    {
        let registration: Arc<Mutex<Option<ObserverHandle<T>>>> = Arc::new(Mutex::new(None));
        let handle = self.add_observer({
            let registration = registration.clone();
            move |value| {
                if target.is_alive() {
                    forward(&target, value);
                    return;
                }
                let handle = registration.lock().take();
                if let Some(handle) = handle {
                    tracing::trace!(token = %handle.token, "pruning observer of dropped signal");
                    handle.dispose();
                }
            }
        });
        *registration.lock() = Some(handle.clone());
        handle
    }
}

impl<T> Disposable for Signal<T> {
    fn dispose(&self) {
        let source = self.inner.source.lock().take();
        if let Some(source) = source {
            source.dispose();
        }
    }
}

/// A non-owning reference to a Signal, used by upstream observers so that a
/// derived Signal is owned only by whoever holds it.
pub(crate) struct WeakSignal<T> {
    inner: Weak<SignalInner<T>>,
}

impl<T> Clone for WeakSignal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakSignal<T> {
    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Signal<T>> {
        self.inner.upgrade().map(|inner| Signal { inner })
    }

    /// Sends `value` if the Signal is still alive.
    pub(crate) fn send_next(&self, value: T) {
        if let Some(signal) = self.upgrade() {
            signal.send_next(value);
        }
    }
}

/// The Disposable returned by [`Signal::add_observer`].
///
/// Dropping the handle keeps the observer registered.
pub struct ObserverHandle<T> {
    signal: Weak<SignalInner<T>>,
    token: Token,
}

impl<T> Clone for ObserverHandle<T> {
    fn clone(&self) -> Self {
        Self {
            signal: self.signal.clone(),
            token: self.token,
        }
    }
}

impl<T> ObserverHandle<T> {
    pub fn token(&self) -> Token {
        self.token
    }
}

impl<T> fmt::Debug for ObserverHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ObserverHandle");
        s.field("token", &self.token);
        s.finish()
    }
}

impl<T> Disposable for ObserverHandle<T> {
    fn dispose(&self) {
        if let Some(signal) = self.signal.upgrade() {
            let removed = signal.observers.lock().remove_item(&self.token);
            if removed.is_some() {
                tracing::trace!(token = %self.token, "observer removed");
            }
        }
    }
}
