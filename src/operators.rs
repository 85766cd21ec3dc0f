//! Operators that derive a new Signal from an existing one.
//!
//! Every derived Signal observes its source through a weak reference, so it
//! is owned solely by whoever holds it. Its disposable source is a link that
//! removes that observer from the source and then disposes the source,
//! which cascades the disposal to the root of the chain.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    disposable::{ActionDisposable, Disposable},
    scheduler::{Queue, Scheduler, TimerToken},
    signal::{ObserverHandle, Signal, WeakSignal},
};

struct Debounce<T> {
    pending: TimerToken,
    value: Option<T>,
}

struct Latest<A, B> {
    left: Option<A>,
    right: Option<B>,
}

impl<A: Clone, B: Clone> Latest<A, B> {
    fn pair(&self) -> Option<(A, B)> {
        Some((self.left.clone()?, self.right.clone()?))
    }
}

impl<T: 'static> Signal<T> {
    fn derive<U: 'static>(
        &self,
        forward: impl Fn(&WeakSignal<U>, &T) + Send + Sync + 'static,
        teardown: impl FnOnce() + Send + 'static,
    ) -> Signal<U> {
        let derived: Signal<U> = Signal::new();
        let handle = self.add_forwarding_observer(derived.downgrade(), forward);
        let upstream = self.clone();
        derived.set_disposable_source(ActionDisposable::new(move || {
            handle.dispose();
            teardown();
            upstream.dispose();
        }));
        derived
    }

    /// Emits `transform(value)` for every value sent upstream.
    pub fn map<U: 'static>(
        &self,
        transform: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Signal<U> {
        self.derive(
            move |target, value| target.send_next(transform(value)),
            || {},
        )
    }

    /// Re-emits the values for which `predicate` holds.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Signal<T>
    where
        T: Clone,
    {
        self.derive(
            move |target, value| {
                if predicate(value) {
                    target.send_next(value.clone());
                }
            },
            || {},
        )
    }

    /// Drops the first `count` values, then re-emits every value after them.
    pub fn skip(&self, count: usize) -> Signal<T>
    where
        T: Clone,
    {
        let remaining = Mutex::new(count);
        self.derive(
            move |target, value| {
                {
                    let mut remaining = remaining.lock();
                    if *remaining > 0 {
                        *remaining -= 1;
                        return;
                    }
                }
                target.send_next(value.clone());
            },
            || {},
        )
    }

    /// Suppresses a value equal to the one emitted just before it.
    pub fn distinct(&self) -> Signal<T>
    where
        T: Clone + PartialEq + Send,
    {
        let last: Mutex<Option<T>> = Mutex::new(None);
        self.derive(
            move |target, value| {
                {
                    let mut last = last.lock();
                    if last.as_ref() == Some(value) {
                        return;
                    }
                    *last = Some(value.clone());
                }
                target.send_next(value.clone());
            },
            || {},
        )
    }

    /// Re-emits every value on `queue`.
    ///
    /// Values keep their relative order, since each queue runs its work
    /// first in, first out. Deliveries still queued when the derived Signal
    /// is disposed are discarded.
    pub fn observe_on(&self, queue: Queue) -> Signal<T>
    where
        T: Clone + Send,
    {
        let scheduler = Scheduler::new(queue);
        let alive = Arc::new(AtomicBool::new(true));
        self.derive(
            {
                let alive = alive.clone();
                move |target, value| {
                    let target = target.clone();
                    let value = value.clone();
                    let alive = alive.clone();
                    scheduler.run_async(move || {
                        if alive.load(Ordering::Acquire) {
                            target.send_next(value);
                        }
                    });
                }
            },
            move || alive.store(false, Ordering::Release),
        )
    }

    /// Emits a value only once no newer value has arrived for `interval`.
    ///
    /// Each upstream value cancels the pending emission and schedules a new
    /// one on the main queue, so a burst of values faster than `interval`
    /// yields only its last value.
    pub fn debounce(&self, interval: Duration) -> Signal<T>
    where
        T: Clone + Send,
    {
        let scheduler = Scheduler::new(Queue::Main);
        let state = Arc::new(Mutex::new(Debounce {
            pending: TimerToken::INVALID,
            value: None,
        }));

        let teardown = {
            let state = state.clone();
            move || {
                let mut debounce = state.lock();
                scheduler.cancel(debounce.pending);
                debounce.pending = TimerToken::INVALID;
                debounce.value = None;
            }
        };

        self.derive(
            move |target, value| {
                // the lock is held while scheduling so the timer can't observe
                // a stale pending token
                let mut debounce = state.lock();
                scheduler.cancel(debounce.pending);
                debounce.value = Some(value.clone());

                let target = target.clone();
                let state = state.clone();
                debounce.pending = scheduler.delay(interval, move |token| {
                    let value = {
                        let mut debounce = state.lock();
                        if debounce.pending != token {
                            return;
                        }
                        debounce.pending = TimerToken::INVALID;
                        debounce.value.take()
                    };
                    if let Some(value) = value {
                        target.send_next(value);
                    }
                });
            },
            teardown,
        )
    }

    /// Re-emits every value on the main queue, each shifted by `interval`.
    ///
    /// Nothing is suppressed. Pending emissions are cancelled when the
    /// derived Signal is disposed.
    pub fn delay(&self, interval: Duration) -> Signal<T>
    where
        T: Clone + Send,
    {
        let scheduler = Scheduler::new(Queue::Main);
        let pending: Arc<Mutex<HashSet<TimerToken>>> = Arc::new(Mutex::new(HashSet::new()));

        let teardown = {
            let pending = pending.clone();
            move || {
                let tokens: Vec<_> = pending.lock().drain().collect();
                for token in tokens {
                    scheduler.cancel(token);
                }
            }
        };

        self.derive(
            move |target, value| {
                let mut tokens = pending.lock();
                let target = target.clone();
                let value = value.clone();
                let fired = pending.clone();
                let token = scheduler.delay(interval, move |token| {
                    if fired.lock().remove(&token) {
                        target.send_next(value);
                    }
                });
                if token != TimerToken::INVALID {
                    tokens.insert(token);
                }
            },
            teardown,
        )
    }

    /// Forwards every value into `other`.
    ///
    /// `other` is referenced weakly. Disposing the returned handle stops the
    /// forwarding.
    pub fn bind_to(&self, other: &Signal<T>) -> ObserverHandle<T>
    where
        T: Clone,
    {
        self.add_forwarding_observer(other.downgrade(), |target, value: &T| {
            target.send_next(value.clone())
        })
    }

    /// Emits the latest value of each side whenever either side emits, once
    /// both have emitted at least once.
    pub fn combine_latest_with<U>(&self, other: &Signal<U>) -> Signal<(T, U)>
    where
        T: Clone + Send,
        U: Clone + Send + 'static,
    {
        let combined: Signal<(T, U)> = Signal::new();
        let latest = Arc::new(Mutex::new(Latest {
            left: None,
            right: None,
        }));

        let left = {
            let latest = latest.clone();
            self.add_forwarding_observer(combined.downgrade(), move |target, value: &T| {
                let pair = {
                    let mut latest = latest.lock();
                    latest.left = Some(value.clone());
                    latest.pair()
                };
                if let Some(pair) = pair {
                    target.send_next(pair);
                }
            })
        };

        let right = other.add_forwarding_observer(combined.downgrade(), move |target, value: &U| {
            let pair = {
                let mut latest = latest.lock();
                latest.right = Some(value.clone());
                latest.pair()
            };
            if let Some(pair) = pair {
                target.send_next(pair);
            }
        });

        let (left_upstream, right_upstream) = (self.clone(), other.clone());
        combined.set_disposable_source(ActionDisposable::new(move || {
            left.dispose();
            right.dispose();
            left_upstream.dispose();
            right_upstream.dispose();
        }));
        combined
    }
}

impl<T: 'static> Signal<(T, T)> {
    /// Emits whether `predicate` holds for both elements of each pair.
    pub fn all_equal(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Signal<bool> {
        self.map(move |(left, right): &(T, T)| predicate(left) && predicate(right))
    }

    /// Emits whether `predicate` holds for at least one element of each pair.
    pub fn some_equal(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Signal<bool> {
        self.map(move |(left, right): &(T, T)| predicate(left) || predicate(right))
    }
}
