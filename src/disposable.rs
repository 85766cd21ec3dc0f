use std::{fmt, sync::Arc};

use parking_lot::Mutex;

use crate::bag::Bag;

/// Anything that holds a releasable resource.
///
/// `dispose` must be idempotent: the resource is released by the first call
/// and every later call is a no-op.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

impl<D: Disposable + ?Sized> Disposable for Arc<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

impl<D: Disposable + ?Sized> Disposable for Box<D> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

/// A Disposable that runs a closure the first time it is disposed.
pub struct ActionDisposable {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ActionDisposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.action.lock().is_none()
    }
}

impl fmt::Debug for ActionDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("ActionDisposable");
        s.field("disposed", &self.is_disposed());
        s.finish()
    }
}

impl Disposable for ActionDisposable {
    fn dispose(&self) {
        // take the action before running it, it may re-enter
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }
}

/// Aggregates disposables so they can be torn down together.
///
/// Disposing the bag, or dropping it, disposes every item it holds exactly
/// once. Items added after the bag was disposed are kept until the next
/// disposal.
#[derive(Default)]
pub struct DisposableBag {
    disposables: Mutex<Bag<Box<dyn Disposable>>>,
}

impl DisposableBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, disposable: impl Disposable + 'static) {
        self.disposables.lock().insert_item(Box::new(disposable));
    }

    pub fn len(&self) -> usize {
        self.disposables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposables.lock().is_empty()
    }
}

impl fmt::Debug for DisposableBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("DisposableBag");
        s.field("len", &self.len());
        s.finish()
    }
}

impl Disposable for DisposableBag {
    fn dispose(&self) {
        let disposables: Vec<_> = self.disposables.lock().drain().collect();
        tracing::trace!(count = disposables.len(), "disposing bag");
        for disposable in disposables {
            disposable.dispose();
        }
    }
}

impl Drop for DisposableBag {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Sugar for anchoring a Disposable to the lifetime of a [`DisposableBag`].
pub trait DisposeWith: Disposable + Sized + 'static {
    fn dispose_with(self, bag: &DisposableBag) {
        bag.add(self);
    }
}

impl<D: Disposable + 'static> DisposeWith for D {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn action_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let disposable = ActionDisposable::new({
            let count = count.clone();
            move || {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert!(!disposable.is_disposed());
        disposable.dispose();
        disposable.dispose();
        assert!(disposable.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bag_disposes_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        {
            let bag = DisposableBag::new();
            for _ in 0..3 {
                let count = count.clone();
                ActionDisposable::new(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .dispose_with(&bag);
            }
            assert_eq!(bag.len(), 3);
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
