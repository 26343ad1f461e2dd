//! The dispose-list mixin every filesystem composes.
//!
//! A [`DisposeBag`] tracks attached sub-disposables (most commonly an
//! [`ObserverList`]) and releases them on teardown, aggregating whatever
//! errors teardown produces. This mirrors a base-session teardown pattern —
//! a list of cleanup hooks run once on shutdown — generalized to an
//! arbitrary disposable.

use parking_lot::Mutex;

use crate::error::{VfsError, VfsResult};
use crate::observer::ObserverList;

/// Something that releases a resource exactly once.
pub trait Disposable: Send + Sync {
    /// Release the resource. Implementations must tolerate being called
    /// more than once (idempotent).
    fn dispose(&self) -> VfsResult<()>;
}

impl Disposable for ObserverList {
    fn dispose(&self) -> VfsResult<()> {
        self.dispose_all();
        Ok(())
    }
}

/// A collection of [`Disposable`]s released together, in attachment order,
/// on [`DisposeBag::dispose_all`]. Every concrete filesystem in this crate
/// embeds one for any auxiliary disposables beyond its own
/// [`ObserverList`], which it tears down alongside the bag on `Drop`.
#[derive(Default)]
pub struct DisposeBag {
    children: Mutex<Vec<Box<dyn Disposable>>>,
    disposed: std::sync::atomic::AtomicBool,
}

impl DisposeBag {
    /// An empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self { children: Mutex::new(Vec::new()), disposed: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Attach a disposable to be released on teardown.
    pub fn attach(&self, disposable: Box<dyn Disposable>) {
        self.children.lock().push(disposable);
    }

    /// True once [`DisposeBag::dispose_all`] has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Release every attached disposable, in attachment order, collecting
    /// any failures into a single [`VfsError::Aggregate`]. Idempotent: a
    /// second call is a no-op.
    pub fn dispose_all(&self) -> VfsResult<()> {
        if self.disposed.swap(true, std::sync::atomic::Ordering::AcqRel) {
            return Ok(());
        }
        let children = std::mem::take(&mut *self.children.lock());
        let mut errors = Vec::new();
        for child in children {
            if let Err(err) = child.dispose() {
                errors.push(err);
            }
        }
        VfsError::aggregate(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_all_is_idempotent() {
        let bag = DisposeBag::new();
        let list = ObserverList::new();
        bag.attach(Box::new(list));
        assert!(bag.dispose_all().is_ok());
        assert!(bag.is_disposed());
        assert!(bag.dispose_all().is_ok());
    }
}
