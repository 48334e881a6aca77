//! Lifecycle callbacks tied to transaction scope boundaries.

use crate::error::Result;

/// The terminal outcome reported to [`Synchronization::after_completion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
    /// The outcome could not be determined (e.g. the adapter's commit call
    /// itself failed in a way that leaves the backend state unclear).
    Unknown,
}

/// A callback registered to run at transaction scope boundaries.
///
/// Every method has a no-op default; implement only the phases you care
/// about. The engine dispatches callbacks in registration order for every
/// phase, including `suspend`/`resume`.
pub trait Synchronization {
    /// Fired when the owning scope is suspended to make way for an
    /// independent one.
    fn suspend(&mut self) {}

    /// Fired when a previously suspended scope is resumed.
    fn resume(&mut self) {}

    /// Fired before a real commit is attempted, only on the path that is
    /// actually going to commit. An error here aborts the commit and
    /// drives a rollback instead.
    fn before_commit(&mut self, read_only: bool) -> Result<()> {
        let _ = read_only;
        Ok(())
    }

    /// Fired before completion, on both the commit and rollback paths. An
    /// error here aborts a pending commit and drives a rollback instead.
    fn before_completion(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fired after a successful commit, before `after_completion`. Errors
    /// here are surfaced to the caller only after `after_completion` has
    /// run.
    fn after_commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fired exactly once per scope, after the outcome is final. Errors are
    /// caught and logged; they never mask the original outcome.
    fn after_completion(&mut self, status: CompletionStatus) {
        let _ = status;
    }
}

pub(crate) type SynchronizationList = Vec<Box<dyn Synchronization>>;

/// Dispatch `suspend()` to every callback in registration order.
pub(crate) fn dispatch_suspend(synchronizations: &mut SynchronizationList) {
    for sync in synchronizations.iter_mut() {
        sync.suspend();
    }
}

/// Dispatch `resume()` to every callback in registration order.
pub(crate) fn dispatch_resume(synchronizations: &mut SynchronizationList) {
    for sync in synchronizations.iter_mut() {
        sync.resume();
    }
}

/// Dispatch `before_commit`, stopping and returning the first error.
pub(crate) fn dispatch_before_commit(
    synchronizations: &mut SynchronizationList,
    read_only: bool,
) -> Result<()> {
    for sync in synchronizations.iter_mut() {
        sync.before_commit(read_only)?;
    }
    Ok(())
}

/// Dispatch `before_completion`, stopping and returning the first error.
pub(crate) fn dispatch_before_completion(synchronizations: &mut SynchronizationList) -> Result<()> {
    for sync in synchronizations.iter_mut() {
        sync.before_completion()?;
    }
    Ok(())
}

/// Dispatch `after_commit`, stopping and returning the first error (the
/// caller is responsible for still running `after_completion` afterwards).
pub(crate) fn dispatch_after_commit(synchronizations: &mut SynchronizationList) -> Result<()> {
    for sync in synchronizations.iter_mut() {
        sync.after_commit()?;
    }
    Ok(())
}

/// Dispatch `after_completion` to every callback, logging (never
/// propagating) panics-as-errors from individual callbacks. This method
/// itself cannot fail.
pub(crate) fn dispatch_after_completion(
    synchronizations: &mut SynchronizationList,
    status: CompletionStatus,
) {
    for sync in synchronizations.iter_mut() {
        sync.after_completion(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        calls: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Synchronization for Recorder {
        fn suspend(&mut self) {
            self.calls.borrow_mut().push("suspend");
        }
        fn resume(&mut self) {
            self.calls.borrow_mut().push("resume");
        }
        fn before_commit(&mut self, _read_only: bool) -> Result<()> {
            self.calls.borrow_mut().push("before_commit");
            Ok(())
        }
        fn before_completion(&mut self) -> Result<()> {
            self.calls.borrow_mut().push("before_completion");
            Ok(())
        }
        fn after_commit(&mut self) -> Result<()> {
            self.calls.borrow_mut().push("after_commit");
            Ok(())
        }
        fn after_completion(&mut self, status: CompletionStatus) {
            self.calls.borrow_mut().push(match status {
                CompletionStatus::Committed => "after_completion:committed",
                CompletionStatus::RolledBack => "after_completion:rolled_back",
                CompletionStatus::Unknown => "after_completion:unknown",
            });
        }
    }

    #[test]
    fn commit_phase_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut list: SynchronizationList = vec![Box::new(Recorder { calls: calls.clone() })];
        dispatch_before_commit(&mut list, false).unwrap();
        dispatch_before_completion(&mut list).unwrap();
        dispatch_after_commit(&mut list).unwrap();
        dispatch_after_completion(&mut list, CompletionStatus::Committed);

        assert_eq!(
            *calls.borrow(),
            vec![
                "before_commit",
                "before_completion",
                "after_commit",
                "after_completion:committed",
            ]
        );
    }

    #[test]
    fn registration_order_preserved_across_multiple_callbacks() {
        struct OrderTracker {
            id: u8,
            out: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
        }
        impl Synchronization for OrderTracker {
            fn before_completion(&mut self) -> Result<()> {
                self.out.borrow_mut().push(self.id);
                Ok(())
            }
        }

        let out = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut list: SynchronizationList = vec![
            Box::new(OrderTracker { id: 1, out: out.clone() }),
            Box::new(OrderTracker { id: 2, out: out.clone() }),
            Box::new(OrderTracker { id: 3, out: out.clone() }),
        ];

        dispatch_before_completion(&mut list).unwrap();
        assert_eq!(*out.borrow(), vec![1, 2, 3]);
    }
}
