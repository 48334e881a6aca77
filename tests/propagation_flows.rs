//! End-to-end propagation scenarios driven entirely through the public API.

mod support;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use txcore::definition::{Isolation, Propagation, TransactionDefinition};
    use txcore::policy::TransactionManagerSettings;
    use txcore::{ContextBinder, Error, PropagationManager, Synchronization, ThreadLocalBinder};

    use crate::support::MockAdapter;

    #[test]
    fn not_supported_suspends_and_resumes_around_an_unmanaged_gap() -> anyhow::Result<()> {
        let adapter = MockAdapter::new(10);
        let log = adapter.log.0.clone();
        let mgr = PropagationManager::new(adapter);

        let outer = mgr.begin(TransactionDefinition::new())?;
        let gap = mgr.begin(TransactionDefinition::new().propagation(Propagation::NotSupported))?;
        assert!(!gap.has_resource());
        mgr.commit(gap)?;
        mgr.commit(outer)?;

        assert_eq!(
            *log.borrow(),
            vec!["begin:1", "suspend:1", "resume:1", "commit:1", "cleanup:1"]
        );
        Ok(())
    }

    #[test]
    fn requires_new_without_suspend_support_fails_cleanly() -> anyhow::Result<()> {
        let adapter = MockAdapter::without_suspend(11);
        let mgr = PropagationManager::new(adapter);

        let outer = mgr.begin(TransactionDefinition::new())?;
        let err = mgr
            .begin(TransactionDefinition::new().propagation(Propagation::RequiresNew))
            .unwrap_err();
        assert!(matches!(err, Error::TransactionSuspensionNotSupported));

        // The outer scope is untouched and can still complete normally.
        mgr.commit(outer)?;
        Ok(())
    }

    #[test]
    fn validate_existing_transaction_rejects_writable_join_into_read_only_outer() -> anyhow::Result<()> {
        let adapter = MockAdapter::new(12);
        let settings = TransactionManagerSettings::new().validate_existing_transaction(true);
        let mgr = PropagationManager::with_settings(adapter, settings);

        let outer = mgr.begin(TransactionDefinition::new().read_only(true))?;
        let err = mgr.begin(TransactionDefinition::new()).unwrap_err();
        assert!(matches!(err, Error::IllegalTransactionState(_)));

        mgr.commit(outer)?;
        Ok(())
    }

    #[test]
    fn validate_existing_transaction_allows_read_only_join_into_writable_outer() -> anyhow::Result<()> {
        let adapter = MockAdapter::new(13);
        let settings = TransactionManagerSettings::new().validate_existing_transaction(true);
        let mgr = PropagationManager::with_settings(adapter, settings);

        let outer = mgr.begin(TransactionDefinition::new())?;
        let inner = mgr.begin(TransactionDefinition::new().read_only(true))?;
        mgr.commit(inner)?;
        mgr.commit(outer)?;
        Ok(())
    }

    #[test]
    fn validate_existing_transaction_rejects_isolation_mismatch() -> anyhow::Result<()> {
        let adapter = MockAdapter::new(14);
        let settings = TransactionManagerSettings::new().validate_existing_transaction(true);
        let mgr = PropagationManager::with_settings(adapter, settings);

        let outer = mgr.begin(TransactionDefinition::new().isolation(Isolation::Serializable))?;
        let err = mgr
            .begin(TransactionDefinition::new().isolation(Isolation::ReadCommitted))
            .unwrap_err();
        assert!(matches!(err, Error::IllegalTransactionState(_)));

        mgr.commit(outer)?;
        Ok(())
    }

    #[test]
    fn nested_without_savepoint_support_begins_and_commits_independently_then_restores_outer(
    ) -> anyhow::Result<()> {
        let _subscriber_guard = tracing::subscriber::set_default(
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .finish(),
        );

        let adapter = MockAdapter::without_savepoint(40);
        let log = adapter.log.0.clone();
        let settings = TransactionManagerSettings::new().nested_transaction_allowed(true);
        let mgr = PropagationManager::with_settings(adapter, settings);

        let outer = mgr.begin(TransactionDefinition::new())?;
        let inner = mgr.begin(TransactionDefinition::new().propagation(Propagation::Nested))?;
        assert!(inner.is_new_transaction());
        assert!(!inner.has_savepoint());
        mgr.commit(inner)?;

        // The outer scope's own resource must still be bound and usable.
        mgr.commit(outer)?;

        assert_eq!(
            *log.borrow(),
            vec!["begin:1", "begin:2", "commit:2", "cleanup:2", "commit:1", "cleanup:1"]
        );
        Ok(())
    }

    #[test]
    fn two_managers_with_distinct_resource_keys_do_not_collide() -> anyhow::Result<()> {
        let mgr_a = PropagationManager::new(MockAdapter::new(20));
        let mgr_b = PropagationManager::new(MockAdapter::new(21));

        let status_a = mgr_a.begin(TransactionDefinition::new())?;
        let status_b = mgr_b.begin(TransactionDefinition::new())?;
        assert!(status_a.is_new_transaction());
        assert!(status_b.is_new_transaction());

        mgr_a.commit(status_a)?;
        mgr_b.commit(status_b)?;
        Ok(())
    }

    struct Recorder {
        calls: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Synchronization for Recorder {
        fn before_commit(&mut self, _read_only: bool) -> txcore::error::Result<()> {
            self.calls.borrow_mut().push("before_commit");
            Ok(())
        }
        fn before_completion(&mut self) -> txcore::error::Result<()> {
            self.calls.borrow_mut().push("before_completion");
            Ok(())
        }
        fn after_commit(&mut self) -> txcore::error::Result<()> {
            self.calls.borrow_mut().push("after_commit");
            Ok(())
        }
        fn after_completion(&mut self, status: txcore::CompletionStatus) {
            self.calls.borrow_mut().push(match status {
                txcore::CompletionStatus::Committed => "after_completion:committed",
                txcore::CompletionStatus::RolledBack => "after_completion:rolled_back",
                txcore::CompletionStatus::Unknown => "after_completion:unknown",
            });
        }
    }

    #[test]
    fn registered_synchronization_sees_the_full_commit_lifecycle_exactly_once() -> anyhow::Result<()> {
        let adapter = MockAdapter::new(30);
        let mgr = PropagationManager::new(adapter);
        let calls = Rc::new(RefCell::new(Vec::new()));

        let status = mgr.begin(TransactionDefinition::new())?;
        let binder = ThreadLocalBinder;
        binder.register_synchronization(Box::new(Recorder { calls: calls.clone() }));
        mgr.commit(status)?;

        assert_eq!(
            *calls.borrow(),
            vec![
                "before_commit",
                "before_completion",
                "after_commit",
                "after_completion:committed",
            ]
        );
        Ok(())
    }
}
