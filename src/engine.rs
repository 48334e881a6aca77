//! The propagation engine: `begin`/`commit`/`rollback` and the suspend/resume
//! machinery that backs `REQUIRES_NEW` and `NOT_SUPPORTED`.
//!
//! [`PropagationManager`] owns no mutable state of its own beyond the
//! adapter and the policy flags — all per-scope state lives either on the
//! returned [`TransactionStatus`] or in the ambient context reached through
//! its [`ContextBinder`].

use crate::context::{ContextBinder, ResourceKey, SuspendedResourcesHolder, ThreadLocalBinder};
use crate::definition::{Isolation, Propagation, TransactionDefinition, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::policy::{SynchronizationActivation, TransactionManagerSettings};
use crate::resource::ResourceAdapter;
use crate::status::TransactionStatus;
use crate::synchronization::{self, CompletionStatus};

/// Drives one resource adapter through the full propagation decision table
/// and commit/rollback lifecycle.
///
/// Generic over the ambient-context implementation `B` so that a host that
/// cannot rely on OS-thread-keyed state (e.g. a cooperative scheduler) can
/// supply its own [`ContextBinder`]; [`ThreadLocalBinder`] is the default
/// and is almost always the right choice.
pub struct PropagationManager<R: ResourceAdapter, B: ContextBinder = ThreadLocalBinder> {
    adapter: R,
    binder: B,
    settings: TransactionManagerSettings,
}

impl<R: ResourceAdapter> PropagationManager<R, ThreadLocalBinder> {
    pub fn new(adapter: R) -> Self {
        Self::with_settings(adapter, TransactionManagerSettings::default())
    }

    pub fn with_settings(adapter: R, settings: TransactionManagerSettings) -> Self {
        Self {
            adapter,
            binder: ThreadLocalBinder,
            settings,
        }
    }
}

impl<R: ResourceAdapter, B: ContextBinder> PropagationManager<R, B> {
    /// Build a manager over a non-default [`ContextBinder`].
    pub fn with_binder(adapter: R, binder: B, settings: TransactionManagerSettings) -> Self {
        Self {
            adapter,
            binder,
            settings,
        }
    }

    pub fn adapter(&self) -> &R {
        &self.adapter
    }

    pub fn settings(&self) -> &TransactionManagerSettings {
        &self.settings
    }

    fn key(&self) -> ResourceKey {
        self.adapter.resource_key()
    }

    fn bind_resource(&self, resource: R::Resource) -> Result<()> {
        self.binder.bind_resource(self.key(), Box::new(resource))
    }

    fn unbind_resource(&self) -> Option<R::Resource> {
        self.binder
            .unbind_resource(self.key())
            .and_then(|boxed| boxed.downcast::<R::Resource>().ok())
            .map(|boxed| *boxed)
    }

    /// The resource bound in ambient context, if any, otherwise a fresh
    /// descriptor from the adapter (spec §4.4.1 step 1: "acquire resource").
    fn current_resource(&self) -> R::Resource {
        let mut found: Option<R::Resource> = None;
        self.binder.with_resource(self.key(), &mut |maybe| {
            found = maybe.and_then(|any| any.downcast_ref::<R::Resource>()).cloned();
        });
        found.unwrap_or_else(|| self.adapter.get_transaction())
    }

    /// Begin a new transactional scope, joining or suspending an existing
    /// one according to `definition`'s propagation behavior (spec §4.4.1,
    /// §4.4.2).
    pub fn begin(&self, definition: TransactionDefinition) -> Result<TransactionStatus<R>> {
        let resource = self.current_resource();

        if self.adapter.is_existing_transaction(&resource) {
            return self.participate_in_existing(resource, definition);
        }

        if definition.get_timeout_seconds() < DEFAULT_TIMEOUT {
            return Err(Error::InvalidTimeout(definition.get_timeout_seconds()));
        }

        match definition.get_propagation() {
            Propagation::Mandatory => Err(Error::IllegalTransactionState(
                "no existing transaction found for propagation 'mandatory'".into(),
            )),
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                self.start_new_transaction(resource, &definition)
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                if definition.get_isolation() != Isolation::Default {
                    tracing::warn!(
                        isolation = ?definition.get_isolation(),
                        propagation = ?definition.get_propagation(),
                        "isolation level has no effect without an actual transaction"
                    );
                }
                let mut status = self.build_status(None, true, None, None, &definition);
                self.activate_synchronization(&mut status);
                Ok(status)
            }
        }
    }

    fn participate_in_existing(
        &self,
        resource: R::Resource,
        definition: TransactionDefinition,
    ) -> Result<TransactionStatus<R>> {
        match definition.get_propagation() {
            Propagation::Never => Err(Error::IllegalTransactionState(
                "existing transaction found for propagation 'never'".into(),
            )),
            Propagation::NotSupported => {
                tracing::debug!("suspending existing transaction for propagation 'not_supported'");
                let suspended = self.suspend(Some(resource))?;
                let mut status = self.build_status(None, false, None, Some(suspended), &definition);
                self.activate_synchronization(&mut status);
                Ok(status)
            }
            Propagation::RequiresNew => {
                tracing::debug!("suspending existing transaction for propagation 'requires_new'");
                let suspended = self.suspend(Some(resource))?;
                let mut fresh = self.adapter.get_transaction();
                match self.adapter.begin(&mut fresh, &definition) {
                    Ok(()) => {
                        self.bind_resource(fresh.clone())?;
                        self.set_ambient_scalars(&definition);
                        let mut status =
                            self.build_status(Some(fresh), true, None, Some(suspended), &definition);
                        self.activate_synchronization(&mut status);
                        Ok(status)
                    }
                    Err(e) => {
                        if let Err(resume_err) = self.resume(suspended) {
                            tracing::error!(
                                error = %resume_err,
                                "failed to resume suspended outer transaction after a failed 'requires_new' begin"
                            );
                        }
                        Err(Error::adapter(e))
                    }
                }
            }
            Propagation::Nested => {
                if !self.settings.nested_transaction_allowed {
                    return Err(Error::NestedTransactionNotSupported(
                        "nested transactions are disabled by policy".into(),
                    ));
                }
                if self.adapter.use_savepoint_for_nested() {
                    let mut status = self.build_status(Some(resource), false, None, None, &definition);
                    status.create_savepoint(&self.adapter)?;
                    Ok(status)
                } else {
                    // JTA-style nested begin: a real, independent begin/commit pair
                    // like REQUIRES_NEW, but the outer scope is never suspended —
                    // its synchronization list and ambient scalars stay live and
                    // shared. The outer's own resource still occupies the ambient
                    // binding slot, so it is displaced here and restored by
                    // `cleanup_after_completion` once this nested scope finishes.
                    let mut fresh = self.adapter.get_transaction();
                    self.adapter
                        .begin(&mut fresh, &definition)
                        .map_err(Error::adapter)?;
                    let sibling = self.unbind_resource();
                    if let Err(e) = self.bind_resource(fresh.clone()) {
                        if let Some(sibling) = sibling {
                            if let Err(rebind_err) = self.bind_resource(sibling) {
                                tracing::error!(
                                    error = %rebind_err,
                                    "failed to restore outer resource binding after a failed nested begin"
                                );
                            }
                        }
                        return Err(e);
                    }
                    let mut status = self.build_status(Some(fresh), true, None, None, &definition);
                    if let Some(sibling) = sibling {
                        status.set_sibling_resource(sibling);
                    }
                    self.activate_synchronization(&mut status);
                    Ok(status)
                }
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                if self.settings.validate_existing_transaction {
                    self.validate_existing(&definition)?;
                }
                Ok(self.build_status(Some(resource), false, None, None, &definition))
            }
        }
    }

    /// Spec §9 Open Question 1: the read-only check is deliberately
    /// asymmetric. A participating `read_only` definition joining a
    /// writable outer scope is always fine; only a non-read-only
    /// definition joining a read-only outer scope is rejected.
    fn validate_existing(&self, definition: &TransactionDefinition) -> Result<()> {
        if definition.get_isolation() != Isolation::Default {
            let ambient = self.binder.current_isolation();
            if ambient != Some(definition.get_isolation()) {
                return Err(Error::IllegalTransactionState(format!(
                    "participating transaction requested isolation {:?} but existing transaction has {:?}",
                    definition.get_isolation(),
                    ambient
                )));
            }
        }
        if !definition.is_read_only() && self.binder.current_read_only() {
            return Err(Error::IllegalTransactionState(
                "participating transaction is not read-only but existing transaction is".into(),
            ));
        }
        Ok(())
    }

    fn start_new_transaction(
        &self,
        mut resource: R::Resource,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus<R>> {
        let suspended = self.suspend(None)?;
        match self.adapter.begin(&mut resource, definition) {
            Ok(()) => {
                self.bind_resource(resource.clone())?;
                self.set_ambient_scalars(definition);
                let mut status =
                    self.build_status(Some(resource), true, None, Some(suspended), definition);
                self.activate_synchronization(&mut status);
                tracing::debug!(name = ?definition.get_name(), "began new transaction");
                Ok(status)
            }
            Err(e) => {
                if let Err(resume_err) = self.resume(suspended) {
                    tracing::error!(
                        error = %resume_err,
                        "failed to resume suspended outer transaction after a failed begin"
                    );
                }
                Err(Error::adapter(e))
            }
        }
    }

    fn set_ambient_scalars(&self, definition: &TransactionDefinition) {
        self.binder.set_actual_transaction_active(true);
        if definition.get_isolation() != Isolation::Default {
            self.binder.set_current_isolation(Some(definition.get_isolation()));
        }
        self.binder.set_current_read_only(definition.is_read_only());
        self.binder
            .set_current_name(definition.get_name().map(str::to_owned));
    }

    fn build_status(
        &self,
        resource: Option<R::Resource>,
        new_transaction: bool,
        savepoint: Option<R::Savepoint>,
        suspended_resources: Option<SuspendedResourcesHolder<R::Suspended>>,
        definition: &TransactionDefinition,
    ) -> TransactionStatus<R> {
        TransactionStatus::new(
            resource,
            new_transaction,
            definition.is_read_only(),
            savepoint,
            suspended_resources,
            definition.get_name().map(str::to_owned),
        )
    }

    fn activate_synchronization(&self, status: &mut TransactionStatus<R>) {
        let is_actual = status.has_resource();
        let should_activate = match self.settings.transaction_synchronization {
            SynchronizationActivation::Always => true,
            SynchronizationActivation::OnActualTransaction => is_actual,
            SynchronizationActivation::Never => false,
        };
        if should_activate && !self.binder.is_synchronization_active() {
            self.binder.init_synchronization();
            status.mark_new_synchronization();
        }
    }

    /// Detach `resource` (if any) and the ambient synchronization list and
    /// scalars, returning a holder that [`Self::resume`] can restore later
    /// (spec §4.4.3).
    fn suspend(&self, resource: Option<R::Resource>) -> Result<SuspendedResourcesHolder<R::Suspended>> {
        let synchronizations = if self.binder.is_synchronization_active() {
            let mut list = self.binder.take_synchronizations().unwrap_or_default();
            synchronization::dispatch_suspend(&mut list);
            Some(list)
        } else {
            None
        };

        let suspended_resource = match resource {
            Some(mut res) => {
                if !self.adapter.supports_suspend() {
                    if let Some(list) = synchronizations {
                        self.binder.put_synchronizations(list);
                    }
                    return Err(Error::TransactionSuspensionNotSupported);
                }
                match self.adapter.suspend(&mut res) {
                    Ok(detached) => {
                        self.unbind_resource();
                        Some(detached)
                    }
                    Err(e) => {
                        if let Some(list) = synchronizations {
                            self.binder.put_synchronizations(list);
                        }
                        return Err(Error::adapter(e));
                    }
                }
            }
            None => None,
        };

        let isolation = self.binder.current_isolation();
        let read_only = self.binder.current_read_only();
        let name = self.binder.current_name();
        let actual_transaction_active = self.binder.is_actual_transaction_active();

        self.binder.set_current_isolation(None);
        self.binder.set_current_read_only(false);
        self.binder.set_current_name(None);
        self.binder.set_actual_transaction_active(false);

        let holder = match suspended_resource {
            Some(detached) => SuspendedResourcesHolder::full(
                detached,
                synchronizations,
                isolation,
                read_only,
                name,
                actual_transaction_active,
            ),
            None => SuspendedResourcesHolder::synchronizations_only(
                synchronizations,
                isolation,
                read_only,
                name,
                actual_transaction_active,
            ),
        };
        tracing::trace!("suspended ambient transaction context");
        Ok(holder)
    }

    /// Restore a previously suspended context (spec §4.4.4).
    fn resume(&self, holder: SuspendedResourcesHolder<R::Suspended>) -> Result<()> {
        let (resource, synchronizations, isolation, read_only, name, actual_transaction_active) =
            holder.into_parts();

        if let Some(detached) = resource {
            let mut fresh = self.adapter.get_transaction();
            self.adapter
                .resume(&mut fresh, detached)
                .map_err(Error::adapter)?;
            self.bind_resource(fresh)?;
        }

        self.binder.set_current_isolation(isolation);
        self.binder.set_current_read_only(read_only);
        self.binder.set_current_name(name);
        self.binder.set_actual_transaction_active(actual_transaction_active);

        if let Some(mut list) = synchronizations {
            self.binder.init_synchronization();
            synchronization::dispatch_resume(&mut list);
            self.binder.put_synchronizations(list);
        }
        tracing::trace!("resumed ambient transaction context");
        Ok(())
    }

    fn trigger_before_commit(&self, read_only: bool) -> Result<()> {
        if !self.binder.is_synchronization_active() {
            return Ok(());
        }
        let mut list = self.binder.take_synchronizations().unwrap_or_default();
        let result = synchronization::dispatch_before_commit(&mut list, read_only);
        self.binder.put_synchronizations(list);
        result
    }

    fn trigger_before_completion(&self) -> Result<()> {
        if !self.binder.is_synchronization_active() {
            return Ok(());
        }
        let mut list = self.binder.take_synchronizations().unwrap_or_default();
        let result = synchronization::dispatch_before_completion(&mut list);
        self.binder.put_synchronizations(list);
        result
    }

    fn trigger_after_commit(&self) -> Result<()> {
        if !self.binder.is_synchronization_active() {
            return Ok(());
        }
        let mut list = self.binder.take_synchronizations().unwrap_or_default();
        let result = synchronization::dispatch_after_commit(&mut list);
        self.binder.put_synchronizations(list);
        result
    }

    /// Dispatches `after_completion` without clearing the synchronization
    /// list — only the scope that owns it (`new_synchronization == true`)
    /// removes it, in `cleanup_after_completion`. A participating scope's
    /// commit/rollback still runs this, but must leave the list intact for
    /// the owning outer scope.
    fn trigger_after_completion(&self, outcome: CompletionStatus) {
        if !self.binder.is_synchronization_active() {
            return;
        }
        let mut list = self.binder.take_synchronizations().unwrap_or_default();
        synchronization::dispatch_after_completion(&mut list, outcome);
        self.binder.put_synchronizations(list);
    }

    /// Commit `status`, deferring to a rollback if it (or the resource it
    /// holds) has been marked rollback-only (spec §4.4.5).
    pub fn commit(&self, status: TransactionStatus<R>) -> Result<()> {
        status.assert_not_completed()?;

        if status.local_rollback_only() {
            tracing::debug!("rolling back a transaction marked local rollback-only");
            return self.process_rollback(status, false);
        }

        if !self.adapter.should_commit_on_global_rollback_only() && status.is_global_rollback_only(&self.adapter)
        {
            tracing::debug!("rolling back a transaction the backend marked globally rollback-only");
            return self.process_rollback(status, true);
        }

        self.process_commit(status)
    }

    fn process_commit(&self, mut status: TransactionStatus<R>) -> Result<()> {
        let mut before_completion_invoked = false;

        match self.attempt_commit(&mut status, &mut before_completion_invoked) {
            Ok(()) => {
                let after_commit_result = self.trigger_after_commit();
                if let Err(ref e) = after_commit_result {
                    tracing::error!(error = %e, "after_commit callback failed");
                }
                self.trigger_after_completion(CompletionStatus::Committed);
                self.cleanup_after_completion(&mut status);
                after_commit_result
            }
            Err((err, FailureStage::UnexpectedRollback)) => {
                self.trigger_after_completion(CompletionStatus::RolledBack);
                self.cleanup_after_completion(&mut status);
                Err(err)
            }
            Err((err, FailureStage::Commit)) => {
                let rollback_result = if self.settings.rollback_on_commit_failure {
                    self.do_rollback_on_commit_exception(&mut status)
                } else {
                    self.trigger_after_completion(CompletionStatus::Unknown);
                    Ok(())
                };
                self.cleanup_after_completion(&mut status);
                rollback_result.and(Err(err))
            }
            Err((err, FailureStage::BeforePhase)) => {
                if !before_completion_invoked {
                    let _ = self.trigger_before_completion();
                }
                let rollback_result = self.do_rollback_on_commit_exception(&mut status);
                self.cleanup_after_completion(&mut status);
                rollback_result.and(Err(err))
            }
        }
    }

    fn attempt_commit(
        &self,
        status: &mut TransactionStatus<R>,
        before_completion_invoked: &mut bool,
    ) -> std::result::Result<(), (Error, FailureStage)> {
        self.trigger_before_commit(status.is_read_only())
            .map_err(|e| (e, FailureStage::BeforePhase))?;
        self.trigger_before_completion()
            .map_err(|e| (e, FailureStage::BeforePhase))?;
        *before_completion_invoked = true;

        let mut unexpected = false;
        if status.has_savepoint() {
            unexpected = status.is_global_rollback_only(&self.adapter);
            status
                .release_savepoint(&self.adapter)
                .map_err(|e| (e, FailureStage::Commit))?;
        } else if status.is_new_transaction() {
            unexpected = status.is_global_rollback_only(&self.adapter);
            status
                .commit_resource(&self.adapter)
                .map_err(|e| (e, FailureStage::Commit))?;
        } else if self.settings.fail_early_on_global_rollback_only {
            unexpected = status.is_global_rollback_only(&self.adapter);
        }

        if unexpected {
            return Err((Error::UnexpectedRollback, FailureStage::UnexpectedRollback));
        }
        Ok(())
    }

    /// Best-effort rollback after a failed commit attempt. Per spec §7, a
    /// failure here overrides the original commit exception; only when this
    /// rollback itself succeeds does the original commit failure stand.
    fn do_rollback_on_commit_exception(&self, status: &mut TransactionStatus<R>) -> Result<()> {
        let result = if status.has_savepoint() {
            status.rollback_to_savepoint(&self.adapter)
        } else if status.is_new_transaction() {
            status.rollback_resource(&self.adapter)
        } else if status.has_resource() {
            status.set_backend_rollback_only(&self.adapter)
        } else {
            Ok(())
        };

        match result {
            Ok(()) => {
                self.trigger_after_completion(CompletionStatus::RolledBack);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "rollback after commit failure itself failed");
                self.trigger_after_completion(CompletionStatus::Unknown);
                Err(e)
            }
        }
    }

    /// Roll back `status` (spec §4.4.6).
    pub fn rollback(&self, status: TransactionStatus<R>) -> Result<()> {
        status.assert_not_completed()?;
        self.process_rollback(status, false)
    }

    fn process_rollback(&self, mut status: TransactionStatus<R>, mut unexpected: bool) -> Result<()> {
        match self.attempt_rollback(&mut status, &mut unexpected) {
            Ok(()) => {
                self.trigger_after_completion(CompletionStatus::RolledBack);
                self.cleanup_after_completion(&mut status);
                if unexpected {
                    Err(Error::UnexpectedRollback)
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                self.trigger_after_completion(CompletionStatus::Unknown);
                self.cleanup_after_completion(&mut status);
                Err(e)
            }
        }
    }

    fn attempt_rollback(&self, status: &mut TransactionStatus<R>, unexpected: &mut bool) -> Result<()> {
        self.trigger_before_completion()?;

        if status.has_savepoint() {
            status.rollback_to_savepoint(&self.adapter)?;
        } else if status.is_new_transaction() {
            status.rollback_resource(&self.adapter)?;
        } else if status.has_resource() {
            if status.local_rollback_only() || self.settings.global_rollback_on_participation_failure {
                status.set_backend_rollback_only(&self.adapter)?;
            } else {
                tracing::debug!("participating rollback observed; outer scope decides the final outcome");
            }
            if !self.settings.fail_early_on_global_rollback_only {
                *unexpected = false;
            }
        }
        Ok(())
    }

    /// Spec §4.4.5/§9 Open Question 2: only the status that actually opened
    /// the resource unbinds and cleans it up; a participating scope leaves
    /// the outer resource bound for its owner to finish. A JTA-style nested
    /// scope (§4.4.1's NESTED-without-savepoint branch) additionally carries
    /// the outer's displaced resource as a sibling and rebinds it here.
    fn cleanup_after_completion(&self, status: &mut TransactionStatus<R>) {
        status.mark_completed();
        if status.new_synchronization() {
            self.binder.clear_synchronization();
        }

        if status.is_new_transaction() {
            if let Some(resource) = status.take_resource() {
                let _ = self.unbind_resource();
                self.adapter.cleanup(resource);
            }
        }

        if let Some(sibling) = status.take_sibling_resource() {
            if let Err(e) = self.bind_resource(sibling) {
                tracing::error!(
                    error = %e,
                    "failed to restore outer resource binding after a nested JTA-style scope completed"
                );
            }
        }

        if let Some(holder) = status.take_suspended_resources() {
            if let Err(e) = self.resume(holder) {
                tracing::error!(error = %e, "failed to resume suspended outer transaction");
            }
        }
    }
}

enum FailureStage {
    BeforePhase,
    Commit,
    UnexpectedRollback,
}
