//! Configurable policy flags for the propagation engine (spec §4.4.7).

/// Controls whether empty statuses (no real transaction, e.g. `SUPPORTS`
/// with no outer scope) still activate synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SynchronizationActivation {
    /// Always activate synchronization, even for empty statuses.
    Always,
    /// Only activate synchronization when an actual transaction exists.
    OnActualTransaction,
    /// Never activate synchronization.
    Never,
}

impl Default for SynchronizationActivation {
    fn default() -> Self {
        SynchronizationActivation::Always
    }
}

/// Policy flags governing edge-case behavior of the propagation engine.
/// See spec §4.4.7 for the semantics of each flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionManagerSettings {
    pub nested_transaction_allowed: bool,
    pub validate_existing_transaction: bool,
    pub global_rollback_on_participation_failure: bool,
    pub fail_early_on_global_rollback_only: bool,
    pub rollback_on_commit_failure: bool,
    pub transaction_synchronization: SynchronizationActivation,
}

impl Default for TransactionManagerSettings {
    fn default() -> Self {
        Self {
            nested_transaction_allowed: false,
            validate_existing_transaction: false,
            global_rollback_on_participation_failure: true,
            fail_early_on_global_rollback_only: false,
            rollback_on_commit_failure: false,
            transaction_synchronization: SynchronizationActivation::Always,
        }
    }
}

impl TransactionManagerSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nested_transaction_allowed(mut self, allowed: bool) -> Self {
        self.nested_transaction_allowed = allowed;
        self
    }

    pub fn validate_existing_transaction(mut self, validate: bool) -> Self {
        self.validate_existing_transaction = validate;
        self
    }

    pub fn global_rollback_on_participation_failure(mut self, value: bool) -> Self {
        self.global_rollback_on_participation_failure = value;
        self
    }

    pub fn fail_early_on_global_rollback_only(mut self, value: bool) -> Self {
        self.fail_early_on_global_rollback_only = value;
        self
    }

    pub fn rollback_on_commit_failure(mut self, value: bool) -> Self {
        self.rollback_on_commit_failure = value;
        self
    }

    pub fn transaction_synchronization(mut self, value: SynchronizationActivation) -> Self {
        self.transaction_synchronization = value;
        self
    }
}
