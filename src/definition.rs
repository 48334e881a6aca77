//! Caller-supplied transaction definitions.

/// The sentinel for "use the resource adapter's default timeout".
pub const DEFAULT_TIMEOUT: i32 = -1;

/// Propagation behavior: how a newly requested scope composes with an
/// already-active outer scope, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Join the existing transaction, or start a new one if none exists.
    Required,
    /// Join the existing transaction if one exists; otherwise run without a
    /// transaction at all.
    Supports,
    /// Join the existing transaction; fail if none exists.
    Mandatory,
    /// Always start a new, independent transaction, suspending any existing
    /// one for the duration.
    RequiresNew,
    /// Always run without a transaction, suspending any existing one.
    NotSupported,
    /// Always run without a transaction; fail if one exists.
    Never,
    /// Run within a nested transaction (savepoint) if one exists; otherwise
    /// behave like `Required`.
    Nested,
}

impl Default for Propagation {
    fn default() -> Self {
        Propagation::Required
    }
}

/// Isolation level requested for a new transaction. Has no effect when the
/// scope participates in an existing transaction or runs without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Isolation {
    /// Use the resource adapter's default isolation level.
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for Isolation {
    fn default() -> Self {
        Isolation::Default
    }
}

/// An immutable description of the transactional scope a caller wants.
///
/// Build one with [`TransactionDefinition::new`] and the chained setters,
/// or use [`TransactionDefinition::default`] for `REQUIRED`/default
/// isolation/default timeout/read-write/unnamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionDefinition {
    propagation: Propagation,
    isolation: Isolation,
    timeout_seconds: i32,
    read_only: bool,
    name: Option<String>,
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionDefinition {
    /// Start building a definition with `REQUIRED` propagation and every
    /// other field at its default.
    pub fn new() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout_seconds: DEFAULT_TIMEOUT,
            read_only: false,
            name: None,
        }
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn timeout_seconds(mut self, timeout_seconds: i32) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn get_propagation(&self) -> Propagation {
        self.propagation
    }

    pub fn get_isolation(&self) -> Isolation {
        self.isolation
    }

    pub fn get_timeout_seconds(&self) -> i32 {
        self.timeout_seconds
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_required_and_default_timeout() {
        let def = TransactionDefinition::new();
        assert_eq!(def.get_propagation(), Propagation::Required);
        assert_eq!(def.get_isolation(), Isolation::Default);
        assert_eq!(def.get_timeout_seconds(), DEFAULT_TIMEOUT);
        assert!(!def.is_read_only());
        assert_eq!(def.get_name(), None);
    }

    #[test]
    fn builder_chains_overrides() {
        let def = TransactionDefinition::new()
            .propagation(Propagation::RequiresNew)
            .isolation(Isolation::Serializable)
            .timeout_seconds(30)
            .read_only(true)
            .name("transfer-funds");

        assert_eq!(def.get_propagation(), Propagation::RequiresNew);
        assert_eq!(def.get_isolation(), Isolation::Serializable);
        assert_eq!(def.get_timeout_seconds(), 30);
        assert!(def.is_read_only());
        assert_eq!(def.get_name(), Some("transfer-funds"));
    }
}
