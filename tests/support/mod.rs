//! A recording mock resource adapter shared by the integration tests.

use std::cell::RefCell;
use std::rc::Rc;

use txcore::definition::TransactionDefinition;
use txcore::{ResourceAdapter, ResourceKey};

#[derive(Debug, Default)]
pub struct Log(pub Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, event: impl Into<String>) {
        self.0.borrow_mut().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub id: u64,
    pub rollback_only: Rc<RefCell<bool>>,
}

#[derive(Debug, thiserror::Error)]
#[error("mock adapter failure: {0}")]
pub struct MockError(pub String);

/// A fully-featured mock adapter: supports suspend/resume and savepoints by
/// default, with every call recorded to `log` in the order it happened.
pub struct MockAdapter {
    pub log: Log,
    key: ResourceKey,
    next_id: RefCell<u64>,
    pub supports_suspend: bool,
    pub use_savepoint_for_nested: bool,
}

impl MockAdapter {
    pub fn new(key: u64) -> Self {
        Self {
            log: Log::default(),
            key: ResourceKey(key),
            next_id: RefCell::new(0),
            supports_suspend: true,
            use_savepoint_for_nested: true,
        }
    }

    pub fn without_suspend(key: u64) -> Self {
        Self {
            supports_suspend: false,
            ..Self::new(key)
        }
    }

    /// A JTA-style backend that cannot take savepoints, so `NESTED` must
    /// fall back to a real, independent begin/commit pair.
    pub fn without_savepoint(key: u64) -> Self {
        Self {
            use_savepoint_for_nested: false,
            ..Self::new(key)
        }
    }
}

impl ResourceAdapter for MockAdapter {
    type Resource = Handle;
    type Suspended = Handle;
    type Savepoint = u64;
    type Error = MockError;

    fn resource_key(&self) -> ResourceKey {
        self.key
    }

    fn get_transaction(&self) -> Self::Resource {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        Handle {
            id: *next,
            rollback_only: Rc::new(RefCell::new(false)),
        }
    }

    fn is_existing_transaction(&self, resource: &Self::Resource) -> bool {
        resource.id != 0
    }

    fn supports_suspend(&self) -> bool {
        self.supports_suspend
    }

    fn use_savepoint_for_nested(&self) -> bool {
        self.use_savepoint_for_nested
    }

    fn begin(
        &self,
        resource: &mut Self::Resource,
        _definition: &TransactionDefinition,
    ) -> std::result::Result<(), Self::Error> {
        self.log.push(format!("begin:{}", resource.id));
        Ok(())
    }

    fn suspend(&self, resource: &mut Self::Resource) -> std::result::Result<Self::Suspended, Self::Error> {
        self.log.push(format!("suspend:{}", resource.id));
        Ok(resource.clone())
    }

    fn resume(
        &self,
        resource: &mut Self::Resource,
        suspended: Self::Suspended,
    ) -> std::result::Result<(), Self::Error> {
        self.log.push(format!("resume:{}", suspended.id));
        *resource = suspended;
        Ok(())
    }

    fn commit(&self, resource: &mut Self::Resource) -> std::result::Result<(), Self::Error> {
        self.log.push(format!("commit:{}", resource.id));
        Ok(())
    }

    fn rollback(&self, resource: &mut Self::Resource) -> std::result::Result<(), Self::Error> {
        self.log.push(format!("rollback:{}", resource.id));
        Ok(())
    }

    fn set_rollback_only(&self, resource: &mut Self::Resource) -> std::result::Result<(), Self::Error> {
        self.log.push(format!("set_rollback_only:{}", resource.id));
        *resource.rollback_only.borrow_mut() = true;
        Ok(())
    }

    fn is_global_rollback_only(&self, resource: &Self::Resource) -> bool {
        *resource.rollback_only.borrow()
    }

    fn cleanup(&self, resource: Self::Resource) {
        self.log.push(format!("cleanup:{}", resource.id));
    }

    fn create_savepoint(&self, resource: &mut Self::Resource) -> std::result::Result<Self::Savepoint, Self::Error> {
        self.log.push(format!("create_savepoint:{}", resource.id));
        Ok(resource.id * 100)
    }

    fn rollback_to_savepoint(
        &self,
        resource: &mut Self::Resource,
        savepoint: Self::Savepoint,
    ) -> std::result::Result<(), Self::Error> {
        self.log
            .push(format!("rollback_to_savepoint:{}:{}", resource.id, savepoint));
        Ok(())
    }

    fn release_savepoint(
        &self,
        resource: &mut Self::Resource,
        savepoint: Self::Savepoint,
    ) -> std::result::Result<(), Self::Error> {
        self.log
            .push(format!("release_savepoint:{}:{}", resource.id, savepoint));
        Ok(())
    }
}
