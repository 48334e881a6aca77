//! The per-scope handle returned by `begin` and consumed by `commit`/
//! `rollback` (C4).

use std::fmt;

use crate::context::SuspendedResourcesHolder;
use crate::error::{Error, Result};
use crate::resource::ResourceAdapter;

/// A transactional scope in progress.
///
/// Produced only by [`crate::engine::PropagationManager::begin`]. Every
/// mutating method fails with [`Error::IllegalTransactionState`] once the
/// status has completed (spec invariant I5).
pub struct TransactionStatus<R: ResourceAdapter> {
    pub(crate) resource: Option<R::Resource>,
    pub(crate) new_transaction: bool,
    pub(crate) new_synchronization: bool,
    pub(crate) read_only: bool,
    pub(crate) local_rollback_only: bool,
    pub(crate) savepoint: Option<R::Savepoint>,
    pub(crate) suspended_resources: Option<SuspendedResourcesHolder<R::Suspended>>,
    /// The outer scope's own resource, displaced from the ambient binding
    /// by a JTA-style nested begin that could not suspend it (no savepoint
    /// capability). Restored by `cleanup_after_completion` once this
    /// status is done, distinct from `suspended_resources` because no
    /// suspension — and so no synchronization/scalar snapshot — ever
    /// happened.
    pub(crate) sibling_resource: Option<R::Resource>,
    pub(crate) completed: bool,
    pub(crate) name: Option<String>,
}

impl<R: ResourceAdapter> fmt::Debug for TransactionStatus<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("has_resource", &self.resource.is_some())
            .field("new_transaction", &self.new_transaction)
            .field("new_synchronization", &self.new_synchronization)
            .field("read_only", &self.read_only)
            .field("local_rollback_only", &self.local_rollback_only)
            .field("has_savepoint", &self.savepoint.is_some())
            .field("has_suspended_resources", &self.suspended_resources.is_some())
            .field("has_sibling_resource", &self.sibling_resource.is_some())
            .field("completed", &self.completed)
            .field("name", &self.name)
            .finish()
    }
}

impl<R: ResourceAdapter> TransactionStatus<R> {
    pub(crate) fn new(
        resource: Option<R::Resource>,
        new_transaction: bool,
        read_only: bool,
        savepoint: Option<R::Savepoint>,
        suspended_resources: Option<SuspendedResourcesHolder<R::Suspended>>,
        name: Option<String>,
    ) -> Self {
        Self {
            resource,
            new_transaction,
            new_synchronization: false,
            read_only,
            local_rollback_only: false,
            savepoint,
            suspended_resources,
            sibling_resource: None,
            completed: false,
            name,
        }
    }

    /// Mark this scope rollback-only. Idempotent, and monotonic (spec
    /// invariant I6): once set it is never cleared before completion.
    pub fn set_rollback_only(&mut self) {
        self.local_rollback_only = true;
    }

    pub(crate) fn local_rollback_only(&self) -> bool {
        self.local_rollback_only
    }

    pub(crate) fn new_synchronization(&self) -> bool {
        self.new_synchronization
    }

    pub(crate) fn mark_new_synchronization(&mut self) {
        self.new_synchronization = true;
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub(crate) fn take_resource(&mut self) -> Option<R::Resource> {
        self.resource.take()
    }

    pub(crate) fn take_suspended_resources(&mut self) -> Option<SuspendedResourcesHolder<R::Suspended>> {
        self.suspended_resources.take()
    }

    pub(crate) fn set_sibling_resource(&mut self, resource: R::Resource) {
        self.sibling_resource = Some(resource);
    }

    pub(crate) fn take_sibling_resource(&mut self) -> Option<R::Resource> {
        self.sibling_resource.take()
    }

    pub(crate) fn commit_resource(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .expect("a new-transaction status always carries a resource until cleanup");
        adapter.commit(resource).map_err(Error::adapter)
    }

    pub(crate) fn rollback_resource(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .expect("a new-transaction status always carries a resource until cleanup");
        adapter.rollback(resource).map_err(Error::adapter)
    }

    pub(crate) fn set_backend_rollback_only(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .expect("checked by has_resource() before calling");
        adapter.set_rollback_only(resource).map_err(Error::adapter)
    }

    /// `true` if either the local flag is set, or the resource adapter
    /// reports the backend resource as globally rollback-only.
    pub fn is_rollback_only(&self, adapter: &R) -> bool {
        self.local_rollback_only || self.is_global_rollback_only(adapter)
    }

    /// `true` if the backend resource itself is marked rollback-only,
    /// independent of this scope's local flag.
    pub fn is_global_rollback_only(&self, adapter: &R) -> bool {
        match &self.resource {
            Some(resource) => adapter.is_global_rollback_only(resource),
            None => false,
        }
    }

    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Create a savepoint on the current resource and attach it to this
    /// status. Returns [`Error::NestedTransactionNotSupported`] if this
    /// status has no bound resource.
    pub fn create_savepoint(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .ok_or_else(|| Error::NestedTransactionNotSupported("no resource bound".into()))?;
        let savepoint = adapter.create_savepoint(resource).map_err(Error::adapter)?;
        self.savepoint = Some(savepoint);
        Ok(())
    }

    /// Roll back to, and drop, this status's savepoint.
    pub fn rollback_to_savepoint(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .ok_or_else(|| Error::NestedTransactionNotSupported("no resource bound".into()))?;
        let savepoint = self
            .savepoint
            .take()
            .ok_or_else(|| Error::IllegalTransactionState("no savepoint on this status".into()))?;
        adapter
            .rollback_to_savepoint(resource, savepoint)
            .map_err(Error::adapter)
    }

    /// Release, without rolling back to, this status's savepoint.
    pub fn release_savepoint(&mut self, adapter: &R) -> Result<()> {
        let resource = self
            .resource
            .as_mut()
            .ok_or_else(|| Error::NestedTransactionNotSupported("no resource bound".into()))?;
        let savepoint = self
            .savepoint
            .take()
            .ok_or_else(|| Error::IllegalTransactionState("no savepoint on this status".into()))?;
        adapter
            .release_savepoint(resource, savepoint)
            .map_err(Error::adapter)
    }

    pub(crate) fn assert_not_completed(&self) -> Result<()> {
        if self.completed {
            Err(Error::IllegalTransactionState(
                "transaction is already completed".into(),
            ))
        } else {
            Ok(())
        }
    }
}
