//! The resource adapter contract: the seam between the propagation engine
//! and a concrete transactional backend.
//!
//! The engine never touches a backend directly; every effect flows through
//! an implementation of [`ResourceAdapter`]. A backend that cannot suspend
//! a resource, or cannot provide savepoints, simply reports that via
//! [`ResourceAdapter::supports_suspend`] / [`ResourceAdapter::use_savepoint_for_nested`]
//! and leaves the corresponding methods unimplemented — the engine checks
//! the capability flag before ever calling them.

use std::error::Error as StdError;
use std::fmt::Debug;

use crate::context::ResourceKey;
use crate::definition::TransactionDefinition;

/// Backend-specific operations required to drive one logical transaction.
///
/// `Resource` is the adapter's view of "the current connection/session",
/// `Suspended` is whatever detached form is needed to later re-bind it, and
/// `Savepoint` is an opaque handle to an intra-transaction marker.
pub trait ResourceAdapter {
    /// The adapter's view of a bound backend connection/session. Cloning
    /// must be cheap (a handle, not the underlying connection itself) since
    /// the engine keeps one copy bound in ambient context and another on
    /// the owning [`crate::status::TransactionStatus`].
    type Resource: Debug + Clone + 'static;
    /// The detached form of a resource, produced by [`Self::suspend`].
    type Suspended: Debug;
    /// A handle to an intra-transaction savepoint.
    type Savepoint: Debug;
    /// The adapter's own error type for backend failures.
    type Error: StdError + Send + Sync + 'static;

    /// Identifies the resource factory (e.g. connection pool) this adapter
    /// wraps, so the engine's ambient resource map does not confuse two
    /// independent factories that happen to share an adapter type.
    fn resource_key(&self) -> ResourceKey;

    /// Return an object describing the current ambient resource. May
    /// describe "nothing bound yet" — the engine decides what to do with
    /// that via [`Self::is_existing_transaction`].
    fn get_transaction(&self) -> Self::Resource;

    /// `true` if the resource already represents an active transaction
    /// (e.g. bound by an outer scope, or pre-existing on the connection).
    fn is_existing_transaction(&self, resource: &Self::Resource) -> bool {
        let _ = resource;
        false
    }

    /// `true` if `NESTED` propagation should use a savepoint on the outer
    /// transaction's real connection. `false` selects the JTA-style
    /// fallback of a fresh `begin` with no outer suspension.
    fn use_savepoint_for_nested(&self) -> bool {
        true
    }

    /// `true` if this adapter can [`Self::suspend`]/[`Self::resume`] a
    /// resource. When `false`, the engine raises
    /// [`crate::Error::TransactionSuspensionNotSupported`] itself rather
    /// than calling either method.
    fn supports_suspend(&self) -> bool {
        false
    }

    /// `true` if `processCommit` should still issue a real commit when the
    /// backend has flagged the transaction globally rollback-only (some
    /// backends treat that flag as advisory only).
    fn should_commit_on_global_rollback_only(&self) -> bool {
        false
    }

    /// Open/acquire the resource, apply isolation and read-only, disable
    /// autocommit, and bind it for use.
    fn begin(
        &self,
        resource: &mut Self::Resource,
        definition: &TransactionDefinition,
    ) -> Result<(), Self::Error>;

    /// Detach `resource` from ambient context and return a transportable
    /// snapshot. Only called when [`Self::supports_suspend`] is `true`.
    fn suspend(&self, resource: &mut Self::Resource) -> Result<Self::Suspended, Self::Error> {
        let _ = resource;
        unimplemented!("ResourceAdapter::suspend called despite supports_suspend() == false")
    }

    /// Re-bind a previously suspended resource. Only called when
    /// [`Self::supports_suspend`] is `true`.
    fn resume(
        &self,
        resource: &mut Self::Resource,
        suspended: Self::Suspended,
    ) -> Result<(), Self::Error> {
        let _ = (resource, suspended);
        unimplemented!("ResourceAdapter::resume called despite supports_suspend() == false")
    }

    /// Final backend commit.
    fn commit(&self, resource: &mut Self::Resource) -> Result<(), Self::Error>;

    /// Final backend rollback.
    fn rollback(&self, resource: &mut Self::Resource) -> Result<(), Self::Error>;

    /// Mark the bound resource rollback-only, for use when a participating
    /// (non-owning) scope decides the outer transaction must not commit.
    fn set_rollback_only(&self, resource: &mut Self::Resource) -> Result<(), Self::Error>;

    /// `true` if the backend has the resource marked rollback-only, whether
    /// that mark was set by this scope or another participant.
    fn is_global_rollback_only(&self, resource: &Self::Resource) -> bool {
        let _ = resource;
        false
    }

    /// Release/return the resource after the scope that owns it has fully
    /// completed. Only called for statuses with `new_transaction == true`.
    fn cleanup(&self, resource: Self::Resource);

    /// Create a savepoint on the current resource. Only called when
    /// [`Self::use_savepoint_for_nested`] is `true`.
    fn create_savepoint(&self, resource: &mut Self::Resource) -> Result<Self::Savepoint, Self::Error> {
        let _ = resource;
        unimplemented!("ResourceAdapter::create_savepoint called despite use_savepoint_for_nested() == false")
    }

    /// Roll back to a previously created savepoint, leaving the enclosing
    /// transaction otherwise intact. Only called when
    /// [`Self::use_savepoint_for_nested`] is `true`.
    fn rollback_to_savepoint(
        &self,
        resource: &mut Self::Resource,
        savepoint: Self::Savepoint,
    ) -> Result<(), Self::Error> {
        let _ = (resource, savepoint);
        unimplemented!("ResourceAdapter::rollback_to_savepoint called despite use_savepoint_for_nested() == false")
    }

    /// Release a savepoint without rolling back to it. Only called when
    /// [`Self::use_savepoint_for_nested`] is `true`.
    fn release_savepoint(
        &self,
        resource: &mut Self::Resource,
        savepoint: Self::Savepoint,
    ) -> Result<(), Self::Error> {
        let _ = (resource, savepoint);
        unimplemented!("ResourceAdapter::release_savepoint called despite use_savepoint_for_nested() == false")
    }
}
