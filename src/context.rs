//! The per-logical-thread ambient context (C1) and the suspended-resources
//! snapshot (C6) that lets [`resume`](crate::engine) restore it exactly.
//!
//! Ambient state is deliberately *not* shared across threads: every
//! operation scoped to a caller reads and writes only its own context, so
//! the engine can treat suspension as a pure data swap rather than
//! reasoning about concurrent mutation. The default [`ThreadLocalBinder`]
//! keys that context by OS thread, which is correct only under synchronous
//! execution (spec §5, §9) — a host built on cooperative scheduling across
//! OS threads must supply a [`ContextBinder`] impl keyed by scope
//! continuation instead.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use crate::definition::Isolation;
use crate::error::{Error, Result};
use crate::synchronization::{Synchronization, SynchronizationList};

/// Identifies a resource factory (e.g. one connection pool) for the purpose
/// of ambient binding. Two [`crate::engine::PropagationManager`]s wrapping
/// distinct factories of the same adapter *type* must report distinct keys,
/// or they will shadow each other's bindings — see
/// [`crate::resource::ResourceAdapter::resource_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceKey(pub u64);

/// Per-logical-thread ambient state, addressed through [`ContextBinder`].
///
/// Implementations must guarantee at most one bound resource per
/// [`ResourceKey`] (spec invariant I4) and must preserve synchronization
/// registration order across suspend/resume (I3).
pub trait ContextBinder {
    /// Bind a resource under `key`. Fails with
    /// [`Error::DuplicateResourceBinding`] if one is already bound.
    fn bind_resource(&self, key: ResourceKey, value: Box<dyn Any>) -> Result<()>;

    /// Remove and return the resource bound under `key`, if any.
    fn unbind_resource(&self, key: ResourceKey) -> Option<Box<dyn Any>>;

    /// `true` if a resource is currently bound under `key`.
    fn has_resource(&self, key: ResourceKey) -> bool;

    /// Borrow the resource bound under `key`, if any.
    fn with_resource(&self, key: ResourceKey, f: &mut dyn FnMut(Option<&dyn Any>));

    fn is_actual_transaction_active(&self) -> bool;
    fn set_actual_transaction_active(&self, active: bool);

    fn current_isolation(&self) -> Option<Isolation>;
    fn set_current_isolation(&self, isolation: Option<Isolation>);

    fn current_read_only(&self) -> bool;
    fn set_current_read_only(&self, read_only: bool);

    fn current_name(&self) -> Option<String>;
    fn set_current_name(&self, name: Option<String>);

    /// `true` if the synchronization list has been initialized (i.e. it is
    /// active, even if currently empty).
    fn is_synchronization_active(&self) -> bool;

    /// Initialize an empty synchronization list, marking synchronization
    /// active.
    fn init_synchronization(&self);

    /// Clear the synchronization list, marking synchronization inactive.
    fn clear_synchronization(&self);

    /// Append a callback to the end of the synchronization list (fails
    /// silently as a no-op if synchronization is not active; callers are
    /// expected to check [`Self::is_synchronization_active`] first).
    fn register_synchronization(&self, sync: Box<dyn Synchronization>);

    /// Remove and return the entire synchronization list, leaving
    /// synchronization inactive.
    fn take_synchronizations(&self) -> Option<SynchronizationList>;

    /// Re-install a previously taken synchronization list, marking
    /// synchronization active again.
    fn put_synchronizations(&self, synchronizations: SynchronizationList);

    /// Run `f` against the live synchronization list, if active.
    fn with_synchronizations(&self, f: &mut dyn FnMut(&mut SynchronizationList));
}

#[derive(Default)]
struct AmbientContextInner {
    resources: HashMap<ResourceKey, Box<dyn Any>>,
    synchronizations: Option<SynchronizationList>,
    actual_transaction_active: bool,
    current_isolation: Option<Isolation>,
    current_read_only: bool,
    current_name: Option<String>,
}

thread_local! {
    static CONTEXT: RefCell<AmbientContextInner> = RefCell::new(AmbientContextInner::default());
}

/// The default [`ContextBinder`]: one [`AmbientContextInner`] per OS
/// thread, holding no locks because no other thread ever touches it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalBinder;

impl ContextBinder for ThreadLocalBinder {
    fn bind_resource(&self, key: ResourceKey, value: Box<dyn Any>) -> Result<()> {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if ctx.resources.contains_key(&key) {
                return Err(Error::DuplicateResourceBinding);
            }
            ctx.resources.insert(key, value);
            Ok(())
        })
    }

    fn unbind_resource(&self, key: ResourceKey) -> Option<Box<dyn Any>> {
        CONTEXT.with(|ctx| ctx.borrow_mut().resources.remove(&key))
    }

    fn has_resource(&self, key: ResourceKey) -> bool {
        CONTEXT.with(|ctx| ctx.borrow().resources.contains_key(&key))
    }

    fn with_resource(&self, key: ResourceKey, f: &mut dyn FnMut(Option<&dyn Any>)) {
        CONTEXT.with(|ctx| {
            let ctx = ctx.borrow();
            f(ctx.resources.get(&key).map(|b| b.as_ref()));
        });
    }

    fn is_actual_transaction_active(&self) -> bool {
        CONTEXT.with(|ctx| ctx.borrow().actual_transaction_active)
    }

    fn set_actual_transaction_active(&self, active: bool) {
        CONTEXT.with(|ctx| ctx.borrow_mut().actual_transaction_active = active);
    }

    fn current_isolation(&self) -> Option<Isolation> {
        CONTEXT.with(|ctx| ctx.borrow().current_isolation)
    }

    fn set_current_isolation(&self, isolation: Option<Isolation>) {
        CONTEXT.with(|ctx| ctx.borrow_mut().current_isolation = isolation);
    }

    fn current_read_only(&self) -> bool {
        CONTEXT.with(|ctx| ctx.borrow().current_read_only)
    }

    fn set_current_read_only(&self, read_only: bool) {
        CONTEXT.with(|ctx| ctx.borrow_mut().current_read_only = read_only);
    }

    fn current_name(&self) -> Option<String> {
        CONTEXT.with(|ctx| ctx.borrow().current_name.clone())
    }

    fn set_current_name(&self, name: Option<String>) {
        CONTEXT.with(|ctx| ctx.borrow_mut().current_name = name);
    }

    fn is_synchronization_active(&self) -> bool {
        CONTEXT.with(|ctx| ctx.borrow().synchronizations.is_some())
    }

    fn init_synchronization(&self) {
        CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations = Some(Vec::new()));
    }

    fn clear_synchronization(&self) {
        CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations = None);
    }

    fn register_synchronization(&self, sync: Box<dyn Synchronization>) {
        CONTEXT.with(|ctx| {
            if let Some(list) = ctx.borrow_mut().synchronizations.as_mut() {
                list.push(sync);
            }
        });
    }

    fn take_synchronizations(&self) -> Option<SynchronizationList> {
        CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations.take())
    }

    fn put_synchronizations(&self, synchronizations: SynchronizationList) {
        CONTEXT.with(|ctx| ctx.borrow_mut().synchronizations = Some(synchronizations));
    }

    fn with_synchronizations(&self, f: &mut dyn FnMut(&mut SynchronizationList)) {
        CONTEXT.with(|ctx| {
            if let Some(list) = ctx.borrow_mut().synchronizations.as_mut() {
                f(list);
            }
        });
    }
}

/// An immutable snapshot of everything [`crate::engine`]'s `suspend` pulled
/// out of the ambient context, handed back to `resume` to restore it
/// exactly (spec invariant I7: these resources are reachable only through
/// this holder, never through the ambient context, while suspended).
pub struct SuspendedResourcesHolder<Suspended> {
    pub(crate) suspended_resource: Option<Suspended>,
    pub(crate) suspended_synchronizations: Option<SynchronizationList>,
    pub(crate) isolation: Option<Isolation>,
    pub(crate) read_only: bool,
    pub(crate) name: Option<String>,
    pub(crate) actual_transaction_active: bool,
}

impl<Suspended> fmt::Debug for SuspendedResourcesHolder<Suspended> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuspendedResourcesHolder")
            .field("has_resource", &self.suspended_resource.is_some())
            .field(
                "synchronization_count",
                &self.suspended_synchronizations.as_ref().map(Vec::len),
            )
            .field("isolation", &self.isolation)
            .field("read_only", &self.read_only)
            .field("name", &self.name)
            .field("actual_transaction_active", &self.actual_transaction_active)
            .finish()
    }
}

impl<Suspended> SuspendedResourcesHolder<Suspended> {
    /// Short form: only the synchronization list and scalars were active,
    /// no resource was bound (used when `suspend(None)` is called because
    /// no outer transaction exists).
    pub(crate) fn synchronizations_only(
        synchronizations: Option<SynchronizationList>,
        isolation: Option<Isolation>,
        read_only: bool,
        name: Option<String>,
        actual_transaction_active: bool,
    ) -> Self {
        Self {
            suspended_resource: None,
            suspended_synchronizations: synchronizations,
            isolation,
            read_only,
            name,
            actual_transaction_active,
        }
    }

    /// Full form: a resource was detached as well.
    pub(crate) fn full(
        suspended_resource: Suspended,
        synchronizations: Option<SynchronizationList>,
        isolation: Option<Isolation>,
        read_only: bool,
        name: Option<String>,
        actual_transaction_active: bool,
    ) -> Self {
        Self {
            suspended_resource: Some(suspended_resource),
            suspended_synchronizations: synchronizations,
            isolation,
            read_only,
            name,
            actual_transaction_active,
        }
    }

    pub fn has_resource(&self) -> bool {
        self.suspended_resource.is_some()
    }

    /// Decompose the holder into its raw fields for restoration by
    /// [`crate::engine::PropagationManager`]'s `resume`.
    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        Option<Suspended>,
        Option<SynchronizationList>,
        Option<Isolation>,
        bool,
        Option<String>,
        bool,
    ) {
        (
            self.suspended_resource,
            self.suspended_synchronizations,
            self.isolation,
            self.read_only,
            self.name,
            self.actual_transaction_active,
        )
    }
}
