//! A generic, backend-agnostic platform transaction manager core.
//!
//! `txcore` implements the propagation decision table, commit/rollback
//! lifecycle, and synchronization callback machinery that typically sit
//! underneath an ORM or database driver's connection handling, without
//! committing to any particular backend. A host supplies a
//! [`resource::ResourceAdapter`] over its own connection/session type and
//! drives everything else through [`engine::PropagationManager`].
//!
//! ```no_run
//! use txcore::{definition::TransactionDefinition, engine::PropagationManager};
//! # use txcore::resource::ResourceAdapter;
//! # fn example<A: ResourceAdapter>(adapter: A) -> txcore::error::Result<()> {
//! let manager = PropagationManager::new(adapter);
//! let status = manager.begin(TransactionDefinition::new())?;
//! manager.commit(status)?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod definition;
pub mod engine;
pub mod error;
pub mod policy;
pub mod resource;
pub mod status;
pub mod synchronization;

pub use context::{ContextBinder, ResourceKey, SuspendedResourcesHolder, ThreadLocalBinder};
pub use definition::{Isolation, Propagation, TransactionDefinition, DEFAULT_TIMEOUT};
pub use engine::PropagationManager;
pub use error::{Error, Result};
pub use policy::{SynchronizationActivation, TransactionManagerSettings};
pub use resource::ResourceAdapter;
pub use status::TransactionStatus;
pub use synchronization::{CompletionStatus, Synchronization};
