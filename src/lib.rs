// ============================================================================
// scopectx Library
// ============================================================================
//
// Scoped handles for expensive shared resources (database connections and
// the like) used across nested scopes within one unit of work.
//
// ============================================================================

//! Reference-counted, lazily-initialized resource handles.
//!
//! A [`Context`] wraps an [`Adapter`] and creates the backend client on first
//! use. Nested scopes share that client; it is handed back to the adapter
//! when the outermost scope ends. [`TransactionalContext`] layers backend
//! transactions (nested ones as savepoints) over the same protocol, and
//! [`RequestScope`] tracks every context touched during a request so leaked
//! handles can be swept up at the end.
//!
//! # Examples
//!
//! ```
//! use scopectx::{Context, MemoryAdapter, MemoryConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), scopectx::CtxError> {
//! let adapter = Arc::new(MemoryAdapter::new(MemoryConfig::new("docs_lib")));
//! let mut ctx = Context::new(adapter.clone());
//!
//! ctx.begin(|ctx, outer| {
//!     // A nested scope reuses the same connection.
//!     ctx.begin(|_, inner| {
//!         assert!(inner.same_as(&outer));
//!         Ok::<_, scopectx::CtxError>(())
//!     })
//! })?;
//!
//! assert_eq!(adapter.stats().created, 1);
//! assert_eq!(adapter.stats().released, 1);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod context;
pub mod core;
pub mod memory;
pub mod scope;
pub mod transaction;

// Re-export main types for convenience
pub use adapter::{Adapter, AsyncAdapter};
pub use context::{AsyncContext, Context};
pub use crate::core::{CtxError, Result};
pub use scope::{RequestScope, SweepReport, TrackedContext};
pub use transaction::{
    AsyncTransactionScope, AsyncTransactional, AsyncTransactionalContext, ConfiguredMode, Session,
    SessionFactory, TransactionMode, TransactionScope, Transactional, TransactionalContext,
};

// Re-export the in-memory backend
pub use memory::{
    AdapterStats, AsyncMemoryAdapter, EngineStats, MemoryAdapter, MemoryConfig, MemoryConnection,
    MemoryEngine, MemoryError, MemorySession, MemoryTransaction,
};
