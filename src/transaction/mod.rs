// ============================================================================
// Transactional Extension
// ============================================================================
//
// Layers backend transactions over the context acquire/release protocol.
// The first transactional scope on a client starts a top-level transaction;
// scopes entered while it is open get nested (savepoint) transactions:
//
//   open ──> BEGIN
//     open ──> SAVEPOINT
//     <── RELEASE SAVEPOINT / ROLLBACK TO SAVEPOINT
//   <── COMMIT / ROLLBACK
//
// Commit and rollback belong to the backend's transaction object; the
// context only decides which one to call.
//
// ============================================================================

mod async_context;
mod context;
pub mod mode;
pub mod traits;

pub use async_context::AsyncTransactionalContext;
pub use context::TransactionalContext;
pub use mode::TransactionMode;
pub use traits::{
    AsyncTransactionScope, AsyncTransactional, ConfiguredMode, Session, SessionFactory,
    TransactionScope, Transactional,
};
