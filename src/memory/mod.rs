// ============================================================================
// In-Memory Relational Backend
// ============================================================================
//
// A small transactional backend so contexts can be exercised end to end
// without an external server:
//
//   MemoryEngine      shared tables + connection counters
//   MemoryConnection  autocommit writes, transaction stack with savepoints
//   MemoryTransaction LIFO commit/rollback, rollback on drop
//   MemorySession     unit-of-work buffer over a connection
//   MemoryAdapter     Adapter / AsyncAdapter implementations
//
// ============================================================================

pub mod adapter;
pub mod config;
pub mod connection;
pub mod engine;
pub mod session;
pub mod transaction;

pub use adapter::{AdapterStats, AsyncMemoryAdapter, MemoryAdapter};
pub use config::MemoryConfig;
pub use connection::MemoryConnection;
pub use engine::{EngineStats, MemoryEngine, MemoryError};
pub use session::MemorySession;
pub use transaction::{MemoryTransaction, TransactionId, TransactionState};
