use super::connection::MemoryConnection;
use crate::core::Result;
use crate::transaction::{AsyncTransactionScope, TransactionScope};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback / drop──> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED BACK"),
        }
    }
}

/// One frame of a connection's transaction stack: the top-level
/// transaction at depth 1, a savepoint above that.
///
/// Frames finish in LIFO order. Dropping an active frame rolls it back.
pub struct MemoryTransaction {
    id: TransactionId,
    depth: usize,
    conn: MemoryConnection,
    state: TransactionState,
}

impl MemoryTransaction {
    pub(crate) fn new(id: TransactionId, depth: usize, conn: MemoryConnection) -> Self {
        Self {
            id,
            depth,
            conn,
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// 1 for a top-level transaction, higher for savepoints.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_nested(&self) -> bool {
        self.depth > 1
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.commit_frame(self.id)?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.conn.rollback_frame(self.id)?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            debug!(transaction = %self.id, "rolling back unfinished transaction");
            if self.conn.rollback_frame(self.id).is_ok() {
                self.state = TransactionState::RolledBack;
            }
        }
    }
}

impl std::fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("connection", &self.conn.id())
            .field("state", &self.state)
            .finish()
    }
}

impl TransactionScope for MemoryTransaction {
    fn commit(self) -> Result<()> {
        MemoryTransaction::commit(self)
    }

    fn rollback(self) -> Result<()> {
        MemoryTransaction::rollback(self)
    }
}

#[async_trait]
impl AsyncTransactionScope for MemoryTransaction {
    async fn commit(self) -> Result<()> {
        tokio::task::yield_now().await;
        MemoryTransaction::commit(self)
    }

    async fn rollback(self) -> Result<()> {
        tokio::task::yield_now().await;
        MemoryTransaction::rollback(self)
    }
}
