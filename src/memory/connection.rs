use super::engine::{MemoryEngine, MemoryError};
use super::session::MemorySession;
use super::transaction::{MemoryTransaction, TransactionId};
use crate::core::{CtxError, Result};
use crate::transaction::{AsyncTransactional, SessionFactory, Transactional};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Connection handle to a [`MemoryEngine`]
///
/// Clones share the same underlying connection. Writes made outside a
/// transaction are applied immediately; inside a transaction they are
/// buffered until the outermost transaction commits.
#[derive(Clone)]
pub struct MemoryConnection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    id: u64,
    engine: Arc<MemoryEngine>,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    closed: bool,
    /// Open transactions, outermost first. Later frames are savepoints.
    frames: Vec<Frame>,
    /// Uncommitted `(table, row)` writes of the open transaction
    pending: Vec<(String, String)>,
}

struct Frame {
    id: TransactionId,
    /// Length of `pending` when the frame started
    mark: usize,
}

impl MemoryConnection {
    pub(crate) fn new(id: u64, engine: Arc<MemoryEngine>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                engine,
                state: Mutex::new(ConnectionState::default()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.inner.engine
    }

    /// Whether `other` is a handle to the same connection.
    pub fn same_as(&self, other: &MemoryConnection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.closed)
            .unwrap_or(true)
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction_depth() > 0
    }

    /// Number of open transactions, counting savepoints.
    pub fn transaction_depth(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|state| state.frames.len())
            .unwrap_or(0)
    }

    /// Insert a row into `table`.
    pub fn insert(&self, table: &str, row: &str) -> Result<()> {
        let mut state = self.inner.state.lock()?;
        if state.closed {
            return Err(CtxError::adapter(MemoryError::ConnectionClosed(self.id())));
        }

        if state.frames.is_empty() {
            drop(state);
            return self
                .inner
                .engine
                .apply(vec![(table.to_string(), row.to_string())]);
        }

        state.pending.push((table.to_string(), row.to_string()));
        Ok(())
    }

    /// Rows of `table` as seen by this connection, including its own
    /// uncommitted writes.
    pub fn rows(&self, table: &str) -> Result<Vec<String>> {
        let state = self.inner.state.lock()?;
        if state.closed {
            return Err(CtxError::adapter(MemoryError::ConnectionClosed(self.id())));
        }

        let mut rows = self.inner.engine.rows(table)?;
        rows.extend(
            state
                .pending
                .iter()
                .filter(|(t, _)| t == table)
                .map(|(_, row)| row.clone()),
        );
        Ok(rows)
    }

    /// Begin a top-level transaction
    pub fn begin(&self) -> Result<MemoryTransaction> {
        let mut state = self.inner.state.lock()?;
        if state.closed {
            return Err(CtxError::transaction(MemoryError::ConnectionClosed(self.id())));
        }
        if !state.frames.is_empty() {
            return Err(CtxError::transaction(MemoryError::AlreadyInTransaction(self.id())));
        }
        if self.inner.engine.is_unreachable() {
            return Err(CtxError::transaction(MemoryError::Unreachable(
                self.inner.engine.database().to_string(),
            )));
        }

        let id = TransactionId::new();
        state.frames.push(Frame { id, mark: 0 });
        debug!(connection = self.id(), transaction = %id, "BEGIN");
        Ok(MemoryTransaction::new(id, 1, self.clone()))
    }

    /// Begin a savepoint inside the open transaction
    pub fn savepoint(&self) -> Result<MemoryTransaction> {
        let mut state = self.inner.state.lock()?;
        if state.closed {
            return Err(CtxError::transaction(MemoryError::ConnectionClosed(self.id())));
        }
        if state.frames.is_empty() {
            return Err(CtxError::transaction(MemoryError::NoActiveTransaction(self.id())));
        }

        let id = TransactionId::new();
        let mark = state.pending.len();
        state.frames.push(Frame { id, mark });
        let depth = state.frames.len();
        debug!(connection = self.id(), transaction = %id, depth, "SAVEPOINT");
        Ok(MemoryTransaction::new(id, depth, self.clone()))
    }

    /// Close the connection, rolling back any open transaction
    pub fn close(&self) -> Result<()> {
        let mut state = self.inner.state.lock()?;
        if state.closed {
            return Ok(());
        }

        state.frames.clear();
        state.pending.clear();
        state.closed = true;
        self.inner.engine.connection_closed();
        debug!(connection = self.id(), "connection closed");
        Ok(())
    }

    pub(crate) fn commit_frame(&self, id: TransactionId) -> Result<()> {
        let mut state = self.inner.state.lock()?;
        self.check_innermost(&state, id)?;
        state.frames.pop();

        if state.frames.is_empty() {
            let pending = std::mem::take(&mut state.pending);
            drop(state);
            debug!(connection = self.id(), transaction = %id, rows = pending.len(), "COMMIT");
            return self.inner.engine.apply(pending);
        }

        debug!(connection = self.id(), transaction = %id, "RELEASE SAVEPOINT");
        Ok(())
    }

    pub(crate) fn rollback_frame(&self, id: TransactionId) -> Result<()> {
        let mut state = self.inner.state.lock()?;
        self.check_innermost(&state, id)?;

        if let Some(frame) = state.frames.pop() {
            state.pending.truncate(frame.mark);
        }
        debug!(connection = self.id(), transaction = %id, "ROLLBACK");
        Ok(())
    }

    fn check_innermost(&self, state: &ConnectionState, id: TransactionId) -> Result<()> {
        match state.frames.last() {
            Some(frame) if frame.id == id => Ok(()),
            Some(_) => Err(CtxError::transaction(MemoryError::NotInnermost(id.to_string()))),
            // Closing the connection discards every frame.
            None => Err(CtxError::transaction(MemoryError::NoActiveTransaction(self.id()))),
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        // The last handle went away without an explicit close.
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.closed {
            state.closed = true;
            self.engine.connection_closed();
        }
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnection")
            .field("id", &self.id())
            .field("database", &self.inner.engine.database())
            .field("closed", &self.is_closed())
            .field("transaction_depth", &self.transaction_depth())
            .finish()
    }
}

impl Transactional for MemoryConnection {
    type Transaction = MemoryTransaction;

    fn in_transaction(&self) -> bool {
        MemoryConnection::in_transaction(self)
    }

    fn begin_transaction(&self) -> Result<MemoryTransaction> {
        self.begin()
    }

    fn begin_nested(&self) -> Result<MemoryTransaction> {
        self.savepoint()
    }
}

#[async_trait]
impl AsyncTransactional for MemoryConnection {
    type Transaction = MemoryTransaction;

    async fn in_transaction(&self) -> bool {
        MemoryConnection::in_transaction(self)
    }

    async fn begin_transaction(&self) -> Result<MemoryTransaction> {
        tokio::task::yield_now().await;
        self.begin()
    }

    async fn begin_nested(&self) -> Result<MemoryTransaction> {
        tokio::task::yield_now().await;
        self.savepoint()
    }
}

impl SessionFactory for MemoryConnection {
    type Session = MemorySession;

    fn open_session(&self) -> Result<MemorySession> {
        if self.is_closed() {
            return Err(CtxError::adapter(MemoryError::ConnectionClosed(self.id())));
        }
        Ok(MemorySession::new(self.clone()))
    }
}
