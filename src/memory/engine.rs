use super::connection::MemoryConnection;
use crate::core::{CtxError, Result};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

/// Failures raised by the in-memory backend itself.
///
/// Surfaced wrapped in [`CtxError::Adapter`] or [`CtxError::Transaction`]
/// and recoverable with `downcast_ref`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("database '{0}' is unreachable")]
    Unreachable(String),

    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("transaction already active on connection {0}")]
    AlreadyInTransaction(u64),

    #[error("no active transaction on connection {0}")]
    NoActiveTransaction(u64),

    #[error("{0} is not the innermost transaction")]
    NotInnermost(String),
}

lazy_static! {
    static ref ENGINES: Mutex<HashMap<String, Arc<MemoryEngine>>> = Mutex::new(HashMap::new());
}

/// Shared in-memory database: named tables of text rows.
pub struct MemoryEngine {
    database: String,
    tables: RwLock<HashMap<String, Vec<String>>>,
    unreachable: AtomicBool,
    next_connection_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryEngine {
    /// Create a private engine not shared through [`MemoryEngine::named`].
    pub fn new(database: &str) -> Arc<Self> {
        Arc::new(Self {
            database: database.to_string(),
            tables: RwLock::new(HashMap::new()),
            unreachable: AtomicBool::new(false),
            next_connection_id: AtomicU64::new(1),
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    /// Process-wide engine for `database`, created on first use.
    pub fn named(database: &str) -> Arc<Self> {
        let mut engines = ENGINES.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            engines
                .entry(database.to_string())
                .or_insert_with(|| Self::new(database)),
        )
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Make new connections and new top-level transactions fail,
    /// simulating a backend outage.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn is_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::SeqCst)
    }

    pub fn connect(self: &Arc<Self>) -> Result<MemoryConnection> {
        if self.is_unreachable() {
            return Err(CtxError::adapter(MemoryError::Unreachable(self.database.clone())));
        }

        let id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection::new(id, Arc::clone(self)))
    }

    /// Committed rows of `table`.
    pub fn rows(&self, table: &str) -> Result<Vec<String>> {
        let tables = self.tables.read()?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    pub fn stats(&self) -> EngineStats {
        let opened = self.opened.load(Ordering::SeqCst);
        let closed = self.closed.load(Ordering::SeqCst);
        EngineStats {
            opened,
            closed,
            open: opened.saturating_sub(closed),
        }
    }

    pub(crate) fn apply(&self, rows: Vec<(String, String)>) -> Result<()> {
        let mut tables = self.tables.write()?;
        for (table, row) in rows {
            tables.entry(table).or_default().push(row);
        }
        Ok(())
    }

    pub(crate) fn connection_closed(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("database", &self.database)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Connection counters of one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub opened: usize,
    pub closed: usize,
    pub open: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Engine Stats: {} opened, {} closed, {} open",
            self.opened, self.closed, self.open
        )
    }
}
