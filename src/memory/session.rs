use super::connection::MemoryConnection;
use crate::core::Result;
use crate::transaction::Session;
use tracing::debug;

/// Unit of work over a [`MemoryConnection`]
///
/// Rows added to the session are buffered and written to the connection on
/// [`flush`](MemorySession::flush). Queries flush first, so the session
/// always reads its own writes. Closing discards whatever was not flushed.
#[derive(Debug)]
pub struct MemorySession {
    conn: MemoryConnection,
    pending: Vec<(String, String)>,
}

impl MemorySession {
    pub(crate) fn new(conn: MemoryConnection) -> Self {
        Self {
            conn,
            pending: Vec::new(),
        }
    }

    pub fn connection(&self) -> &MemoryConnection {
        &self.conn
    }

    /// Stage a row for insertion.
    pub fn add(&mut self, table: &str, row: &str) {
        self.pending.push((table.to_string(), row.to_string()));
    }

    /// Number of staged rows not yet flushed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Write staged rows to the connection.
    pub fn flush(&mut self) -> Result<usize> {
        let staged = std::mem::take(&mut self.pending);
        let count = staged.len();
        for (table, row) in &staged {
            self.conn.insert(table, row)?;
        }
        Ok(count)
    }

    pub fn rows(&mut self, table: &str) -> Result<Vec<String>> {
        self.flush()?;
        self.conn.rows(table)
    }
}

impl Session for MemorySession {
    fn close(self) -> Result<()> {
        if !self.pending.is_empty() {
            debug!(
                connection = self.conn.id(),
                discarded = self.pending.len(),
                "closing session with unflushed rows"
            );
        }
        Ok(())
    }
}
