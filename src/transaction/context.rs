use super::mode::TransactionMode;
use super::traits::{ConfiguredMode, Session, SessionFactory, Transactional, within};
use crate::adapter::Adapter;
use crate::context::Context;
use crate::context::guard::{ExitGuard, ScopeExit, settle};
use crate::core::{CtxError, Result};
use std::sync::Arc;

/// A [`Context`] whose scoped entry points run inside backend transactions.
///
/// The [`TransactionMode`] picks which entry point is transactional. A scope
/// entered while the client already has a transaction open gets a nested
/// (savepoint) transaction, so re-entrant scopes never start a second
/// top-level transaction. Commit happens on `Ok`, rollback on `Err`; a
/// panicking body drops the transaction and the backend rolls it back.
///
/// # Examples
///
/// ```
/// use scopectx::{MemoryAdapter, MemoryConfig, TransactionMode, TransactionalContext};
/// use std::sync::Arc;
///
/// # fn main() -> Result<(), scopectx::CtxError> {
/// let adapter = Arc::new(MemoryAdapter::new(MemoryConfig::new("docs_tx")));
/// let mut ctx = TransactionalContext::new(adapter, TransactionMode::Begin);
///
/// ctx.begin(|_, conn| conn.insert("users", "alice"))?;
/// assert_eq!(ctx.begin(|_, conn| conn.rows("users"))?, vec!["alice".to_string()]);
/// # Ok(())
/// # }
/// ```
pub struct TransactionalContext<A: Adapter> {
    inner: Context<A>,
    mode: TransactionMode,
}

impl<A: Adapter> TransactionalContext<A> {
    pub fn new(adapter: Arc<A>, mode: TransactionMode) -> Self {
        Self {
            inner: Context::new(adapter),
            mode,
        }
    }

    /// Context in the mode named by the adapter's configuration.
    pub fn from_adapter(adapter: Arc<A>) -> Self
    where
        A: ConfiguredMode,
    {
        let mode = adapter.transaction_mode();
        Self::new(adapter, mode)
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// The plain context underneath, for bookkeeping queries.
    pub fn context(&self) -> &Context<A> {
        &self.inner
    }

    pub fn context_mut(&mut self) -> &mut Context<A> {
        &mut self.inner
    }

    pub fn adapter(&self) -> &Arc<A> {
        self.inner.adapter()
    }

    pub fn depth(&self) -> usize {
        self.inner.depth()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn client(&mut self) -> Result<A::Client> {
        self.inner.client()
    }

    pub fn acquire(&mut self) -> Result<A::Client> {
        self.inner.acquire()
    }

    pub fn release(&mut self) -> Result<()> {
        self.inner.release()
    }
}

impl<A> TransactionalContext<A>
where
    A: Adapter,
    A::Client: Transactional,
{
    /// Run `body` inside one acquisition; transactional in
    /// [`TransactionMode::Open`].
    pub fn open<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.inner.acquire()?;
        let transactional = self.mode == TransactionMode::Open;
        let mut guard = ExitGuard::new(self);
        let out = if transactional {
            within(&client, || body(guard.ctx()))
        } else {
            body(guard.ctx())
        };
        let released = guard.disarm().inner.release();
        settle(out, released)
    }

    /// Run `body` with the client; transactional in
    /// [`TransactionMode::Begin`].
    pub fn begin<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self, A::Client) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.inner.acquire()?;
        let transactional = self.mode == TransactionMode::Begin;
        let mut guard = ExitGuard::new(self);
        let out = if transactional {
            let scoped = client.clone();
            within(&client, || body(guard.ctx(), scoped))
        } else {
            body(guard.ctx(), client)
        };
        let released = guard.disarm().inner.release();
        settle(out, released)
    }
}

impl<A> TransactionalContext<A>
where
    A: Adapter,
    A::Client: Transactional + SessionFactory,
{
    /// Run `body` with a unit-of-work session layered over the client of a
    /// [`begin`](TransactionalContext::begin) scope. The session is closed
    /// on every exit path.
    pub fn session<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self, &mut <A::Client as SessionFactory>::Session) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        self.begin(|ctx, client| {
            let mut session = client.open_session()?;
            let out = body(ctx, &mut session);
            let closed = session.close();
            settle(out, closed)
        })
    }
}

impl<A: Adapter> ScopeExit for TransactionalContext<A> {
    fn exit_on_drop(&mut self) {
        self.inner.exit_on_drop();
    }
}

impl<A: Adapter> std::fmt::Debug for TransactionalContext<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalContext")
            .field("mode", &self.mode)
            .field("context", &self.inner)
            .finish()
    }
}
