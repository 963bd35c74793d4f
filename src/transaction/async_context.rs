use super::mode::TransactionMode;
use super::traits::{AsyncTransactional, ConfiguredMode, finish_async, start_async};
use crate::adapter::AsyncAdapter;
use crate::context::AsyncContext;
use crate::context::guard::{ExitGuard, ScopeExit, settle};
use crate::core::{CtxError, Result};
use std::sync::Arc;

/// Asynchronous mirror of
/// [`TransactionalContext`](crate::TransactionalContext).
///
/// A cancelled scope drops its transaction (the backend rolls it back) and
/// parks the client for release like any [`AsyncContext`] scope.
pub struct AsyncTransactionalContext<A: AsyncAdapter> {
    inner: AsyncContext<A>,
    mode: TransactionMode,
}

impl<A: AsyncAdapter> AsyncTransactionalContext<A> {
    pub fn new(adapter: Arc<A>, mode: TransactionMode) -> Self {
        Self {
            inner: AsyncContext::new(adapter),
            mode,
        }
    }

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

    pub fn context(&self) -> &AsyncContext<A> {
        &self.inner
    }

    pub fn context_mut(&mut self) -> &mut AsyncContext<A> {
        &mut self.inner
    }

    pub fn depth(&self) -> usize {
        self.inner.depth()
    }

    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub async fn acquire(&mut self) -> Result<A::Client> {
        self.inner.acquire().await
    }

    pub async fn release(&mut self) -> Result<()> {
        self.inner.release().await
    }
}

impl<A> AsyncTransactionalContext<A>
where
    A: AsyncAdapter,
    A::Client: AsyncTransactional,
{
    pub async fn open<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(&mut Self) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.inner.acquire().await?;
        let transactional = self.mode == TransactionMode::Open;
        let mut guard = ExitGuard::new(self);
        let out = if transactional {
            match start_async(&client).await {
                Ok(tx) => {
                    let out = body(guard.ctx()).await;
                    finish_async(tx, out).await
                }
                Err(err) => Err(err.into()),
            }
        } else {
            body(guard.ctx()).await
        };
        let released = guard.disarm().inner.release().await;
        settle(out, released)
    }

    pub async fn begin<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(&mut Self, A::Client) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.inner.acquire().await?;
        let transactional = self.mode == TransactionMode::Begin;
        let mut guard = ExitGuard::new(self);
        let out = if transactional {
            match start_async(&client).await {
                Ok(tx) => {
                    let out = body(guard.ctx(), client).await;
                    finish_async(tx, out).await
                }
                Err(err) => Err(err.into()),
            }
        } else {
            body(guard.ctx(), client).await
        };
        let released = guard.disarm().inner.release().await;
        settle(out, released)
    }
}

impl<A: AsyncAdapter> ScopeExit for AsyncTransactionalContext<A> {
    fn exit_on_drop(&mut self) {
        self.inner.exit_on_drop();
    }
}

impl<A: AsyncAdapter> std::fmt::Debug for AsyncTransactionalContext<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTransactionalContext")
            .field("mode", &self.mode)
            .field("context", &self.inner)
            .finish()
    }
}
