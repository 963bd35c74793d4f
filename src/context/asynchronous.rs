use super::guard::{ExitGuard, ScopeExit, settle};
use crate::adapter::AsyncAdapter;
use crate::core::{CtxError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Asynchronous mirror of [`Context`](crate::Context).
///
/// Suspension happens only inside adapter calls; depth bookkeeping is always
/// done synchronously, so the counter is never observed half-updated.
///
/// # Cancellation
/// If a future returned by [`open`](AsyncContext::open) or
/// [`begin`](AsyncContext::begin) is dropped before completion, the scope's
/// depth is unwound immediately. Async release cannot run from `Drop`, so a
/// client whose last scope was cancelled is parked as *abandoned* and handed
/// to the adapter by the next [`acquire`](AsyncContext::acquire), by
/// [`reap`](AsyncContext::reap), or by a request-scope sweep.
pub struct AsyncContext<A: AsyncAdapter> {
    adapter: Arc<A>,
    depth: usize,
    client: Option<A::Client>,
    initialized: bool,
    abandoned: Vec<A::Client>,
}

impl<A: AsyncAdapter> AsyncContext<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            adapter,
            depth: 0,
            client: None,
            initialized: false,
            abandoned: Vec::new(),
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn current(&self) -> Option<&A::Client> {
        self.client.as_ref()
    }

    /// Number of clients from cancelled scopes still owed a release.
    pub fn abandoned(&self) -> usize {
        self.abandoned.len()
    }

    /// Return the stored client, creating it if the slot is empty.
    pub async fn client(&mut self) -> Result<A::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = self.adapter.new().await?;
        debug!(adapter = self.adapter.name(), "client created");
        self.initialized = true;
        self.client = Some(client.clone());
        Ok(client)
    }

    pub fn invalidate(&mut self) -> Option<A::Client> {
        self.client.take()
    }

    pub async fn acquire(&mut self) -> Result<A::Client> {
        self.reap().await?;

        let closed = match &self.client {
            Some(client) => self.adapter.is_closed(client).await,
            None => false,
        };
        if closed {
            debug!(adapter = self.adapter.name(), "discarding closed client");
            self.invalidate();
        }

        let client = self.client().await?;
        self.depth += 1;
        trace!(adapter = self.adapter.name(), depth = self.depth, "acquired");
        Ok(client)
    }

    pub async fn release(&mut self) -> Result<()> {
        match self.unwind()? {
            Some(client) => {
                debug!(adapter = self.adapter.name(), "client released");
                self.adapter.release(client).await
            }
            None => Ok(()),
        }
    }

    /// Release every abandoned client. Stops at the first adapter failure;
    /// the failing client is not retried.
    pub async fn reap(&mut self) -> Result<usize> {
        let mut reaped = 0;
        while let Some(client) = self.abandoned.pop() {
            debug!(adapter = self.adapter.name(), "releasing abandoned client");
            self.adapter.release(client).await?;
            reaped += 1;
        }
        Ok(reaped)
    }

    /// Drop all bookkeeping without calling the adapter.
    pub fn reset(&mut self) -> Option<A::Client> {
        self.depth = 0;
        self.client.take()
    }

    /// Run `body` inside one acquisition.
    pub async fn open<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(&mut Self) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        self.acquire().await?;
        let mut guard = ExitGuard::new(self);
        let out = body(guard.ctx()).await;
        let released = guard.disarm().release().await;
        settle(out, released)
    }

    /// Run `body` inside one acquisition, handing it the client.
    pub async fn begin<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: AsyncFnOnce(&mut Self, A::Client) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.acquire().await?;
        let mut guard = ExitGuard::new(self);
        let out = body(guard.ctx(), client).await;
        let released = guard.disarm().release().await;
        settle(out, released)
    }

    /// Synchronous half of a release: update the depth and, at the outermost
    /// level, take the client out of the slot.
    pub(crate) fn unwind(&mut self) -> Result<Option<A::Client>> {
        if !self.initialized {
            return Err(CtxError::usage(format!(
                "release called before client initialization on adapter '{}'",
                self.adapter.name()
            )));
        }

        match self.depth {
            0 => Err(CtxError::usage(format!(
                "release without matching acquire on adapter '{}'",
                self.adapter.name()
            ))),
            1 => {
                self.depth = 0;
                trace!(adapter = self.adapter.name(), depth = 0, "released");
                Ok(self.client.take())
            }
            _ => {
                self.depth -= 1;
                trace!(adapter = self.adapter.name(), depth = self.depth, "released");
                Ok(None)
            }
        }
    }
}

impl<A: AsyncAdapter> ScopeExit for AsyncContext<A> {
    fn exit_on_drop(&mut self) {
        match self.unwind() {
            Ok(Some(client)) => {
                warn!(adapter = self.adapter.name(), "scope cancelled; client parked for release");
                self.abandoned.push(client);
            }
            Ok(None) => {}
            Err(err) => {
                warn!(adapter = self.adapter.name(), error = %err, "unwind failed while cancelling scope")
            }
        }
    }
}

impl<A: AsyncAdapter> std::fmt::Debug for AsyncContext<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncContext")
            .field("adapter", &self.adapter.name())
            .field("depth", &self.depth)
            .field("has_client", &self.client.is_some())
            .field("abandoned", &self.abandoned.len())
            .finish()
    }
}
