use super::guard::{ExitGuard, ScopeExit, settle};
use crate::adapter::Adapter;
use crate::core::{CtxError, Result};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Reference-counted, lazily-initialized handle around one backend client.
///
/// Every [`acquire`](Context::acquire) must be matched by one
/// [`release`](Context::release); the client is handed back to the adapter
/// only when the depth returns to zero. Prefer the scoped helpers
/// [`open`](Context::open) and [`begin`](Context::begin), which keep the
/// balance on every exit path.
///
/// # Thread Safety
/// There is no internal locking. All mutating operations take `&mut self`,
/// so sharing one context across threads requires external synchronization.
pub struct Context<A: Adapter> {
    adapter: Arc<A>,
    depth: usize,
    client: Option<A::Client>,
}

impl<A: Adapter> Context<A> {
    pub fn new(adapter: Arc<A>) -> Self {
        Self {
            adapter,
            depth: 0,
            client: None,
        }
    }

    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }

    /// Number of acquisitions not yet matched by a release.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    /// Peek at the stored client without creating one.
    pub fn current(&self) -> Option<&A::Client> {
        self.client.as_ref()
    }

    /// Return the stored client, creating it through the adapter if the slot
    /// is empty. Does not change the depth.
    pub fn client(&mut self) -> Result<A::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }

        let client = self.adapter.new()?;
        debug!(adapter = self.adapter.name(), "client created");
        self.client = Some(client.clone());
        Ok(client)
    }

    /// Forget the stored client without releasing it.
    pub fn invalidate(&mut self) -> Option<A::Client> {
        self.client.take()
    }

    /// Enter one level of use and return the client.
    ///
    /// A stored client the adapter reports as closed is discarded first, so
    /// a fresh one is created.
    pub fn acquire(&mut self) -> Result<A::Client> {
        if self.current().is_some_and(|client| self.adapter.is_closed(client)) {
            debug!(adapter = self.adapter.name(), "discarding closed client");
            self.invalidate();
        }

        let client = self.client()?;
        self.depth += 1;
        trace!(adapter = self.adapter.name(), depth = self.depth, "acquired");
        Ok(client)
    }

    /// Leave one level of use. The outermost release hands the client back
    /// to the adapter and clears the slot.
    pub fn release(&mut self) -> Result<()> {
        match self.depth {
            0 => Err(CtxError::usage(format!(
                "release without matching acquire on adapter '{}'",
                self.adapter.name()
            ))),
            1 => {
                self.depth = 0;
                trace!(adapter = self.adapter.name(), depth = 0, "released");
                match self.client.take() {
                    Some(client) => {
                        debug!(adapter = self.adapter.name(), "client released");
                        self.adapter.release(client)
                    }
                    None => Ok(()),
                }
            }
            _ => {
                self.depth -= 1;
                trace!(adapter = self.adapter.name(), depth = self.depth, "released");
                Ok(())
            }
        }
    }

    /// Drop all bookkeeping without calling the adapter.
    pub fn reset(&mut self) -> Option<A::Client> {
        self.depth = 0;
        self.client.take()
    }

    /// Run `body` inside one acquisition.
    ///
    /// # Examples
    ///
    /// ```
    /// use scopectx::{Context, MemoryAdapter, MemoryConfig};
    /// use std::sync::Arc;
    ///
    /// # fn main() -> Result<(), scopectx::CtxError> {
    /// let adapter = Arc::new(MemoryAdapter::new(MemoryConfig::new("docs_open")));
    /// let mut ctx = Context::new(adapter);
    ///
    /// ctx.open(|ctx| {
    ///     assert!(ctx.is_active());
    ///     Ok::<_, scopectx::CtxError>(())
    /// })?;
    /// assert!(!ctx.is_active());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        self.acquire()?;
        let mut guard = ExitGuard::new(self);
        let out = body(guard.ctx());
        let released = guard.disarm().release();
        settle(out, released)
    }

    /// Run `body` inside one acquisition, handing it the client.
    pub fn begin<R, E, F>(&mut self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&mut Self, A::Client) -> std::result::Result<R, E>,
        E: From<CtxError>,
    {
        let client = self.acquire()?;
        let mut guard = ExitGuard::new(self);
        let out = body(guard.ctx(), client);
        let released = guard.disarm().release();
        settle(out, released)
    }
}

impl<A: Adapter> ScopeExit for Context<A> {
    fn exit_on_drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(adapter = self.adapter.name(), error = %err, "release failed while unwinding scope");
        }
    }
}

impl<A: Adapter> std::fmt::Debug for Context<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("adapter", &self.adapter.name())
            .field("depth", &self.depth)
            .field("has_client", &self.client.is_some())
            .finish()
    }
}
