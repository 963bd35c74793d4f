// ============================================================================
// Request Scope
// ============================================================================
//
// Explicit container for every context touched during one unit of work.
// The surrounding framework creates one per request, threads it through the
// call chain, and calls `sweep()` when the request ends to catch handles
// that were left behind.
//
// ============================================================================

use crate::adapter::{Adapter, AsyncAdapter};
use crate::context::{AsyncContext, Context};
use crate::core::{CtxError, Result};
use crate::transaction::{
    AsyncTransactionalContext, ConfiguredMode, TransactionMode, TransactionalContext,
};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend-agnostic view of a context, enough for a sweep to find and clear
/// stale handles.
#[async_trait]
pub trait TrackedContext: Send + Sync {
    fn adapter_name(&self) -> &str;

    fn is_active(&self) -> bool;

    fn has_client(&self) -> bool;

    /// Whether the adapter reports the stored client as closed. `false`
    /// when there is no client.
    async fn client_closed(&self) -> bool;

    /// Drop depth and client slot without calling the adapter.
    fn reset(&mut self);

    /// Release clients owed a release by cancelled scopes.
    async fn reap(&mut self) -> Result<usize> {
        Ok(0)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[async_trait]
impl<A: Adapter> TrackedContext for Context<A> {
    fn adapter_name(&self) -> &str {
        self.adapter().name()
    }

    fn is_active(&self) -> bool {
        Context::is_active(self)
    }

    fn has_client(&self) -> bool {
        self.current().is_some()
    }

    async fn client_closed(&self) -> bool {
        self.current()
            .is_some_and(|client| self.adapter().is_closed(client))
    }

    fn reset(&mut self) {
        Context::reset(self);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl<A: AsyncAdapter> TrackedContext for AsyncContext<A> {
    fn adapter_name(&self) -> &str {
        self.adapter().name()
    }

    fn is_active(&self) -> bool {
        AsyncContext::is_active(self)
    }

    fn has_client(&self) -> bool {
        self.current().is_some()
    }

    async fn client_closed(&self) -> bool {
        match self.current() {
            Some(client) => self.adapter().is_closed(client).await,
            None => false,
        }
    }

    fn reset(&mut self) {
        AsyncContext::reset(self);
    }

    async fn reap(&mut self) -> Result<usize> {
        AsyncContext::reap(self).await
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl<A: Adapter> TrackedContext for TransactionalContext<A> {
    fn adapter_name(&self) -> &str {
        self.context().adapter_name()
    }

    fn is_active(&self) -> bool {
        self.context().is_active()
    }

    fn has_client(&self) -> bool {
        self.context().has_client()
    }

    async fn client_closed(&self) -> bool {
        self.context().client_closed().await
    }

    fn reset(&mut self) {
        self.context_mut().reset();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[async_trait]
impl<A: AsyncAdapter> TrackedContext for AsyncTransactionalContext<A> {
    fn adapter_name(&self) -> &str {
        self.context().adapter_name()
    }

    fn is_active(&self) -> bool {
        self.context().is_active()
    }

    fn has_client(&self) -> bool {
        self.context().has_client()
    }

    async fn client_closed(&self) -> bool {
        self.context().client_closed().await
    }

    fn reset(&mut self) {
        self.context_mut().reset();
    }

    async fn reap(&mut self) -> Result<usize> {
        self.context_mut().reap().await
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Adapter identity plus context flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContextKey {
    adapter: usize,
    flavor: TypeId,
}

impl ContextKey {
    fn of<C: 'static, A>(adapter: &Arc<A>) -> Self {
        Self {
            adapter: Arc::as_ptr(adapter) as *const () as usize,
            flavor: TypeId::of::<C>(),
        }
    }
}

/// Contexts touched during one unit of work, in first-touch order.
///
/// # Examples
///
/// ```
/// use scopectx::{MemoryAdapter, MemoryConfig, RequestScope};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), scopectx::CtxError> {
/// let adapter = Arc::new(MemoryAdapter::new(MemoryConfig::new("docs_scope")));
/// let mut scope = RequestScope::new();
///
/// scope.context(&adapter)?.acquire()?;
/// scope.context(&adapter)?.release()?;
///
/// let report = scope.sweep().await;
/// assert!(report.is_clean());
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RequestScope {
    contexts: Vec<(ContextKey, Box<dyn TrackedContext>)>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// The context bound to `adapter` in this unit of work, created on first
    /// touch.
    pub fn context<A: Adapter>(&mut self, adapter: &Arc<A>) -> Result<&mut Context<A>> {
        self.track(ContextKey::of::<Context<A>, A>(adapter), || {
            Context::new(Arc::clone(adapter))
        })
    }

    pub fn async_context<A: AsyncAdapter>(
        &mut self,
        adapter: &Arc<A>,
    ) -> Result<&mut AsyncContext<A>> {
        self.track(ContextKey::of::<AsyncContext<A>, A>(adapter), || {
            AsyncContext::new(Arc::clone(adapter))
        })
    }

    /// Transactional context bound to `adapter`. `mode` only applies when
    /// the context is created.
    pub fn transactional_context<A: Adapter>(
        &mut self,
        adapter: &Arc<A>,
        mode: TransactionMode,
    ) -> Result<&mut TransactionalContext<A>> {
        self.track(ContextKey::of::<TransactionalContext<A>, A>(adapter), || {
            TransactionalContext::new(Arc::clone(adapter), mode)
        })
    }

    pub fn async_transactional_context<A: AsyncAdapter>(
        &mut self,
        adapter: &Arc<A>,
        mode: TransactionMode,
    ) -> Result<&mut AsyncTransactionalContext<A>> {
        self.track(
            ContextKey::of::<AsyncTransactionalContext<A>, A>(adapter),
            || AsyncTransactionalContext::new(Arc::clone(adapter), mode),
        )
    }

    /// Transactional context bound to `adapter`, in the mode its
    /// configuration names.
    pub fn configured_transactional_context<A: Adapter + ConfiguredMode>(
        &mut self,
        adapter: &Arc<A>,
    ) -> Result<&mut TransactionalContext<A>> {
        let mode = adapter.transaction_mode();
        self.transactional_context(adapter, mode)
    }

    pub fn configured_async_transactional_context<A: AsyncAdapter + ConfiguredMode>(
        &mut self,
        adapter: &Arc<A>,
    ) -> Result<&mut AsyncTransactionalContext<A>> {
        let mode = adapter.transaction_mode();
        self.async_transactional_context(adapter, mode)
    }

    /// Walk every tracked context and clear what was left behind.
    ///
    /// Abandoned clients are released. A context whose client the adapter
    /// already reports closed has its bookkeeping dropped without a second
    /// release. A context still holding an open client is reported as
    /// leaked and left alone. Failures are logged and counted.
    pub async fn sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        for (_, ctx) in self.contexts.iter_mut() {
            report.inspected += 1;

            match ctx.reap().await {
                Ok(reaped) => report.reaped += reaped,
                Err(err) => {
                    warn!(adapter = ctx.adapter_name(), error = %err, "failed to release abandoned client");
                    report.failures += 1;
                }
            }

            if !ctx.has_client() {
                continue;
            }

            if ctx.client_closed().await {
                debug!(adapter = ctx.adapter_name(), "dropping bookkeeping for closed client");
                ctx.reset();
                report.discarded += 1;
            } else {
                warn!(
                    adapter = ctx.adapter_name(),
                    active = ctx.is_active(),
                    "client still open at end of unit of work"
                );
                report.leaked += 1;
            }
        }

        report
    }

    fn track<C, F>(&mut self, key: ContextKey, make: F) -> Result<&mut C>
    where
        C: TrackedContext + 'static,
        F: FnOnce() -> C,
    {
        let index = match self.contexts.iter().position(|(k, _)| *k == key) {
            Some(index) => index,
            None => {
                self.contexts.push((key, Box::new(make())));
                self.contexts.len() - 1
            }
        };

        self.contexts[index]
            .1
            .as_any_mut()
            .downcast_mut::<C>()
            .ok_or_else(|| CtxError::usage("context registered under a different type"))
    }
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.contexts.iter().map(|(_, ctx)| ctx.adapter_name()))
            .finish()
    }
}

/// Outcome of [`RequestScope::sweep`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub reaped: usize,
    pub discarded: usize,
    pub leaked: usize,
    pub failures: usize,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.leaked == 0 && self.failures == 0
    }
}

impl std::fmt::Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sweep: {} inspected, {} reaped, {} discarded, {} leaked, {} failures",
            self.inspected, self.reaped, self.discarded, self.leaked, self.failures
        )
    }
}
