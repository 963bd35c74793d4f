// ============================================================================
// Adapter Contract
// ============================================================================
//
// An adapter is the pluggable strategy that knows how to create, test and
// release one backend client. Contexts never look inside a client; every
// decision about its health goes through the adapter.
//
// ============================================================================

use crate::core::Result;
use async_trait::async_trait;

/// Synchronous backend strategy.
///
/// `release` is called at most once per client produced by `new`, so
/// implementations need not be idempotent.
pub trait Adapter: Send + Sync + 'static {
    /// Cheap, cloneable handle to one backend client (e.g. an `Arc`-backed
    /// connection). Clones refer to the same underlying client.
    type Client: Clone + Send + Sync + 'static;

    /// Produce a fresh client.
    fn new(&self) -> Result<Self::Client>;

    /// Report whether the backend has already discarded `client`.
    fn is_closed(&self, client: &Self::Client) -> bool;

    /// Release the backend resources held by `client`.
    fn release(&self, client: Self::Client) -> Result<()>;

    /// Name used in logs and sweep reports.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Asynchronous mirror of [`Adapter`]. Every call is a suspension point.
#[async_trait]
pub trait AsyncAdapter: Send + Sync + 'static {
    type Client: Clone + Send + Sync + 'static;

    async fn new(&self) -> Result<Self::Client>;

    async fn is_closed(&self, client: &Self::Client) -> bool;

    async fn release(&self, client: Self::Client) -> Result<()>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
