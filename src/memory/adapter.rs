use super::config::MemoryConfig;
use super::connection::MemoryConnection;
use super::engine::MemoryEngine;
use crate::adapter::{Adapter, AsyncAdapter};
use crate::core::Result;
use crate::transaction::{ConfiguredMode, TransactionMode};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Adapter producing [`MemoryConnection`]s.
///
/// Built from a config, the engine is resolved through
/// [`MemoryEngine::named`] on first use, so adapters naming the same
/// database share data.
pub struct MemoryAdapter {
    config: MemoryConfig,
    name: String,
    engine: OnceLock<Arc<MemoryEngine>>,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl MemoryAdapter {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            name: format!("memory://{}", config.database),
            config,
            engine: OnceLock::new(),
            created: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Adapter over an explicit engine.
    pub fn with_engine(engine: Arc<MemoryEngine>) -> Self {
        let adapter = Self::new(MemoryConfig::new(engine.database()));
        let _ = adapter.engine.set(engine);
        adapter
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self::new(MemoryConfig::from_url(url)?))
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        self.engine
            .get_or_init(|| MemoryEngine::named(&self.config.database))
    }

    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            created: self.created.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
        }
    }
}

impl Adapter for MemoryAdapter {
    type Client = MemoryConnection;

    fn new(&self) -> Result<MemoryConnection> {
        let conn = self.engine().connect()?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(conn)
    }

    fn is_closed(&self, client: &MemoryConnection) -> bool {
        client.is_closed()
    }

    fn release(&self, client: MemoryConnection) -> Result<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        client.close()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ConfiguredMode for MemoryAdapter {
    fn transaction_mode(&self) -> TransactionMode {
        self.config.transaction_mode
    }
}

/// Async flavor of [`MemoryAdapter`]; yields to the scheduler on every
/// backend call.
pub struct AsyncMemoryAdapter {
    inner: MemoryAdapter,
}

impl AsyncMemoryAdapter {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            inner: MemoryAdapter::new(config),
        }
    }

    pub fn with_engine(engine: Arc<MemoryEngine>) -> Self {
        Self {
            inner: MemoryAdapter::with_engine(engine),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        self.inner.config()
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        self.inner.engine()
    }

    pub fn stats(&self) -> AdapterStats {
        self.inner.stats()
    }
}

#[async_trait]
impl AsyncAdapter for AsyncMemoryAdapter {
    type Client = MemoryConnection;

    async fn new(&self) -> Result<MemoryConnection> {
        tokio::task::yield_now().await;
        Adapter::new(&self.inner)
    }

    async fn is_closed(&self, client: &MemoryConnection) -> bool {
        Adapter::is_closed(&self.inner, client)
    }

    async fn release(&self, client: MemoryConnection) -> Result<()> {
        tokio::task::yield_now().await;
        Adapter::release(&self.inner, client)
    }

    fn name(&self) -> &str {
        Adapter::name(&self.inner)
    }
}

impl ConfiguredMode for AsyncMemoryAdapter {
    fn transaction_mode(&self) -> TransactionMode {
        self.inner.transaction_mode()
    }
}

/// Adapter call counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterStats {
    pub created: usize,
    pub released: usize,
}

impl std::fmt::Display for AdapterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Adapter Stats: {} created, {} released",
            self.created, self.released
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_adapter_resolves_named_engine() {
        let adapter = MemoryAdapter::new(MemoryConfig::new("adapter_test_named"));
        assert!(Arc::ptr_eq(
            adapter.engine(),
            &MemoryEngine::named("adapter_test_named")
        ));
        assert_eq!(Adapter::name(&adapter), "memory://adapter_test_named");
    }

    #[test]
    fn test_with_engine_uses_given_engine() {
        let engine = MemoryEngine::new("adapter_test_private");
        let adapter = MemoryAdapter::with_engine(engine.clone());
        assert!(Arc::ptr_eq(adapter.engine(), &engine));
    }

    #[test]
    fn test_release_closes_connection() {
        let adapter = MemoryAdapter::with_engine(MemoryEngine::new("adapter_test_release"));

        let conn = Adapter::new(&adapter).unwrap();
        assert!(!Adapter::is_closed(&adapter, &conn));

        Adapter::release(&adapter, conn.clone()).unwrap();
        assert!(Adapter::is_closed(&adapter, &conn));
        assert_eq!(
            adapter.stats(),
            AdapterStats {
                created: 1,
                released: 1
            }
        );
    }

    #[test]
    fn test_from_url_rejects_bad_scheme() {
        assert!(MemoryAdapter::from_url("sqlite://x").is_err());
        let adapter = MemoryAdapter::from_url("memory://adapter_test_url").unwrap();
        assert_eq!(adapter.config().database, "adapter_test_url");
    }

    #[test]
    fn test_mode_comes_from_config() {
        let adapter = MemoryAdapter::from_url("memory://adapter_test_mode?transactions=begin").unwrap();
        assert_eq!(adapter.transaction_mode(), TransactionMode::Begin);

        let adapter = AsyncMemoryAdapter::new(MemoryConfig::new("adapter_test_mode_async"));
        assert_eq!(adapter.transaction_mode(), TransactionMode::Open);
    }

    #[tokio::test]
    async fn test_async_adapter_delegates() {
        let adapter = AsyncMemoryAdapter::with_engine(MemoryEngine::new("adapter_test_async"));

        let conn = AsyncAdapter::new(&adapter).await.unwrap();
        AsyncAdapter::release(&adapter, conn.clone()).await.unwrap();

        assert!(AsyncAdapter::is_closed(&adapter, &conn).await);
        assert_eq!(adapter.stats().released, 1);
        assert_eq!(adapter.engine().stats().closed, 1);
    }
}
