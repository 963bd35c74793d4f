/// Transactional context tests
///
/// Commit/rollback around scoped bodies, savepoints for re-entrant scopes,
/// sessions, and transaction-mode configuration.
/// Run with: cargo test --test transaction_tests

use scopectx::{
    AsyncMemoryAdapter, AsyncTransactionalContext, CtxError, MemoryAdapter, MemoryConfig,
    MemoryConnection, MemoryEngine, MemoryError, TransactionMode, TransactionalContext,
};
use std::sync::Arc;
use std::time::Duration;

type TxCtx = TransactionalContext<MemoryAdapter>;
type AsyncTxCtx = AsyncTransactionalContext<AsyncMemoryAdapter>;

fn create_test_context(name: &str, mode: TransactionMode) -> (Arc<MemoryEngine>, Arc<MemoryAdapter>, TxCtx) {
    let engine = MemoryEngine::new(name);
    let adapter = Arc::new(MemoryAdapter::with_engine(engine.clone()));
    (engine, adapter.clone(), TransactionalContext::new(adapter, mode))
}

fn create_async_context(name: &str, mode: TransactionMode) -> (Arc<MemoryEngine>, Arc<AsyncMemoryAdapter>, AsyncTxCtx) {
    let engine = MemoryEngine::new(name);
    let adapter = Arc::new(AsyncMemoryAdapter::with_engine(engine.clone()));
    (engine, adapter.clone(), AsyncTransactionalContext::new(adapter, mode))
}

// ============================================================================
// Begin mode
// ============================================================================

#[test]
fn test_begin_mode_nests_savepoint_and_releases_once() {
    let (engine, adapter, mut ctx) = create_test_context("tx_begin_scenario", TransactionMode::Begin);

    ctx.begin(|ctx, outer| {
        assert_eq!(outer.transaction_depth(), 1);
        outer.insert("orders", "first")?;

        ctx.begin(|_, inner| {
            assert!(inner.same_as(&outer));
            assert_eq!(inner.transaction_depth(), 2);
            inner.insert("orders", "second")
        })?;

        // The savepoint was released; the outer transaction is still open.
        assert_eq!(outer.transaction_depth(), 1);
        assert!(engine.rows("orders")?.is_empty());
        Ok::<_, CtxError>(())
    })
    .unwrap();

    assert_eq!(engine.rows("orders").unwrap(), vec!["first", "second"]);
    assert_eq!(adapter.stats().created, 1);
    assert_eq!(adapter.stats().released, 1);
    assert_eq!(ctx.depth(), 0);
}

#[test]
fn test_body_error_rolls_back() {
    let (engine, adapter, mut ctx) = create_test_context("tx_rollback", TransactionMode::Begin);

    let err = ctx
        .begin(|_, conn| {
            conn.insert("orders", "doomed")?;
            Err::<(), _>(CtxError::usage("validation failed"))
        })
        .unwrap_err();

    assert!(err.is_usage());
    assert!(engine.rows("orders").unwrap().is_empty());
    assert_eq!(adapter.stats().released, 1);
}

#[test]
fn test_inner_failure_rolls_back_only_savepoint() {
    let (engine, _, mut ctx) = create_test_context("tx_inner_failure", TransactionMode::Begin);

    ctx.begin(|ctx, conn| {
        conn.insert("orders", "kept")?;

        let inner = ctx.begin(|_, conn| {
            conn.insert("orders", "dropped")?;
            Err::<(), _>(anyhow::anyhow!("inner failed"))
        });
        assert!(inner.is_err());

        Ok::<_, anyhow::Error>(())
    })
    .unwrap();

    assert_eq!(engine.rows("orders").unwrap(), vec!["kept"]);
}

#[test]
fn test_open_is_plain_in_begin_mode() {
    let (_, _, mut ctx) = create_test_context("tx_begin_open_plain", TransactionMode::Begin);

    ctx.open(|ctx| {
        let conn = ctx.client()?;
        assert!(!conn.in_transaction());
        Ok::<_, CtxError>(())
    })
    .unwrap();
}

#[test]
fn test_panicking_body_rolls_back_and_releases() {
    let (engine, adapter, mut ctx) = create_test_context("tx_panic", TransactionMode::Begin);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: Result<(), CtxError> = ctx.begin(|_, conn| {
            conn.insert("orders", "never").unwrap();
            panic!("body panicked");
        });
    }));

    assert!(outcome.is_err());
    assert_eq!(ctx.depth(), 0);
    assert!(engine.rows("orders").unwrap().is_empty());
    assert_eq!(adapter.stats().released, 1);
    assert_eq!(engine.stats().open, 0);
}

#[test]
fn test_commit_failure_is_reported_and_client_released() {
    let (engine, adapter, mut ctx) = create_test_context("tx_commit_failure", TransactionMode::Begin);

    let err = ctx
        .begin(|_, conn| {
            conn.insert("orders", "lost")?;
            conn.close()
        })
        .unwrap_err();

    assert!(err.is_transaction());
    assert!(matches!(
        std::error::Error::source(&err).and_then(|e| e.downcast_ref::<MemoryError>()),
        Some(MemoryError::NoActiveTransaction(_))
    ));
    assert_eq!(ctx.depth(), 0);
    assert_eq!(adapter.stats().released, 1);
    assert!(engine.rows("orders").unwrap().is_empty());
}

#[test]
fn test_begin_failure_skips_body_and_releases() {
    let (engine, adapter, mut ctx) = create_test_context("tx_begin_failure", TransactionMode::Begin);

    // Connect while the backend is up, then lose it before the scope starts.
    ctx.client().unwrap();
    engine.set_unreachable(true);

    let mut ran = false;
    let err = ctx
        .begin(|_, _| {
            ran = true;
            Ok::<_, CtxError>(())
        })
        .unwrap_err();

    assert!(err.is_transaction());
    assert!(!ran);
    assert_eq!(ctx.depth(), 0);
    assert_eq!(adapter.stats().created, 1);
    assert_eq!(adapter.stats().released, 1);
}

// ============================================================================
// Open mode
// ============================================================================

#[test]
fn test_open_mode_wraps_open_scopes() {
    let (engine, _, mut ctx) = create_test_context("tx_open_mode", TransactionMode::Open);

    ctx.open(|ctx| {
        let conn = ctx.client()?;
        assert_eq!(conn.transaction_depth(), 1);
        conn.insert("audit", "outer")?;

        let inner = ctx.open(|ctx| {
            let conn = ctx.client()?;
            assert_eq!(conn.transaction_depth(), 2);
            conn.insert("audit", "inner")?;
            Err::<(), _>(CtxError::usage("inner failed"))
        });
        assert!(inner.is_err());
        Ok::<_, CtxError>(())
    })
    .unwrap();

    assert_eq!(engine.rows("audit").unwrap(), vec!["outer"]);
}

#[test]
fn test_begin_is_plain_in_open_mode() {
    let (engine, _, mut ctx) = create_test_context("tx_open_begin_plain", TransactionMode::Open);

    let _ = ctx.begin(|_, conn| {
        assert!(!conn.in_transaction());
        conn.insert("audit", "autocommitted")?;
        Err::<(), _>(CtxError::usage("ignored"))
    });

    // No transaction to roll back; the autocommitted row stays.
    assert_eq!(engine.rows("audit").unwrap(), vec!["autocommitted"]);
}

#[test]
fn test_disabled_mode_never_starts_transactions() {
    let (_, adapter, mut ctx) = create_test_context("tx_disabled", TransactionMode::Disabled);

    ctx.open(|ctx| {
        ctx.begin(|_, conn| {
            assert!(!conn.in_transaction());
            Ok::<_, CtxError>(())
        })
    })
    .unwrap();

    assert_eq!(adapter.stats().released, 1);
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn test_session_commits_flushed_rows() {
    let (engine, adapter, mut ctx) = create_test_context("tx_session", TransactionMode::Begin);

    let seen = ctx
        .session(|_, session| {
            session.add("users", "alice");
            session.add("users", "bob");
            session.rows("users")
        })
        .unwrap();

    assert_eq!(seen, vec!["alice", "bob"]);
    assert_eq!(engine.rows("users").unwrap(), vec!["alice", "bob"]);
    assert_eq!(adapter.stats().released, 1);
}

#[test]
fn test_session_discards_unflushed_rows() {
    let (engine, _, mut ctx) = create_test_context("tx_session_discard", TransactionMode::Begin);

    ctx.session(|_, session| {
        session.add("users", "carol");
        session.flush()?;
        session.add("users", "never-flushed");
        Ok::<_, CtxError>(())
    })
    .unwrap();

    assert_eq!(engine.rows("users").unwrap(), vec!["carol"]);
}

#[test]
fn test_session_error_rolls_back_flushed_rows() {
    let (engine, _, mut ctx) = create_test_context("tx_session_error", TransactionMode::Begin);

    let result = ctx.session(|_, session| {
        session.add("users", "dave");
        session.flush()?;
        Err::<(), _>(CtxError::usage("abort"))
    });

    assert!(result.is_err());
    assert!(engine.rows("users").unwrap().is_empty());
}

// ============================================================================
// Async transactional context
// ============================================================================

#[tokio::test]
async fn test_async_begin_mode_nests_savepoint() {
    let (engine, adapter, mut ctx) = create_async_context("tx_async_begin", TransactionMode::Begin);

    ctx.begin(async |ctx: &mut AsyncTxCtx, outer: MemoryConnection| {
        outer.insert("orders", "first")?;

        let inner = ctx
            .begin(async |_: &mut AsyncTxCtx, inner: MemoryConnection| {
                assert_eq!(inner.transaction_depth(), 2);
                inner.insert("orders", "dropped")?;
                Err::<(), _>(CtxError::usage("inner failed"))
            })
            .await;
        assert!(inner.is_err());

        assert_eq!(outer.transaction_depth(), 1);
        Ok::<_, CtxError>(())
    })
    .await
    .unwrap();

    assert_eq!(engine.rows("orders").unwrap(), vec!["first"]);
    assert_eq!(adapter.stats().created, 1);
    assert_eq!(adapter.stats().released, 1);
}

#[tokio::test]
async fn test_async_open_mode_commits() {
    let (engine, _, mut ctx) = create_async_context("tx_async_open", TransactionMode::Open);

    ctx.open(async |ctx: &mut AsyncTxCtx| {
        let conn = ctx.context_mut().client().await?;
        assert!(conn.in_transaction());
        conn.insert("audit", "row")
    })
    .await
    .unwrap();

    assert_eq!(engine.rows("audit").unwrap(), vec!["row"]);
}

#[tokio::test]
async fn test_async_cancelled_scope_rolls_back() {
    let (engine, adapter, mut ctx) = create_async_context("tx_async_cancelled", TransactionMode::Begin);

    {
        let scope = ctx.begin(async |_: &mut AsyncTxCtx, conn: MemoryConnection| {
            conn.insert("orders", "never")?;
            std::future::pending::<()>().await;
            Ok::<_, CtxError>(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(10), scope).await.is_err());
    }

    assert_eq!(ctx.depth(), 0);
    assert_eq!(ctx.context().abandoned(), 1);
    assert!(engine.rows("orders").unwrap().is_empty());

    assert_eq!(ctx.context_mut().reap().await.unwrap(), 1);
    assert_eq!(adapter.stats().released, 1);
}

#[tokio::test]
async fn test_async_commit_failure_is_reported_and_client_released() {
    let (_, adapter, mut ctx) = create_async_context("tx_async_commit_failure", TransactionMode::Begin);

    let err = ctx
        .begin(async |_: &mut AsyncTxCtx, conn: MemoryConnection| {
            conn.insert("orders", "lost")?;
            conn.close()
        })
        .await
        .unwrap_err();

    assert!(err.is_transaction());
    assert_eq!(ctx.depth(), 0);
    assert_eq!(adapter.stats().released, 1);
}

#[tokio::test]
async fn test_async_begin_failure_releases() {
    let (engine, adapter, mut ctx) = create_async_context("tx_async_begin_failure", TransactionMode::Open);

    ctx.context_mut().client().await.unwrap();
    engine.set_unreachable(true);

    let err = ctx
        .open(async |_: &mut AsyncTxCtx| Ok::<_, CtxError>(()))
        .await
        .unwrap_err();

    assert!(err.is_transaction());
    assert_eq!(ctx.depth(), 0);
    assert_eq!(adapter.stats().released, 1);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_mode_from_config_url() {
    let adapter = Arc::new(MemoryAdapter::from_url("memory://tx_config?transactions=disabled").unwrap());
    let mut ctx = TransactionalContext::from_adapter(adapter);
    assert_eq!(ctx.mode(), TransactionMode::Disabled);

    ctx.begin(|ctx, conn| {
        ctx.open(|_| {
            assert!(!conn.in_transaction());
            Ok::<_, CtxError>(())
        })
    })
    .unwrap();

    assert!(MemoryConfig::from_url("memory://tx_config?transactions=sometimes").is_err());
}

#[tokio::test]
async fn test_async_mode_from_config() {
    let config = MemoryConfig::new("tx_async_config").transaction_mode(TransactionMode::Begin);
    let ctx = AsyncTransactionalContext::from_adapter(Arc::new(AsyncMemoryAdapter::new(config)));
    assert_eq!(ctx.mode(), TransactionMode::Begin);
}

#[test]
fn test_config_deserializes_from_json() {
    let config: MemoryConfig =
        serde_json::from_str(r#"{"database": "tx_json", "transaction_mode": "none"}"#).unwrap();
    assert_eq!(config.database, "tx_json");
    assert_eq!(config.transaction_mode, TransactionMode::Disabled);

    let config: MemoryConfig = serde_json::from_str(r#"{"database": "tx_json"}"#).unwrap();
    assert_eq!(config.transaction_mode, TransactionMode::Open);

    assert!(serde_json::from_str::<TransactionMode>(r#""commit""#).is_err());
}
