use super::mode::TransactionMode;
use crate::core::{CtxError, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

/// A backend transaction object. Dropping it unfinished must roll it back.
pub trait TransactionScope {
    fn commit(self) -> Result<()>;
    fn rollback(self) -> Result<()>;
}

/// Client capability: top-level and nested (savepoint) transactions.
pub trait Transactional {
    type Transaction: TransactionScope;

    fn in_transaction(&self) -> bool;

    fn begin_transaction(&self) -> Result<Self::Transaction>;

    fn begin_nested(&self) -> Result<Self::Transaction>;
}

/// A unit-of-work object layered over a raw client.
pub trait Session {
    /// End the session. Work that was not flushed is discarded.
    fn close(self) -> Result<()>;
}

pub trait SessionFactory {
    type Session: Session;

    fn open_session(&self) -> Result<Self::Session>;
}

/// An adapter whose configuration names the mode its transactional
/// contexts run in.
pub trait ConfiguredMode {
    fn transaction_mode(&self) -> TransactionMode;
}

#[async_trait]
pub trait AsyncTransactionScope: Send {
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait AsyncTransactional: Send + Sync {
    type Transaction: AsyncTransactionScope;

    async fn in_transaction(&self) -> bool;

    async fn begin_transaction(&self) -> Result<Self::Transaction>;

    async fn begin_nested(&self) -> Result<Self::Transaction>;
}

/// Start a top-level transaction, or a nested one if the client already
/// has a transaction open.
pub(crate) fn start<C: Transactional>(client: &C) -> Result<C::Transaction> {
    if client.in_transaction() {
        debug!("beginning nested transaction");
        client.begin_nested()
    } else {
        debug!("beginning transaction");
        client.begin_transaction()
    }
}

/// Commit on success, roll back on failure. A rollback error is logged and
/// the body's error returned.
pub(crate) fn finish<T, R, E>(tx: T, out: std::result::Result<R, E>) -> std::result::Result<R, E>
where
    T: TransactionScope,
    E: From<CtxError>,
{
    match out {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "rollback failed after scope body error");
            }
            Err(err)
        }
    }
}

pub(crate) fn within<C, R, E, F>(client: &C, body: F) -> std::result::Result<R, E>
where
    C: Transactional,
    F: FnOnce() -> std::result::Result<R, E>,
    E: From<CtxError>,
{
    let tx = start(client)?;
    finish(tx, body())
}

pub(crate) async fn start_async<C: AsyncTransactional>(client: &C) -> Result<C::Transaction> {
    if client.in_transaction().await {
        debug!("beginning nested transaction");
        client.begin_nested().await
    } else {
        debug!("beginning transaction");
        client.begin_transaction().await
    }
}

pub(crate) async fn finish_async<T, R, E>(
    tx: T,
    out: std::result::Result<R, E>,
) -> std::result::Result<R, E>
where
    T: AsyncTransactionScope,
    E: From<CtxError>,
{
    match out {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed after scope body error");
            }
            Err(err)
        }
    }
}
