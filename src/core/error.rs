use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CtxError {
    /// The backend could not create or release a client.
    #[error("Adapter error: {0}")]
    Adapter(#[source] BoxError),

    /// The acquire/release balance contract was violated at the call site.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The backend failed to begin, commit or roll back a transaction.
    #[error("Transaction error: {0}")]
    Transaction(#[source] BoxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, CtxError>;

impl CtxError {
    /// Wrap a backend failure without altering it.
    pub fn adapter<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Adapter(err.into())
    }

    pub fn transaction<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Transaction(err.into())
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    pub fn is_adapter(&self) -> bool {
        matches!(self, Self::Adapter(_))
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for CtxError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
