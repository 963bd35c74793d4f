use crate::core::CtxError;
use serde::Deserialize;
use std::str::FromStr;

/// Which scoped entry point wraps its body in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// `open()` runs inside a transaction.
    #[default]
    Open,
    /// `begin()` runs inside a transaction.
    Begin,
    /// No transactions; plain context behavior.
    #[serde(alias = "none")]
    Disabled,
}

impl FromStr for TransactionMode {
    type Err = CtxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(TransactionMode::Open),
            "begin" => Ok(TransactionMode::Begin),
            "disabled" | "none" => Ok(TransactionMode::Disabled),
            other => Err(CtxError::Config(format!(
                "unknown transaction mode '{}' (expected open, begin or disabled)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::Open => write!(f, "open"),
            TransactionMode::Begin => write!(f, "begin"),
            TransactionMode::Disabled => write!(f, "disabled"),
        }
    }
}
