use crate::core::{CtxError, Result};
use crate::transaction::TransactionMode;
use serde::Deserialize;

/// In-memory backend configuration
///
/// Format: `memory://database?transactions=begin`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MemoryConfig {
    /// Database name; adapters with the same name share one engine
    pub database: String,

    /// Mode used by `TransactionalContext::from_adapter` and
    /// `RequestScope::configured_transactional_context`
    #[serde(default)]
    pub transaction_mode: TransactionMode,
}

impl MemoryConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            transaction_mode: TransactionMode::default(),
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    /// Set the transaction mode
    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    /// Parse from connection string
    ///
    /// # Examples
    ///
    /// ```
    /// use scopectx::{MemoryConfig, TransactionMode};
    ///
    /// let config = MemoryConfig::from_url("memory://orders?transactions=begin").unwrap();
    /// assert_eq!(config.database, "orders");
    /// assert_eq!(config.transaction_mode, TransactionMode::Begin);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("memory://")
            .ok_or_else(|| CtxError::Config("URL must start with 'memory://'".to_string()))?;

        let (database, query) = match rest.split_once('?') {
            Some((database, query)) => (database, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::new(database);
        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| CtxError::Config(format!("Invalid URL parameter '{}'", pair)))?;

            match key {
                "transactions" => config.transaction_mode = value.parse()?,
                other => {
                    return Err(CtxError::Config(format!("Unknown URL parameter '{}'", other)));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        format!("memory://{}?transactions={}", self.database, self.transaction_mode)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(CtxError::Config("Database name cannot be empty".to_string()));
        }

        if !self
            .database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CtxError::Config(format!(
                "Database name '{}' may only contain letters, digits, '_' and '-'",
                self.database
            )));
        }

        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new("scopectx")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.database, "scopectx");
        assert_eq!(config.transaction_mode, TransactionMode::Open);
    }

    #[test]
    fn test_builder_pattern() {
        let config = MemoryConfig::new("a")
            .database("orders")
            .transaction_mode(TransactionMode::Disabled);

        assert_eq!(config.database, "orders");
        assert_eq!(config.transaction_mode, TransactionMode::Disabled);
    }

    #[test]
    fn test_from_url() {
        let config = MemoryConfig::from_url("memory://billing").unwrap();
        assert_eq!(config.database, "billing");
        assert_eq!(config.transaction_mode, TransactionMode::Open);

        let config = MemoryConfig::from_url("memory://billing?transactions=none").unwrap();
        assert_eq!(config.transaction_mode, TransactionMode::Disabled);
    }

    #[test]
    fn test_invalid_url() {
        assert!(MemoryConfig::from_url("postgres://localhost/db").is_err());
        assert!(MemoryConfig::from_url("memory://").is_err());
        assert!(MemoryConfig::from_url("memory://db?transactions").is_err());
        assert!(MemoryConfig::from_url("memory://db?pool=5").is_err());
        assert!(MemoryConfig::from_url("memory://bad name").is_err());
    }

    #[test]
    fn test_url_round_trip_keeps_mode() {
        let config = MemoryConfig::new("ledger").transaction_mode(TransactionMode::Begin);
        assert_eq!(MemoryConfig::from_url(&config.to_url()).unwrap(), config);
    }
}
