//! Configuration loaded from environment variables.

use std::env;

use anyhow::{Context, Result};

/// Default bound for tree and graph traversals.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 5).
    pub database_max_connections: u32,

    /// Maximum nesting depth for path trees and embed chains (default: 32).
    pub max_depth: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://blueprint.db?mode=rwc".to_string());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let max_depth = env::var("BLUEPRINT_MAX_DEPTH")
            .unwrap_or_else(|_| DEFAULT_MAX_DEPTH.to_string())
            .parse()
            .context("BLUEPRINT_MAX_DEPTH must be a valid usize")?;

        if max_depth == 0 {
            anyhow::bail!("BLUEPRINT_MAX_DEPTH must be at least 1");
        }

        Ok(Self {
            database_url,
            database_max_connections,
            max_depth,
        })
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 1,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Whether the URL points at an in-memory database.
    ///
    /// Every pooled connection to `:memory:` opens its own empty database,
    /// so these URLs are limited to a single connection.
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_config() {
        let config = Config::in_memory();
        assert!(config.is_in_memory());
        assert_eq!(config.database_max_connections, 1);
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn file_url_is_not_in_memory() {
        let config = Config {
            database_url: "sqlite://data/blueprint.db?mode=rwc".to_string(),
            database_max_connections: 5,
            max_depth: 8,
        };
        assert!(!config.is_in_memory());
    }
}
