//! Kernel state shared by every caller of the schema engine.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db;
use crate::index::DocumentIndexer;
use crate::query::QueryService;
use crate::schema::{BlueprintGraphManager, EmbeddingEngine, PathTreeManager};

/// Shared kernel state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

struct KernelInner {
    /// SQLite connection pool.
    db: SqlitePool,

    blueprints: BlueprintGraphManager,
    paths: PathTreeManager,
    embeds: EmbeddingEngine,
    indexer: DocumentIndexer,
    queries: QueryService,
    max_depth: usize,
}

impl Kernel {
    /// Connect to the database, apply the schema, and wire the services.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::create_pool(config)
            .await
            .context("failed to create database pool")?;

        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;

        info!(max_depth = config.max_depth, "kernel initialized");
        Ok(Self::from_pool(pool, config.max_depth))
    }

    /// Wire the services over an existing, migrated pool.
    pub fn from_pool(pool: SqlitePool, max_depth: usize) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                blueprints: BlueprintGraphManager::new(pool.clone(), max_depth),
                paths: PathTreeManager::new(pool.clone(), max_depth),
                embeds: EmbeddingEngine::new(pool.clone(), max_depth),
                indexer: DocumentIndexer::new(pool.clone(), max_depth),
                queries: QueryService::new(pool.clone()),
                db: pool,
                max_depth,
            }),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    pub fn blueprints(&self) -> &BlueprintGraphManager {
        &self.inner.blueprints
    }

    pub fn paths(&self) -> &PathTreeManager {
        &self.inner.paths
    }

    pub fn embeds(&self) -> &EmbeddingEngine {
        &self.inner.embeds
    }

    pub fn indexer(&self) -> &DocumentIndexer {
        &self.inner.indexer
    }

    pub fn queries(&self) -> &QueryService {
        &self.inner.queries
    }

    /// Bound for tree walks and embed chains.
    pub fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    /// Check if the database is reachable.
    pub async fn is_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
