//! Shared application state for the Axum API server.

use fxvault_common::config::AppConfig;
use fxvault_common::repository::EntityRepository;
use sqlx::PgPool;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repository: EntityRepository,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        Self {
            repository: EntityRepository::new(pool.clone()),
            pool,
            config,
        }
    }
}
