use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::auth::{
    jwt::JwtKeys,
    memory_repo::MemoryUserStore,
    repo::{PgUserStore, UserStore},
};
use crate::config::AppConfig;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub keys: JwtKeys,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        let store = if config.database_url == MEMORY_DATABASE_URL {
            tracing::warn!("using in-memory user store; data is lost on exit");
            Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
        } else {
            let db = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&config.database_url)
                .await
                .context("connect to database")?;

            // Run migrations if present
            if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                tracing::warn!(error = %e, "migration failed; continuing");
            }
            Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
        };

        Ok(Self::from_parts(config, store))
    }

    pub fn from_parts(config: &AppConfig, store: Arc<dyn UserStore>) -> Self {
        Self {
            store,
            keys: JwtKeys::new(&config.jwt),
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            &crate::config::test_config(),
            Arc::new(MemoryUserStore::new()),
        )
    }
}
