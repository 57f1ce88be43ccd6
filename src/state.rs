use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::repo::{InMemoryUserStore, PgUserStore, UserStore};
use crate::config::AppConfig;
use crate::products::repo::{InMemoryProductStore, PgProductStore, ProductStore};

#[derive(Clone)]
pub struct AppState {
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let Some(database_url) = config.database_url.clone() else {
            warn!("DATABASE_URL not set; using in-memory stores, data is lost on exit");
            return Ok(Self::in_memory(&config));
        };

        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;
        info!("database ready");

        Ok(Self::from_parts(
            &config,
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgProductStore::new(db)),
        ))
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self::from_parts(
            config,
            Arc::new(InMemoryUserStore::new()),
            Arc::new(InMemoryProductStore::new()),
        )
    }

    pub fn from_parts(
        config: &AppConfig,
        users: Arc<dyn UserStore>,
        products: Arc<dyn ProductStore>,
    ) -> Self {
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            users,
            products,
        }
    }
}
