use std::str::FromStr;

use anyhow::{bail, Context};
use jsonwebtoken::Algorithm;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub algorithm: Algorithm,
    pub issuer: String,
    pub audience: String,
    /// `None` when `JWT_TTL_MINUTES` is missing or unparsable.
    pub ttl_minutes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub jwt: JwtConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .with_context(|| format!("DATABASE_MAX_CONNECTIONS is not a number: {v}"))?,
            None => 10,
        };

        let secret = lookup("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let algorithm = match lookup("JWT_ALGORITHM") {
            Some(name) => Algorithm::from_str(&name)
                .with_context(|| format!("unknown JWT_ALGORITHM {name}"))?,
            None => Algorithm::HS256,
        };
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            bail!("JWT_ALGORITHM must be one of HS256, HS384, HS512");
        }

        let ttl_minutes = lookup("JWT_TTL_MINUTES").and_then(|v| v.parse::<i64>().ok());
        if let Some(minutes) = ttl_minutes {
            if minutes <= 0 {
                bail!("JWT_TTL_MINUTES must be positive, got {minutes}");
            }
        }

        let jwt = JwtConfig {
            secret,
            algorithm,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "catalog".into()),
            audience: lookup("JWT_AUDIENCE").unwrap_or_else(|| "catalog-users".into()),
            ttl_minutes,
        };

        Ok(Self {
            database_url,
            max_connections,
            jwt,
        })
    }
}
