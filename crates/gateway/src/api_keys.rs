use std::fmt;

use async_trait::async_trait;
use kma_core::mask_secret;
use log::info;
use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

/// A caller identity and its request budget.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential {
    pub api_key: String,
    pub owner: String,
    pub limit_per_minute: u32,
    pub active: bool,
}

impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyCredential")
            .field("api_key", &mask_secret(&self.api_key))
            .field("owner", &self.owner)
            .field("limit_per_minute", &self.limit_per_minute)
            .field("active", &self.active)
            .finish()
    }
}

/// Key provisioned from the config file (`[[api_keys]]`).
#[derive(Clone, Deserialize)]
pub struct ApiKeySeed {
    pub api_key: String,
    pub owner: String,
    pub limit_per_minute: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ApiKeySeed {
    fn validate(&self) -> Result<(), ApiKeyStoreError> {
        if self.limit_per_minute == 0 {
            return Err(ApiKeyStoreError::ZeroLimit {
                owner: self.owner.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ApiKeySeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeySeed")
            .field("api_key", &mask_secret(&self.api_key))
            .field("owner", &self.owner)
            .field("limit_per_minute", &self.limit_per_minute)
            .field("active", &self.active)
            .finish()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ApiKeyStoreError {
    #[error("Failed to query api keys: {0}")]
    Query(#[from] sqlx::Error),
    #[error("Stored limit for {owner} is out of range: {value}")]
    InvalidLimit { owner: String, value: i64 },
    #[error("Api key for {owner} needs a limit_per_minute of at least 1")]
    ZeroLimit { owner: String },
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn find(&self, api_key: &str) -> Result<Option<ApiKeyCredential>, ApiKeyStoreError>;
}

pub struct SqliteApiKeyStore {
    pool: SqlitePool,
}

impl SqliteApiKeyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert the key, or refresh owner, limit and active flag when it already exists.
    pub async fn upsert(&self, seed: &ApiKeySeed) -> Result<(), ApiKeyStoreError> {
        seed.validate()?;
        sqlx::query(
            "INSERT INTO api_keys (api_key, owner, limit_per_minute, active) VALUES (?, ?, ?, ?)
             ON CONFLICT(api_key) DO UPDATE SET
                owner = excluded.owner,
                limit_per_minute = excluded.limit_per_minute,
                active = excluded.active",
        )
        .bind(&seed.api_key)
        .bind(&seed.owner)
        .bind(i64::from(seed.limit_per_minute))
        .bind(seed.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provision every seed, or none of them when any seed is invalid.
    pub async fn seed(&self, seeds: &[ApiKeySeed]) -> Result<usize, ApiKeyStoreError> {
        seeds.iter().try_for_each(ApiKeySeed::validate)?;
        for seed in seeds {
            self.upsert(seed).await?;
            info!(
                "api key {} provisioned for {} ({} req/min)",
                mask_secret(&seed.api_key),
                seed.owner,
                seed.limit_per_minute
            );
        }
        Ok(seeds.len())
    }
}

#[async_trait]
impl ApiKeyStore for SqliteApiKeyStore {
    async fn find(&self, api_key: &str) -> Result<Option<ApiKeyCredential>, ApiKeyStoreError> {
        let row = sqlx::query(
            "SELECT api_key, owner, limit_per_minute, active FROM api_keys WHERE api_key = ?",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(credential_from_row).transpose()
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<ApiKeyCredential, ApiKeyStoreError> {
    let owner: String = row.try_get("owner")?;
    let limit: i64 = row.try_get("limit_per_minute")?;
    let limit_per_minute = u32::try_from(limit).map_err(|_| ApiKeyStoreError::InvalidLimit {
        owner: owner.clone(),
        value: limit,
    })?;

    Ok(ApiKeyCredential {
        api_key: row.try_get("api_key")?,
        owner,
        limit_per_minute,
        active: row.try_get("active")?,
    })
}
