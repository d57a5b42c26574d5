//! PostgreSQL persistence for engine entities.
//!
//! Every entity is stored as one JSONB row keyed by `(kind, id)`. Writes for a
//! single notification go through [`EntityRepository::persist`], which applies
//! them in one transaction.

use sqlx::PgPool;

use crate::error::AppError;
use crate::types::{Entity, EntityKey, TokenId, Vault, VaultHealth};

/// Optional constraints for listing vaults.
#[derive(Debug, Clone, Default)]
pub struct VaultFilter {
    /// `Redeemable` also matches liquidatable vaults.
    pub health: Option<VaultHealth>,
    pub synthetic_token: Option<TokenId>,
}

impl VaultFilter {
    pub fn matches(&self, vault: &Vault) -> bool {
        if let Some(token) = self.synthetic_token
            && vault.synthetic_token != token
        {
            return false;
        }
        match self.health {
            None => true,
            Some(VaultHealth::Redeemable) => vault.is_redeemable,
            Some(health) => vault.health() == health,
        }
    }
}

#[derive(Clone)]
pub struct EntityRepository {
    pool: PgPool,
}

impl EntityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upsert all `entities` atomically.
    pub async fn persist(&self, entities: &[Entity], block_number: u64) -> Result<(), AppError> {
        if entities.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for entity in entities {
            let key = entity.key();
            sqlx::query(
                r#"
                INSERT INTO entities (kind, id, data, block_number)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (kind, id) DO UPDATE
                SET data = EXCLUDED.data, block_number = EXCLUDED.block_number, updated_at = NOW()
                "#,
            )
            .bind(key.kind())
            .bind(key.id())
            .bind(serde_json::to_value(entity)?)
            .bind(block_number as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = entities.len(), block_number, "Persisted entities");
        Ok(())
    }

    /// Roll rows back to earlier values atomically: `Some` is upserted,
    /// `None` deletes the row.
    pub async fn restore(
        &self,
        previous: &[(EntityKey, Option<Entity>)],
        block_number: u64,
    ) -> Result<(), AppError> {
        if previous.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (key, entity) in previous {
            match entity {
                Some(entity) => {
                    sqlx::query(
                        r#"
                        INSERT INTO entities (kind, id, data, block_number)
                        VALUES ($1, $2, $3, $4)
                        ON CONFLICT (kind, id) DO UPDATE
                        SET data = EXCLUDED.data, block_number = EXCLUDED.block_number, updated_at = NOW()
                        "#,
                    )
                    .bind(key.kind())
                    .bind(key.id())
                    .bind(serde_json::to_value(entity)?)
                    .bind(block_number as i64)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("DELETE FROM entities WHERE kind = $1 AND id = $2")
                        .bind(key.kind())
                        .bind(key.id())
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;

        tracing::info!(count = previous.len(), block_number, "Restored entities");
        Ok(())
    }

    /// Load every stored entity (used to warm the in-memory store).
    pub async fn load_all(&self) -> Result<Vec<Entity>, AppError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as("SELECT data FROM entities")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(AppError::from))
            .collect()
    }

    pub async fn find(&self, key: &EntityKey) -> Result<Option<Entity>, AppError> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM entities WHERE kind = $1 AND id = $2")
                .bind(key.kind())
                .bind(key.id())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(data,)| serde_json::from_value(data).map_err(AppError::from))
            .transpose()
    }

    /// All entities of one kind (see [`EntityKey::kind`]).
    pub async fn list_kind(&self, kind: &str) -> Result<Vec<Entity>, AppError> {
        let rows: Vec<(serde_json::Value,)> =
            sqlx::query_as("SELECT data FROM entities WHERE kind = $1 ORDER BY id")
                .bind(kind)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(AppError::from))
            .collect()
    }

    pub async fn list_vaults(&self, filter: &VaultFilter) -> Result<Vec<Vault>, AppError> {
        let vaults = self
            .list_kind("vault")
            .await?
            .into_iter()
            .filter_map(|entity| match entity {
                Entity::Vault(vault) if filter.matches(&vault) => Some(vault),
                _ => None,
            })
            .collect();
        Ok(vaults)
    }
}
