//! Keeper pool routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use fxvault_common::error::AppError;
use fxvault_common::types::{Entity, EntityKey, KeeperPool, KeeperPoolCollateral, KeeperPoolCollateralId};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/keeper-pools", get(list_keeper_pools))
}

#[derive(Debug, Serialize)]
pub struct KeeperPoolDetail {
    #[serde(flatten)]
    pub pool: KeeperPool,
    pub collateral: Vec<KeeperPoolCollateral>,
}

/// GET /api/keeper-pools: Every keeper pool with the collateral it holds.
async fn list_keeper_pools(
    State(state): State<AppState>,
) -> Result<Json<Vec<KeeperPoolDetail>>, AppError> {
    let pools = state.repository.list_kind("keeper_pool").await?;

    let mut details = Vec::with_capacity(pools.len());
    for entity in pools {
        let Entity::KeeperPool(pool) = entity else {
            continue;
        };
        let mut collateral = Vec::with_capacity(pool.collateral_addresses.len());
        for token in pool.collateral_addresses.iter() {
            let key = EntityKey::KeeperPoolCollateral(KeeperPoolCollateralId::derive(pool.id, *token));
            if let Some(Entity::KeeperPoolCollateral(holding)) = state.repository.find(&key).await? {
                collateral.push(holding);
            }
        }
        details.push(KeeperPoolDetail { pool, collateral });
    }

    Ok(Json(details))
}
