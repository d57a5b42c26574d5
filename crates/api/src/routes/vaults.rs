//! Vault routes: filtered listing and single-vault detail.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use fxvault_common::error::AppError;
use fxvault_common::repository::VaultFilter;
use fxvault_common::types::{
    Entity, EntityKey, TokenId, Vault, VaultCollateral, VaultCollateralId, VaultHealth, VaultId,
};

use crate::routes::parse_address;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/vaults", get(list_vaults))
        .route("/api/vaults/{account}/{synthetic_token}", get(get_vault))
}

#[derive(Debug, Deserialize)]
pub struct VaultQuery {
    pub status: Option<VaultHealth>,
    pub synthetic_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VaultDetail {
    #[serde(flatten)]
    pub vault: Vault,
    pub health: VaultHealth,
    pub collateral: Vec<VaultCollateral>,
}

/// GET /api/vaults: List vaults, optionally by health and synthetic token.
///
/// `status=redeemable` also returns liquidatable vaults.
async fn list_vaults(
    State(state): State<AppState>,
    Query(query): Query<VaultQuery>,
) -> Result<Json<Vec<Vault>>, AppError> {
    let synthetic_token = query
        .synthetic_token
        .as_deref()
        .map(|token| parse_address("synthetic_token", token).map(TokenId))
        .transpose()?;

    let filter = VaultFilter {
        health: query.status,
        synthetic_token,
    };

    let vaults = state.repository.list_vaults(&filter).await?;
    Ok(Json(vaults))
}

/// GET /api/vaults/:account/:synthetic_token: One vault with its live collateral balances.
async fn get_vault(
    State(state): State<AppState>,
    Path((account, synthetic_token)): Path<(String, String)>,
) -> Result<Json<VaultDetail>, AppError> {
    let account = parse_address("account", &account)?;
    let synthetic_token = TokenId(parse_address("synthetic_token", &synthetic_token)?);
    let id = VaultId::derive(account, synthetic_token);

    let vault = match state.repository.find(&EntityKey::Vault(id)).await? {
        Some(Entity::Vault(vault)) => vault,
        _ => {
            return Err(AppError::NotFound(format!(
                "No vault for {:#x} / {}",
                account, synthetic_token
            )));
        }
    };

    let mut collateral = Vec::with_capacity(vault.collateral_addresses.len());
    for token in vault.collateral_addresses.iter() {
        let key = EntityKey::VaultCollateral(VaultCollateralId::derive(id, *token));
        if let Some(Entity::VaultCollateral(holding)) = state.repository.find(&key).await? {
            collateral.push(holding);
        }
    }

    Ok(Json(VaultDetail {
        health: vault.health(),
        vault,
        collateral,
    }))
}
