//! Token routes.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use fxvault_common::error::AppError;
use fxvault_common::types::{CollateralToken, Entity, SyntheticToken};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/tokens", get(list_tokens))
}

#[derive(Debug, Serialize)]
pub struct TokenList {
    pub synthetic: Vec<SyntheticToken>,
    pub collateral: Vec<CollateralToken>,
}

/// GET /api/tokens: Every configured token with its current rate.
async fn list_tokens(State(state): State<AppState>) -> Result<Json<TokenList>, AppError> {
    let synthetic = state
        .repository
        .list_kind("synthetic_token")
        .await?
        .into_iter()
        .filter_map(|entity| match entity {
            Entity::SyntheticToken(token) => Some(token),
            _ => None,
        })
        .collect();

    let collateral = state
        .repository
        .list_kind("collateral_token")
        .await?
        .into_iter()
        .filter_map(|entity| match entity {
            Entity::CollateralToken(token) => Some(token),
            _ => None,
        })
        .collect();

    Ok(Json(TokenList {
        synthetic,
        collateral,
    }))
}
