//! Transform history routes.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use fxvault_common::error::AppError;
use fxvault_common::types::{Entity, Transform};

use crate::routes::parse_address;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/transforms", get(list_transforms))
}

#[derive(Debug, Deserialize)]
pub struct TransformQuery {
    pub account: Option<String>,
}

/// GET /api/transforms: Recorded conversions, newest first, optionally for one account.
async fn list_transforms(
    State(state): State<AppState>,
    Query(query): Query<TransformQuery>,
) -> Result<Json<Vec<Transform>>, AppError> {
    let account = query
        .account
        .as_deref()
        .map(|account| parse_address("account", account))
        .transpose()?;

    let mut transforms: Vec<Transform> = state
        .repository
        .list_kind("transform")
        .await?
        .into_iter()
        .filter_map(|entity| match entity {
            Entity::Transform(transform) if account.is_none_or(|a| transform.account == a) => {
                Some(transform)
            }
            _ => None,
        })
        .collect();
    transforms.sort_by(|a, b| b.block_number.cmp(&a.block_number));

    Ok(Json(transforms))
}
