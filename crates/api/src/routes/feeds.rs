//! Price feed routes.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use fxvault_common::error::AppError;
use fxvault_common::types::{Entity, EntityKey, FeedId, RateObservation};

use crate::routes::parse_address;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/feeds/{feed}", get(get_feed))
}

/// GET /api/feeds/:feed: Latest observation of a price feed.
async fn get_feed(
    State(state): State<AppState>,
    Path(feed): Path<String>,
) -> Result<Json<RateObservation>, AppError> {
    let feed = FeedId(parse_address("feed", &feed)?);

    match state.repository.find(&EntityKey::RateObservation(feed)).await? {
        Some(Entity::RateObservation(observation)) => Ok(Json(observation)),
        _ => Err(AppError::NotFound(format!("No observation for feed {}", feed))),
    }
}
