pub mod feeds;
pub mod health;
pub mod keeper_pools;
pub mod tokens;
pub mod transforms;
pub mod vaults;

use std::str::FromStr;

use alloy::primitives::Address;
use axum::Router;

use fxvault_common::error::AppError;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(vaults::router())
        .merge(tokens::router())
        .merge(feeds::router())
        .merge(keeper_pools::router())
        .merge(transforms::router())
        .with_state(state)
}

/// Parse a hex address taken from the path or query string.
pub(crate) fn parse_address(field: &str, value: &str) -> Result<Address, AppError> {
    Address::from_str(value)
        .map_err(|_| AppError::Validation(format!("{} is not a valid address: {}", field, value)))
}
