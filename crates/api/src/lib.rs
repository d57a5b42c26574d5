//! Read-only HTTP view of indexed vault, token and feed state.
//!
//! Endpoints:
//! - GET /health
//! - GET /api/vaults?status=&synthetic_token=
//! - GET /api/vaults/{account}/{synthetic_token}
//! - GET /api/tokens
//! - GET /api/feeds/{feed}
//! - GET /api/keeper-pools
//! - GET /api/transforms?account=

pub mod routes;
pub mod state;
