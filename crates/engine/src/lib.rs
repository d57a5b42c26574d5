//! Vault valuation and price fan-out engine.
//!
//! Consumes decoded protocol and oracle notifications and keeps every vault's
//! valuation and risk classification current in an [`store::EntityStore`].
//! Keeper pool and transformer events are folded into their own records.

pub mod cr_calculator;
pub mod feeds;
pub mod handlers;
pub mod keeper_pool;
pub mod propagator;
pub mod rates;
pub mod registry;
pub mod store;
pub mod transforms;
