//! Token/Rate store: per-token metadata and the latest reference-unit rate.

use alloy::primitives::U256;

use fxvault_common::types::{CollateralToken, SyntheticToken, TokenId};

use crate::store::EntityStore;

/// Token attributes read from the protocol. `None` means the read failed and
/// the stored value must be kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub is_valid: Option<bool>,
    /// Synthetic tokens only.
    pub total_supply: Option<U256>,
    /// Collateral tokens only.
    pub mint_collateral_ratio: Option<U256>,
    pub liquidation_fee: Option<U256>,
    pub interest_rate: Option<U256>,
    pub total_balance: Option<U256>,
}

pub struct RateStore;

impl RateStore {
    /// Stored synthetic token, or a fresh one carrying the sentinel rate.
    pub fn get_or_create_synthetic<S: EntityStore + ?Sized>(
        store: &S,
        id: TokenId,
    ) -> SyntheticToken {
        store
            .synthetic_token(id)
            .unwrap_or_else(|| SyntheticToken::new(id))
    }

    /// Stored collateral token, or a fresh one carrying the sentinel rate.
    pub fn get_or_create_collateral<S: EntityStore + ?Sized>(
        store: &S,
        id: TokenId,
    ) -> CollateralToken {
        store
            .collateral_token(id)
            .unwrap_or_else(|| CollateralToken::new(id))
    }

    /// Overwrite the rate of every stored record for `id` (a token may be
    /// configured both as synthetic and as collateral).
    ///
    /// No-op returning `false` when the token is unknown or `rate` is zero.
    pub fn set_rate<S: EntityStore + ?Sized>(store: &mut S, id: TokenId, rate: U256) -> bool {
        if rate.is_zero() {
            tracing::warn!(token = %id, "Refusing to store zero rate");
            return false;
        }

        let mut updated = false;
        if let Some(mut token) = store.synthetic_token(id) {
            token.rate = rate;
            store.save(token.into());
            updated = true;
        }
        if let Some(mut token) = store.collateral_token(id) {
            token.rate = rate;
            store.save(token.into());
            updated = true;
        }

        if !updated {
            tracing::debug!(token = %id, "Rate update for unconfigured token ignored");
        }
        updated
    }

    /// Create or refresh a synthetic token from protocol metadata.
    pub fn configure_synthetic<S: EntityStore + ?Sized>(
        store: &mut S,
        id: TokenId,
        metadata: &TokenMetadata,
        rate: Option<U256>,
    ) -> SyntheticToken {
        let mut token = Self::get_or_create_synthetic(&*store, id);
        if let Some(symbol) = &metadata.symbol {
            token.symbol = symbol.clone();
        }
        if let Some(name) = &metadata.name {
            token.name = name.clone();
        }
        if let Some(decimals) = metadata.decimals {
            token.decimals = decimals;
        }
        if let Some(is_valid) = metadata.is_valid {
            token.is_valid = is_valid;
        }
        if let Some(total_supply) = metadata.total_supply {
            token.total_supply = total_supply;
        }
        if let Some(rate) = rate.filter(|r| !r.is_zero()) {
            token.rate = rate;
        }
        store.save(token.clone().into());
        token
    }

    /// Create or refresh a collateral token from protocol metadata.
    pub fn configure_collateral<S: EntityStore + ?Sized>(
        store: &mut S,
        id: TokenId,
        metadata: &TokenMetadata,
        rate: Option<U256>,
    ) -> CollateralToken {
        let mut token = Self::get_or_create_collateral(&*store, id);
        if let Some(symbol) = &metadata.symbol {
            token.symbol = symbol.clone();
        }
        if let Some(name) = &metadata.name {
            token.name = name.clone();
        }
        if let Some(decimals) = metadata.decimals {
            token.decimals = decimals;
        }
        if let Some(is_valid) = metadata.is_valid {
            token.is_valid = is_valid;
        }
        if let Some(ratio) = metadata.mint_collateral_ratio {
            token.mint_collateral_ratio = ratio;
        }
        if let Some(fee) = metadata.liquidation_fee {
            token.liquidation_fee = fee;
        }
        if let Some(interest_rate) = metadata.interest_rate {
            token.interest_rate = interest_rate;
        }
        if let Some(total_balance) = metadata.total_balance {
            token.total_balance = total_balance;
        }
        if let Some(rate) = rate.filter(|r| !r.is_zero()) {
            token.rate = rate;
        }
        store.save(token.clone().into());
        token
    }
}
