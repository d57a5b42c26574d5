//! Vault valuation and risk classification.
//!
//! Computes, for one vault, its debt and collateral in reference units, the
//! collateral ratio, the value-weighted minimum ratio, the liquidation
//! threshold and the number of synthetic tokens a redeemer may take to bring
//! the vault back to its minimum ratio.
//!
//! All quantities are `ONE`-scaled fixed point and every division truncates.

use alloy::primitives::U256;

use fxvault_common::types::{ONE, Vault, VaultCollateralId};

use crate::store::EntityStore;

/// Absolute floor for the liquidation threshold (110%).
pub const MIN_LIQUIDATION_RATIO: U256 = U256::from_limbs([1_100_000_000_000_000_000, 0, 0, 0]);

/// Liquidation threshold as a percentage of the minimum ratio.
const LIQUIDATION_PERCENT: u64 = 80;

const PERCENT: u64 = 100;

/// Return multiplier for plain redemption: collateral is released at par.
pub const REDEMPTION_RETURN_RATIO: U256 = ONE;

/// One collateral type held by a vault, joined with its token configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollateralPosition {
    /// Raw token units.
    pub amount: U256,
    pub rate: U256,
    pub decimals: u8,
    /// Percentage, e.g. 150 for 150%.
    pub mint_collateral_ratio: U256,
}

impl CollateralPosition {
    /// `amount * rate / 10^decimals`. `None` if the decimals cannot be scaled.
    pub fn value_as_reference(&self) -> Option<U256> {
        let scale = U256::from(10u64).checked_pow(U256::from(self.decimals))?;
        Some(self.amount.saturating_mul(self.rate) / scale)
    }
}

/// Derived fields of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Valuation {
    pub debt_as_reference: U256,
    pub collateral_as_reference: U256,
    pub collateral_ratio: U256,
    pub minimum_ratio: U256,
    pub liquidation_ratio: U256,
    pub redeemable_tokens: U256,
    pub is_redeemable: bool,
    pub is_liquidatable: bool,
}

impl Valuation {
    fn apply_to(&self, vault: &mut Vault) {
        vault.debt_as_reference = self.debt_as_reference;
        vault.collateral_as_reference = self.collateral_as_reference;
        vault.collateral_ratio = self.collateral_ratio;
        vault.minimum_ratio = self.minimum_ratio;
        vault.liquidation_ratio = self.liquidation_ratio;
        vault.redeemable_tokens = self.redeemable_tokens;
        vault.is_redeemable = self.is_redeemable;
        vault.is_liquidatable = self.is_liquidatable;
    }
}

pub struct CrCalculator;

impl CrCalculator {
    /// Recompute the derived fields of `vault` from the current token rates.
    ///
    /// The vault comes back unchanged while its synthetic token is unknown or
    /// has no rate. Collateral types whose configuration or balance record is
    /// missing contribute nothing.
    pub fn revalue<S: EntityStore + ?Sized>(vault: &Vault, store: &S) -> Vault {
        let mut updated = vault.clone();

        let Some(fx_rate) = store
            .synthetic_token(vault.synthetic_token)
            .map(|token| token.rate)
            .filter(|rate| !rate.is_zero())
        else {
            tracing::debug!(
                vault = %vault.id,
                synthetic_token = %vault.synthetic_token,
                "No rate for synthetic token, skipping valuation"
            );
            return updated;
        };

        let positions: Vec<CollateralPosition> = vault
            .collateral_addresses
            .iter()
            .filter_map(|token| {
                let config = store.collateral_token(*token)?;
                let holding = store.vault_collateral(VaultCollateralId::derive(vault.id, *token))?;
                Some(CollateralPosition {
                    amount: holding.amount,
                    rate: config.rate,
                    decimals: config.decimals,
                    mint_collateral_ratio: config.mint_collateral_ratio,
                })
            })
            .collect();

        if let Some(valuation) = Self::value(vault.debt, fx_rate, &positions) {
            valuation.apply_to(&mut updated);
        }
        updated
    }

    /// Value a position of `debt` synthetic units priced at `fx_rate` against
    /// `positions`. `None` when `fx_rate` is zero.
    pub fn value(debt: U256, fx_rate: U256, positions: &[CollateralPosition]) -> Option<Valuation> {
        if fx_rate.is_zero() {
            return None;
        }

        let debt_as_reference = debt.saturating_mul(fx_rate) / ONE;

        let terms: Vec<(U256, U256)> = positions
            .iter()
            .filter_map(|position| {
                position
                    .value_as_reference()
                    .map(|value| (value, position.mint_collateral_ratio))
            })
            .collect();
        let collateral_as_reference = terms
            .iter()
            .fold(U256::ZERO, |total, (value, _)| total.saturating_add(*value));

        let collateral_ratio = if debt_as_reference.is_zero() {
            U256::ZERO
        } else {
            collateral_as_reference.saturating_mul(ONE) / debt_as_reference
        };

        // Weighted by each collateral type's share of total value. Every term
        // is truncated on its own.
        let minimum_ratio = if collateral_as_reference.is_zero() {
            U256::ZERO
        } else {
            terms.iter().fold(U256::ZERO, |sum, (value, mint_ratio)| {
                let weighted = mint_ratio.saturating_mul(ONE).saturating_mul(*value)
                    / collateral_as_reference
                    / U256::from(PERCENT);
                sum.saturating_add(weighted)
            })
        };

        let liquidation_ratio = (minimum_ratio * U256::from(LIQUIDATION_PERCENT)
            / U256::from(PERCENT))
        .max(MIN_LIQUIDATION_RATIO);

        let below_minimum = !debt.is_zero()
            && !collateral_as_reference.is_zero()
            && collateral_ratio < minimum_ratio
            && collateral_ratio > ONE;

        let redeemable_reference = if below_minimum {
            Self::tokens_required_for_ratio(
                minimum_ratio,
                debt_as_reference,
                collateral_as_reference,
                REDEMPTION_RETURN_RATIO,
            )
        } else {
            None
        };

        let (is_redeemable, redeemable_tokens) = match redeemable_reference {
            Some(reference) => (true, (reference.saturating_mul(ONE) / fx_rate).min(debt)),
            None => (false, U256::ZERO),
        };
        let is_liquidatable = is_redeemable && collateral_ratio < liquidation_ratio;

        Some(Valuation {
            debt_as_reference,
            collateral_as_reference,
            collateral_ratio,
            minimum_ratio,
            liquidation_ratio,
            redeemable_tokens,
            is_redeemable,
            is_liquidatable,
        })
    }

    /// Reference-unit debt to extinguish so the ratio lands on `target`,
    /// releasing collateral at `return_ratio` per unit of debt.
    ///
    /// Solves `(collateral - x * r / ONE) * ONE / (debt - x) = target` for `x`.
    /// `None` when `target <= return_ratio`; zero when already at or above
    /// `target`.
    pub fn tokens_required_for_ratio(
        target: U256,
        debt_as_reference: U256,
        collateral_as_reference: U256,
        return_ratio: U256,
    ) -> Option<U256> {
        let denominator = target.checked_sub(return_ratio).filter(|d| !d.is_zero())?;
        let numerator = target
            .saturating_mul(debt_as_reference)
            .saturating_sub(collateral_as_reference.saturating_mul(ONE));
        Some(numerator / denominator)
    }
}
