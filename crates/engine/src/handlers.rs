//! Notification handlers.
//!
//! [`EventProcessor`] routes each decoded notification to its handler. Raw
//! balances and token metadata come from a [`ProtocolReader`] pinned to the
//! notification's block; the store is only touched once every read for the
//! notification has completed.

use std::future::Future;

use alloy::primitives::{Address, U256};

use fxvault_common::error::ReadError;
use fxvault_common::types::{
    Notification, ProtocolEvent, TokenId, TokenKind, Vault, VaultCollateral, VaultCollateralId,
    VaultId,
};

use crate::cr_calculator::CrCalculator;
use crate::keeper_pool::{KeeperPools, PoolChange, PoolReadings};
use crate::propagator::{PricePropagator, RateUpdateOutcome};
use crate::rates::{RateStore, TokenMetadata};
use crate::registry::Registry;
use crate::store::EntityStore;
use crate::transforms::TransformLog;

/// Read-only access to the protocol contracts, as of a given block.
pub trait ProtocolReader {
    /// Outstanding debt of `account` in `token`, raw units.
    fn debt(
        &self,
        account: Address,
        token: TokenId,
        block: u64,
    ) -> impl Future<Output = Result<U256, ReadError>>;

    /// Balance of `collateral` posted by `account` against `synthetic`.
    fn collateral_balance(
        &self,
        account: Address,
        synthetic: TokenId,
        collateral: TokenId,
        block: u64,
    ) -> impl Future<Output = Result<U256, ReadError>>;

    /// Token attributes; fields whose read failed are left `None`.
    fn token_metadata(
        &self,
        token: TokenId,
        kind: TokenKind,
        block: u64,
    ) -> impl Future<Output = TokenMetadata>;

    /// Every collateral type the protocol accepts.
    fn collateral_types(&self, block: u64) -> impl Future<Output = Result<Vec<TokenId>, ReadError>>;

    /// Total deposits of the keeper pool at `pool` for `synthetic`.
    fn keeper_pool_deposits(
        &self,
        pool: Address,
        synthetic: TokenId,
        block: u64,
    ) -> impl Future<Output = Result<U256, ReadError>>;

    /// Stake of `account` in the keeper pool for `synthetic`.
    fn keeper_pool_stake(
        &self,
        pool: Address,
        account: Address,
        synthetic: TokenId,
        block: u64,
    ) -> impl Future<Output = Result<U256, ReadError>>;

    /// Balance of `collateral` held by the keeper pool for `synthetic`.
    fn keeper_pool_collateral(
        &self,
        pool: Address,
        synthetic: TokenId,
        collateral: TokenId,
        block: u64,
    ) -> impl Future<Output = Result<U256, ReadError>>;
}

/// Store mutations for position and configuration events, given the values
/// already read from the protocol. `None` reads keep the stored value.
pub struct DirectUpdates;

impl DirectUpdates {
    pub fn apply_debt<S: EntityStore + ?Sized>(
        store: &mut S,
        account: Address,
        token: TokenId,
        debt: Option<U256>,
    ) -> Vault {
        let mut vault = store
            .vault(VaultId::derive(account, token))
            .unwrap_or_else(|| Vault::new(account, token));
        if let Some(debt) = debt {
            vault.debt = debt;
        }

        let vault = CrCalculator::revalue(&vault, &*store);
        store.save(vault.clone().into());
        Registry::add_owner(store, token, account);
        vault
    }

    pub fn apply_collateral<S: EntityStore + ?Sized>(
        store: &mut S,
        account: Address,
        synthetic: TokenId,
        collateral: TokenId,
        amount: Option<U256>,
    ) -> Vault {
        let mut vault = store
            .vault(VaultId::derive(account, synthetic))
            .unwrap_or_else(|| Vault::new(account, synthetic));
        let mut holding = store
            .vault_collateral(VaultCollateralId::derive(vault.id, collateral))
            .unwrap_or_else(|| VaultCollateral::new(vault.id, collateral));

        if let Some(amount) = amount {
            holding.amount = amount;
        }
        if holding.amount.is_zero() {
            vault.collateral_addresses.remove(&collateral);
        } else {
            vault.collateral_addresses.insert(collateral);
        }
        store.save(holding.into());

        let vault = CrCalculator::revalue(&vault, &*store);
        store.save(vault.clone().into());
        Registry::add_owner(store, synthetic, account);
        vault
    }

    /// Create or refresh a token, register it under the propagator's root and
    /// revalue the vaults that depend on it.
    pub fn apply_token_configured<S: EntityStore + ?Sized>(
        store: &mut S,
        propagator: &PricePropagator,
        token: TokenId,
        kind: TokenKind,
        metadata: &TokenMetadata,
    ) {
        let rate = propagator.feeds().derive_rate(&*store, token);
        match kind {
            TokenKind::Synthetic => {
                RateStore::configure_synthetic(store, token, metadata, rate);
            }
            TokenKind::Collateral => {
                RateStore::configure_collateral(store, token, metadata, rate);
            }
        }
        Registry::register_token(store, propagator.root(), kind, token);

        if let Some(registry) = store.token_registry(propagator.root()) {
            let (revalued, changed) =
                PricePropagator::revalue_dependents(store, &registry, &[token]);
            tracing::debug!(token = %token, kind = %kind, revalued, changed, "Token configuration applied");
        }
    }
}

/// Dispatches notifications to the handlers, one at a time.
pub struct EventProcessor<R> {
    reader: R,
    propagator: PricePropagator,
}

impl<R: ProtocolReader> EventProcessor<R> {
    pub fn new(reader: R, propagator: PricePropagator) -> Self {
        Self { reader, propagator }
    }

    pub fn propagator(&self) -> &PricePropagator {
        &self.propagator
    }

    /// Apply one notification to `store`. Never fails: read errors keep the
    /// previous values and uninitialized state turns the update into a no-op.
    pub async fn process<S: EntityStore + ?Sized>(&self, notification: &Notification, store: &mut S) {
        let block = notification.block_number;

        match &notification.event {
            ProtocolEvent::DebtUpdated {
                account,
                synthetic_token,
            } => {
                let debt = self
                    .reader
                    .debt(*account, *synthetic_token, block)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            account = %account,
                            synthetic_token = %synthetic_token,
                            error = %e,
                            "Debt read failed, keeping stored debt"
                        );
                    })
                    .ok();

                let vault = DirectUpdates::apply_debt(store, *account, *synthetic_token, debt);
                tracing::info!(
                    vault = %vault.id,
                    account = %account,
                    debt = %vault.debt,
                    health = %vault.health(),
                    block,
                    "Vault debt updated"
                );
            }
            ProtocolEvent::CollateralUpdated {
                account,
                synthetic_token,
                collateral_token,
            } => {
                let amount = self
                    .reader
                    .collateral_balance(*account, *synthetic_token, *collateral_token, block)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            account = %account,
                            collateral_token = %collateral_token,
                            error = %e,
                            "Collateral read failed, keeping stored balance"
                        );
                    })
                    .ok();

                let vault = DirectUpdates::apply_collateral(
                    store,
                    *account,
                    *synthetic_token,
                    *collateral_token,
                    amount,
                );
                tracing::info!(
                    vault = %vault.id,
                    account = %account,
                    collateral_token = %collateral_token,
                    collateral_ratio = %vault.collateral_ratio,
                    health = %vault.health(),
                    block,
                    "Vault collateral updated"
                );
            }
            ProtocolEvent::TokenConfigured { token, kind } => {
                let metadata = self.reader.token_metadata(*token, *kind, block).await;
                DirectUpdates::apply_token_configured(store, &self.propagator, *token, *kind, &metadata);
            }
            ProtocolEvent::AnswerUpdated {
                feed,
                answer,
                round_id,
                updated_at,
            } => {
                let outcome = self.propagator.on_rate_update(
                    store,
                    *feed,
                    *answer,
                    *round_id,
                    *updated_at,
                    block,
                );
                if outcome == RateUpdateOutcome::AnchorMissing {
                    tracing::debug!(feed = %feed, block, "Waiting for first anchor answer");
                }
            }
            ProtocolEvent::KeeperPoolStaked {
                pool,
                account,
                synthetic_token,
                amount,
            } => {
                let readings = PoolReadings {
                    total_deposits: self.pool_deposits(*pool, *synthetic_token, block).await,
                    stake: self.pool_stake(*pool, *account, *synthetic_token, block).await,
                    collateral: Vec::new(),
                };
                self.apply_pool(
                    store,
                    notification,
                    *pool,
                    *synthetic_token,
                    PoolChange::Staked { amount: *amount },
                    &readings,
                );
            }
            ProtocolEvent::KeeperPoolUnstaked {
                pool,
                account,
                synthetic_token,
                ..
            } => {
                let readings = PoolReadings {
                    total_deposits: self.pool_deposits(*pool, *synthetic_token, block).await,
                    stake: self.pool_stake(*pool, *account, *synthetic_token, block).await,
                    collateral: Vec::new(),
                };
                self.apply_pool(
                    store,
                    notification,
                    *pool,
                    *synthetic_token,
                    PoolChange::Unstaked,
                    &readings,
                );
            }
            ProtocolEvent::KeeperPoolWithdrawn {
                pool,
                synthetic_token,
                ..
            } => {
                let readings = PoolReadings {
                    collateral: self.pool_collateral(*pool, *synthetic_token, block).await,
                    ..Default::default()
                };
                self.apply_pool(
                    store,
                    notification,
                    *pool,
                    *synthetic_token,
                    PoolChange::Withdrawn,
                    &readings,
                );
            }
            ProtocolEvent::KeeperPoolLiquidated {
                pool,
                synthetic_token,
                ..
            } => {
                let readings = PoolReadings {
                    total_deposits: self.pool_deposits(*pool, *synthetic_token, block).await,
                    stake: None,
                    collateral: self.pool_collateral(*pool, *synthetic_token, block).await,
                };
                self.apply_pool(
                    store,
                    notification,
                    *pool,
                    *synthetic_token,
                    PoolChange::Liquidated,
                    &readings,
                );
            }
            ProtocolEvent::Transformed { .. } => {
                if let Some(transform) = TransformLog::record(store, notification) {
                    tracing::info!(
                        transform = %transform.id,
                        account = %transform.account,
                        token_in = %transform.token_in,
                        token_out = %transform.token_out,
                        block,
                        "Transform recorded"
                    );
                }
            }
        }
    }

    fn apply_pool<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        notification: &Notification,
        pool: Address,
        synthetic_token: TokenId,
        change: PoolChange,
        readings: &PoolReadings,
    ) {
        let position = (
            notification.block_number,
            notification.log_index.unwrap_or_default(),
        );
        let pool = KeeperPools::apply(store, pool, synthetic_token, change, readings, position);
        tracing::info!(
            pool = %pool.id,
            synthetic_token = %synthetic_token,
            event = notification.event.name(),
            total_deposits = %pool.total_deposits,
            depositors = pool.depositor_count,
            liquidations = pool.liquidations_executed,
            block = notification.block_number,
            "Keeper pool updated"
        );
    }

    async fn pool_deposits(&self, pool: Address, synthetic: TokenId, block: u64) -> Option<U256> {
        self.reader
            .keeper_pool_deposits(pool, synthetic, block)
            .await
            .inspect_err(|e| {
                tracing::warn!(pool = %pool, synthetic_token = %synthetic, error = %e, "Pool deposit read failed");
            })
            .ok()
    }

    async fn pool_stake(
        &self,
        pool: Address,
        account: Address,
        synthetic: TokenId,
        block: u64,
    ) -> Option<U256> {
        self.reader
            .keeper_pool_stake(pool, account, synthetic, block)
            .await
            .inspect_err(|e| {
                tracing::warn!(pool = %pool, account = %account, error = %e, "Pool stake read failed");
            })
            .ok()
    }

    /// Balance of every collateral type; empty when the types cannot be listed.
    async fn pool_collateral(
        &self,
        pool: Address,
        synthetic: TokenId,
        block: u64,
    ) -> Vec<(TokenId, Option<U256>)> {
        let types = match self.reader.collateral_types(block).await {
            Ok(types) => types,
            Err(e) => {
                tracing::warn!(pool = %pool, error = %e, "Collateral type read failed, keeping pool balances");
                return Vec::new();
            }
        };

        let mut balances = Vec::with_capacity(types.len());
        for collateral in types {
            let amount = self
                .reader
                .keeper_pool_collateral(pool, synthetic, collateral, block)
                .await
                .inspect_err(|e| {
                    tracing::warn!(pool = %pool, collateral_token = %collateral, error = %e, "Pool collateral read failed");
                })
                .ok();
            balances.push((collateral, amount));
        }
        balances
    }
}
