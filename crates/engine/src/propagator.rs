//! Price-change propagation.
//!
//! A feed tick updates one or more token rates and then revalues every vault
//! whose classification depends on those tokens:
//! - synthetic token: every vault in its owner registry
//! - collateral token: every vault, across all synthetic tokens, that
//!   currently lists the token in `collateral_addresses`
//! - anchor feed: all of the above for every registered token

use alloy::primitives::{Address, I256, U256};

use fxvault_common::types::{FeedId, OrderedSet, RateObservation, TokenId, TokenRegistry, VaultId};

use crate::cr_calculator::CrCalculator;
use crate::feeds::{FeedTable, FeedTarget};
use crate::rates::RateStore;
use crate::registry::Registry;
use crate::store::EntityStore;

/// What a feed tick did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateUpdateOutcome {
    /// The feed is not in the feed table.
    UnknownFeed,
    /// Non-positive answer, or one that converts to a zero rate.
    RejectedAnswer,
    /// A token feed reported before the anchor; nothing was written.
    AnchorMissing,
    /// Observation stored but no tokens are configured yet.
    NoTokenRegistry,
    Applied {
        tokens: Vec<TokenId>,
        vaults_revalued: usize,
        vaults_changed: usize,
    },
}

pub struct PricePropagator {
    root: Address,
    feeds: FeedTable,
}

impl PricePropagator {
    pub fn new(root: Address, feeds: FeedTable) -> Self {
        Self { root, feeds }
    }

    pub fn root(&self) -> Address {
        self.root
    }

    pub fn feeds(&self) -> &FeedTable {
        &self.feeds
    }

    /// Apply one feed answer: record the observation, re-rate the affected
    /// tokens and revalue their dependent vaults.
    pub fn on_rate_update<S: EntityStore + ?Sized>(
        &self,
        store: &mut S,
        feed: FeedId,
        answer: I256,
        round_id: U256,
        updated_at: u64,
        block_number: u64,
    ) -> RateUpdateOutcome {
        let Some(target) = self.feeds.resolve(feed) else {
            tracing::trace!(feed = %feed, "Answer from unmapped feed ignored");
            return RateUpdateOutcome::UnknownFeed;
        };

        if answer <= I256::ZERO {
            tracing::warn!(feed = %feed, answer = %answer, "Non-positive feed answer rejected");
            return RateUpdateOutcome::RejectedAnswer;
        }
        let value = answer.into_raw();

        let observation = RateObservation {
            id: feed,
            token: None,
            value,
            round_id,
            updated_at,
            block_number,
        };

        let affected = match target {
            FeedTarget::Anchor => {
                store.save(observation.into());
                let Some(registry) = store.token_registry(self.root) else {
                    tracing::debug!(feed = %feed, "Anchor updated before any token was configured");
                    return RateUpdateOutcome::NoTokenRegistry;
                };

                let tokens: Vec<TokenId> = registry.all_tokens().iter().copied().collect();
                for token in &tokens {
                    if let Some(rate) = self.feeds.derive_rate(&*store, *token) {
                        RateStore::set_rate(store, *token, rate);
                    }
                }
                (registry, tokens)
            }
            FeedTarget::Token(token) => {
                let Some(anchor) = store.rate_observation(self.feeds.anchor()) else {
                    tracing::warn!(
                        feed = %feed,
                        token = %token,
                        "Anchor rate unknown, dropping token price update"
                    );
                    return RateUpdateOutcome::AnchorMissing;
                };
                if FeedTable::convert(value, anchor.value).is_none() {
                    tracing::warn!(feed = %feed, token = %token, "Feed answer converts to a zero rate");
                    return RateUpdateOutcome::RejectedAnswer;
                }

                store.save(
                    RateObservation {
                        token: Some(token),
                        ..observation
                    }
                    .into(),
                );
                let Some(registry) = store.token_registry(self.root) else {
                    tracing::debug!(token = %token, "Price stored before any token was configured");
                    return RateUpdateOutcome::NoTokenRegistry;
                };

                if let Some(rate) = self.feeds.derive_rate(&*store, token) {
                    RateStore::set_rate(store, token, rate);
                }
                (registry, vec![token])
            }
        };

        let (registry, tokens) = affected;
        let (vaults_revalued, vaults_changed) = Self::revalue_dependents(store, &registry, &tokens);

        tracing::info!(
            feed = %feed,
            tokens = tokens.len(),
            vaults_revalued,
            vaults_changed,
            block_number,
            "Rate update propagated"
        );

        RateUpdateOutcome::Applied {
            tokens,
            vaults_revalued,
            vaults_changed,
        }
    }

    /// Revalue each vault depending on any of `tokens` exactly once. Returns
    /// `(revalued, changed)`; only changed vaults are written.
    pub fn revalue_dependents<S: EntityStore + ?Sized>(
        store: &mut S,
        registry: &TokenRegistry,
        tokens: &[TokenId],
    ) -> (usize, usize) {
        let mut targets: OrderedSet<VaultId> = OrderedSet::new();

        for token in tokens {
            if registry.synthetic_tokens.contains(token) {
                for owner in Registry::list_owners(&*store, *token) {
                    targets.insert(VaultId::derive(owner, *token));
                }
            }

            if registry.collateral_tokens.contains(token) {
                for synthetic in registry.synthetic_tokens.iter() {
                    for owner in Registry::list_owners(&*store, *synthetic) {
                        let id = VaultId::derive(owner, *synthetic);
                        if targets.contains(&id) {
                            continue;
                        }
                        if let Some(vault) = store.vault(id)
                            && vault.collateral_addresses.contains(token)
                        {
                            targets.insert(id);
                        }
                    }
                }
            }
        }

        let mut revalued = 0;
        let mut changed = 0;
        for id in targets.iter() {
            let Some(vault) = store.vault(*id) else {
                continue;
            };
            let updated = CrCalculator::revalue(&vault, &*store);
            revalued += 1;
            if updated != vault {
                tracing::debug!(
                    vault = %id,
                    health = %updated.health(),
                    collateral_ratio = %updated.collateral_ratio,
                    "Vault revalued"
                );
                store.save(updated.into());
                changed += 1;
            }
        }
        (revalued, changed)
    }
}
