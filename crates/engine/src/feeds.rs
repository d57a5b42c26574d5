//! Static feed table: which token each price feed prices, built once at startup.

use std::collections::HashMap;

use alloy::primitives::U256;

use fxvault_common::config::FeedConfig;
use fxvault_common::types::{FeedId, ONE, TokenId};

use crate::store::EntityStore;

/// What a feed update redefines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedTarget {
    /// The reference asset itself; every token's rate moves.
    Anchor,
    Token(TokenId),
}

#[derive(Debug, Clone)]
pub struct FeedTable {
    anchor: FeedId,
    targets: HashMap<FeedId, TokenId>,
    feed_of: HashMap<TokenId, FeedId>,
    reference_token: Option<TokenId>,
}

impl FeedTable {
    pub fn new(
        anchor: FeedId,
        feeds: impl IntoIterator<Item = (FeedId, TokenId)>,
        reference_token: Option<TokenId>,
    ) -> Self {
        let mut targets = HashMap::new();
        let mut feed_of = HashMap::new();
        for (feed, token) in feeds {
            if feed == anchor {
                tracing::warn!(feed = %feed, "Anchor feed listed as a token feed, ignoring entry");
                continue;
            }
            targets.insert(feed, token);
            feed_of.insert(token, feed);
        }

        Self {
            anchor,
            targets,
            feed_of,
            reference_token,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.anchor,
            config.feeds.iter().copied(),
            config.reference_token,
        )
    }

    pub fn anchor(&self) -> FeedId {
        self.anchor
    }

    pub fn resolve(&self, feed: FeedId) -> Option<FeedTarget> {
        if feed == self.anchor {
            return Some(FeedTarget::Anchor);
        }
        self.targets.get(&feed).copied().map(FeedTarget::Token)
    }

    pub fn feed_for(&self, token: TokenId) -> Option<FeedId> {
        self.feed_of.get(&token).copied()
    }

    pub fn is_reference(&self, token: TokenId) -> bool {
        self.reference_token == Some(token)
    }

    /// Reference-unit rate of `token` from the latest stored observations.
    /// `None` while the anchor or the token's own feed has not reported yet.
    pub fn derive_rate<S: EntityStore + ?Sized>(&self, store: &S, token: TokenId) -> Option<U256> {
        if self.is_reference(token) {
            return Some(ONE);
        }
        let anchor = store.rate_observation(self.anchor)?;
        let observation = store.rate_observation(self.feed_for(token)?)?;
        Self::convert(observation.value, anchor.value)
    }

    /// Re-express a feed answer in reference units. Both answers must quote
    /// the same currency with the same number of decimals.
    pub fn convert(value: U256, anchor_value: U256) -> Option<U256> {
        if anchor_value.is_zero() {
            return None;
        }
        let rate = value.checked_mul(ONE)? / anchor_value;
        (!rate.is_zero()).then_some(rate)
    }
}
