use std::hash::Hash;

use alloy::primitives::{Address, B256, I256, U256, keccak256};
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One reference unit in 18-decimal fixed point.
pub const ONE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Rate assigned to a token before its first price arrives. Non-zero so that
/// nothing dividing by a rate can hit zero.
pub const RATE_SENTINEL: U256 = U256::from_limbs([1, 0, 0, 0]);

// ───────────────────────────── identifiers ──────────────────────────────

/// Address of a synthetic or collateral token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub Address);

/// Address of a price feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(pub Address);

/// Identity of a vault: `keccak256(account ++ syntheticToken)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub B256);

/// Identity of a vault collateral record: `keccak256(vaultId ++ collateralToken)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultCollateralId(pub B256);

/// Identity of a keeper pool: `keccak256(poolContract ++ syntheticToken)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeeperPoolId(pub B256);

/// Identity of a keeper pool collateral record: `keccak256(poolId ++ collateralToken)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeeperPoolCollateralId(pub B256);

/// Identity of a transform: the hash of the transaction that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformId(pub B256);

fn hash_pair(left: &[u8], right: &[u8]) -> B256 {
    let mut preimage = Vec::with_capacity(left.len() + right.len());
    preimage.extend_from_slice(left);
    preimage.extend_from_slice(right);
    keccak256(preimage)
}

impl VaultId {
    pub fn derive(account: Address, synthetic_token: TokenId) -> Self {
        Self(hash_pair(account.as_slice(), synthetic_token.0.as_slice()))
    }
}

impl VaultCollateralId {
    pub fn derive(vault: VaultId, collateral_token: TokenId) -> Self {
        Self(hash_pair(vault.0.as_slice(), collateral_token.0.as_slice()))
    }
}

impl KeeperPoolId {
    pub fn derive(pool: Address, synthetic_token: TokenId) -> Self {
        Self(hash_pair(pool.as_slice(), synthetic_token.0.as_slice()))
    }
}

impl KeeperPoolCollateralId {
    pub fn derive(pool: KeeperPoolId, collateral_token: TokenId) -> Self {
        Self(hash_pair(pool.0.as_slice(), collateral_token.0.as_slice()))
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for FeedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for VaultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for VaultCollateralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for KeeperPoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for KeeperPoolCollateralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Display for TransformId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ───────────────────────────── ordered set ──────────────────────────────

/// Insertion-ordered set. An element appears at most once; removal keeps the
/// relative order of the remaining elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderedSet<T: Hash + Eq>(IndexSet<T>);

impl<T: Hash + Eq> OrderedSet<T> {
    pub fn new() -> Self {
        Self(IndexSet::new())
    }

    /// Insert `value` at the end. Returns `false` if it was already present.
    pub fn insert(&mut self, value: T) -> bool {
        self.0.insert(value)
    }

    /// Returns `false` if `value` was not present.
    pub fn remove(&mut self, value: &T) -> bool {
        self.0.shift_remove(value)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.contains(value)
    }

    pub fn iter(&self) -> indexmap::set::Iter<'_, T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Hash + Eq> Default for OrderedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Hash + Eq> FromIterator<T> for OrderedSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a, T: Hash + Eq> IntoIterator for &'a OrderedSet<T> {
    type Item = &'a T;
    type IntoIter = indexmap::set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ───────────────────────────── entities ──────────────────────────────

/// Which side of the protocol a token is configured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Synthetic,
    Collateral,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Synthetic => write!(f, "synthetic"),
            TokenKind::Collateral => write!(f, "collateral"),
        }
    }
}

/// A protocol-issued token backed by vault debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticToken {
    pub id: TokenId,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Value of one whole token in reference units (18-decimal fixed point).
    pub rate: U256,
    pub total_supply: U256,
    pub is_valid: bool,
}

impl SyntheticToken {
    pub fn new(id: TokenId) -> Self {
        Self {
            id,
            symbol: String::new(),
            name: String::new(),
            decimals: 18,
            rate: RATE_SENTINEL,
            total_supply: U256::ZERO,
            is_valid: false,
        }
    }
}

/// A token accepted as vault collateral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralToken {
    pub id: TokenId,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    /// Value of one whole token in reference units (18-decimal fixed point).
    pub rate: U256,
    /// Minting collateral ratio as a percentage (150 = 150%).
    pub mint_collateral_ratio: U256,
    pub liquidation_fee: U256,
    pub interest_rate: U256,
    pub total_balance: U256,
    pub is_valid: bool,
}

impl CollateralToken {
    pub fn new(id: TokenId) -> Self {
        Self {
            id,
            symbol: String::new(),
            name: String::new(),
            decimals: 18,
            rate: RATE_SENTINEL,
            mint_collateral_ratio: U256::ZERO,
            liquidation_fee: U256::ZERO,
            interest_rate: U256::ZERO,
            total_balance: U256::ZERO,
            is_valid: false,
        }
    }
}

/// Risk classification of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultHealth {
    /// No outstanding debt.
    Inert,
    Healthy,
    Redeemable,
    Liquidatable,
}

impl std::fmt::Display for VaultHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultHealth::Inert => write!(f, "inert"),
            VaultHealth::Healthy => write!(f, "healthy"),
            VaultHealth::Redeemable => write!(f, "redeemable"),
            VaultHealth::Liquidatable => write!(f, "liquidatable"),
        }
    }
}

/// One account's borrowing position against one synthetic token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub account: Address,
    pub synthetic_token: TokenId,
    /// Raw synthetic token units.
    pub debt: U256,
    pub debt_as_reference: U256,
    pub collateral_as_reference: U256,
    pub collateral_ratio: U256,
    pub minimum_ratio: U256,
    pub liquidation_ratio: U256,
    pub redeemable_tokens: U256,
    pub is_redeemable: bool,
    pub is_liquidatable: bool,
    /// Collateral types currently held with a non-zero balance.
    pub collateral_addresses: OrderedSet<TokenId>,
}

impl Vault {
    pub fn new(account: Address, synthetic_token: TokenId) -> Self {
        Self {
            id: VaultId::derive(account, synthetic_token),
            account,
            synthetic_token,
            debt: U256::ZERO,
            debt_as_reference: U256::ZERO,
            collateral_as_reference: U256::ZERO,
            collateral_ratio: U256::ZERO,
            minimum_ratio: U256::ZERO,
            liquidation_ratio: U256::ZERO,
            redeemable_tokens: U256::ZERO,
            is_redeemable: false,
            is_liquidatable: false,
            collateral_addresses: OrderedSet::new(),
        }
    }

    pub fn health(&self) -> VaultHealth {
        if self.debt.is_zero() {
            VaultHealth::Inert
        } else if self.is_liquidatable {
            VaultHealth::Liquidatable
        } else if self.is_redeemable {
            VaultHealth::Redeemable
        } else {
            VaultHealth::Healthy
        }
    }
}

/// Balance of one collateral type inside one vault. Kept after the balance
/// returns to zero; `Vault::collateral_addresses` is the live index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCollateral {
    pub id: VaultCollateralId,
    pub vault: VaultId,
    pub token: TokenId,
    /// Raw collateral token units.
    pub amount: U256,
}

impl VaultCollateral {
    pub fn new(vault: VaultId, token: TokenId) -> Self {
        Self {
            id: VaultCollateralId::derive(vault, token),
            vault,
            token,
            amount: U256::ZERO,
        }
    }
}

/// Accounts that have ever opened a vault for a synthetic token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRegistry {
    pub id: TokenId,
    pub owners: OrderedSet<Address>,
}

/// Tokens configured under a protocol root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    pub id: Address,
    pub synthetic_tokens: OrderedSet<TokenId>,
    pub collateral_tokens: OrderedSet<TokenId>,
}

impl TokenRegistry {
    pub fn contains(&self, token: &TokenId) -> bool {
        self.synthetic_tokens.contains(token) || self.collateral_tokens.contains(token)
    }

    /// All known tokens, synthetic first, each listed once.
    pub fn all_tokens(&self) -> OrderedSet<TokenId> {
        self.synthetic_tokens
            .iter()
            .chain(self.collateral_tokens.iter())
            .copied()
            .collect()
    }
}

/// Latest answer reported by a price feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateObservation {
    pub id: FeedId,
    /// Token priced by the feed; `None` for the anchor feed.
    pub token: Option<TokenId>,
    pub value: U256,
    pub round_id: U256,
    pub updated_at: u64,
    pub block_number: u64,
}

/// Pool of the keeper pool contract for one synthetic token. Keepers stake
/// the synthetic token and receive collateral from liquidations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperPool {
    pub id: KeeperPoolId,
    /// Keeper pool contract.
    pub address: Address,
    pub synthetic_token: TokenId,
    pub total_deposits: U256,
    pub depositor_count: u64,
    pub liquidations_executed: u64,
    /// Collateral types currently held with a non-zero balance.
    pub collateral_addresses: OrderedSet<TokenId>,
    /// `(block, log index)` of the last event folded into the counters.
    pub last_event: Option<(u64, u64)>,
}

impl KeeperPool {
    pub fn new(address: Address, synthetic_token: TokenId) -> Self {
        Self {
            id: KeeperPoolId::derive(address, synthetic_token),
            address,
            synthetic_token,
            total_deposits: U256::ZERO,
            depositor_count: 0,
            liquidations_executed: 0,
            collateral_addresses: OrderedSet::new(),
            last_event: None,
        }
    }
}

/// Balance of one collateral type held by a keeper pool. Kept at zero like
/// [`VaultCollateral`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperPoolCollateral {
    pub id: KeeperPoolCollateralId,
    pub pool: KeeperPoolId,
    pub token: TokenId,
    pub amount: U256,
}

impl KeeperPoolCollateral {
    pub fn new(pool: KeeperPoolId, token: TokenId) -> Self {
        Self {
            id: KeeperPoolCollateralId::derive(pool, token),
            pool,
            token,
            amount: U256::ZERO,
        }
    }
}

/// One conversion between synthetic tokens, as reported by the transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub id: TransformId,
    pub account: Address,
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub amount_in: U256,
    pub amount_out: U256,
    /// Block timestamp, unix seconds.
    pub timestamp: u64,
    pub block_number: u64,
}

/// Lookup key of a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    SyntheticToken(TokenId),
    CollateralToken(TokenId),
    Vault(VaultId),
    VaultCollateral(VaultCollateralId),
    VaultRegistry(TokenId),
    TokenRegistry(Address),
    RateObservation(FeedId),
    KeeperPool(KeeperPoolId),
    KeeperPoolCollateral(KeeperPoolCollateralId),
    Transform(TransformId),
}

impl EntityKey {
    /// Table discriminator used by the persistent store.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityKey::SyntheticToken(_) => "synthetic_token",
            EntityKey::CollateralToken(_) => "collateral_token",
            EntityKey::Vault(_) => "vault",
            EntityKey::VaultCollateral(_) => "vault_collateral",
            EntityKey::VaultRegistry(_) => "vault_registry",
            EntityKey::TokenRegistry(_) => "token_registry",
            EntityKey::RateObservation(_) => "rate_observation",
            EntityKey::KeeperPool(_) => "keeper_pool",
            EntityKey::KeeperPoolCollateral(_) => "keeper_pool_collateral",
            EntityKey::Transform(_) => "transform",
        }
    }

    /// Lowercase hex identifier used by the persistent store.
    pub fn id(&self) -> String {
        match self {
            EntityKey::SyntheticToken(id)
            | EntityKey::CollateralToken(id)
            | EntityKey::VaultRegistry(id) => id.to_string(),
            EntityKey::Vault(id) => id.to_string(),
            EntityKey::VaultCollateral(id) => id.to_string(),
            EntityKey::TokenRegistry(root) => format!("{:#x}", root),
            EntityKey::RateObservation(id) => id.to_string(),
            EntityKey::KeeperPool(id) => id.to_string(),
            EntityKey::KeeperPoolCollateral(id) => id.to_string(),
            EntityKey::Transform(id) => id.to_string(),
        }
    }
}

/// Any record held by the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    SyntheticToken(SyntheticToken),
    CollateralToken(CollateralToken),
    Vault(Vault),
    VaultCollateral(VaultCollateral),
    VaultRegistry(VaultRegistry),
    TokenRegistry(TokenRegistry),
    RateObservation(RateObservation),
    KeeperPool(KeeperPool),
    KeeperPoolCollateral(KeeperPoolCollateral),
    Transform(Transform),
}

impl Entity {
    pub fn key(&self) -> EntityKey {
        match self {
            Entity::SyntheticToken(t) => EntityKey::SyntheticToken(t.id),
            Entity::CollateralToken(t) => EntityKey::CollateralToken(t.id),
            Entity::Vault(v) => EntityKey::Vault(v.id),
            Entity::VaultCollateral(c) => EntityKey::VaultCollateral(c.id),
            Entity::VaultRegistry(r) => EntityKey::VaultRegistry(r.id),
            Entity::TokenRegistry(r) => EntityKey::TokenRegistry(r.id),
            Entity::RateObservation(o) => EntityKey::RateObservation(o.id),
            Entity::KeeperPool(p) => EntityKey::KeeperPool(p.id),
            Entity::KeeperPoolCollateral(c) => EntityKey::KeeperPoolCollateral(c.id),
            Entity::Transform(t) => EntityKey::Transform(t.id),
        }
    }
}

impl From<SyntheticToken> for Entity {
    fn from(value: SyntheticToken) -> Self {
        Entity::SyntheticToken(value)
    }
}

impl From<CollateralToken> for Entity {
    fn from(value: CollateralToken) -> Self {
        Entity::CollateralToken(value)
    }
}

impl From<Vault> for Entity {
    fn from(value: Vault) -> Self {
        Entity::Vault(value)
    }
}

impl From<VaultCollateral> for Entity {
    fn from(value: VaultCollateral) -> Self {
        Entity::VaultCollateral(value)
    }
}

impl From<VaultRegistry> for Entity {
    fn from(value: VaultRegistry) -> Self {
        Entity::VaultRegistry(value)
    }
}

impl From<TokenRegistry> for Entity {
    fn from(value: TokenRegistry) -> Self {
        Entity::TokenRegistry(value)
    }
}

impl From<RateObservation> for Entity {
    fn from(value: RateObservation) -> Self {
        Entity::RateObservation(value)
    }
}

impl From<KeeperPool> for Entity {
    fn from(value: KeeperPool) -> Self {
        Entity::KeeperPool(value)
    }
}

impl From<KeeperPoolCollateral> for Entity {
    fn from(value: KeeperPoolCollateral) -> Self {
        Entity::KeeperPoolCollateral(value)
    }
}

impl From<Transform> for Entity {
    fn from(value: Transform) -> Self {
        Entity::Transform(value)
    }
}

// ───────────────────────────── events ──────────────────────────────

/// A decoded upstream fact the engine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    DebtUpdated {
        account: Address,
        synthetic_token: TokenId,
    },
    CollateralUpdated {
        account: Address,
        synthetic_token: TokenId,
        collateral_token: TokenId,
    },
    TokenConfigured {
        token: TokenId,
        kind: TokenKind,
    },
    AnswerUpdated {
        feed: FeedId,
        answer: I256,
        round_id: U256,
        updated_at: u64,
    },
    KeeperPoolStaked {
        pool: Address,
        account: Address,
        synthetic_token: TokenId,
        amount: U256,
    },
    KeeperPoolUnstaked {
        pool: Address,
        account: Address,
        synthetic_token: TokenId,
        amount: U256,
    },
    KeeperPoolWithdrawn {
        pool: Address,
        account: Address,
        synthetic_token: TokenId,
    },
    KeeperPoolLiquidated {
        pool: Address,
        account: Address,
        synthetic_token: TokenId,
    },
    Transformed {
        account: Address,
        token_in: TokenId,
        token_out: TokenId,
        amount_in: U256,
        amount_out: U256,
    },
}

impl ProtocolEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::DebtUpdated { .. } => "debt_updated",
            ProtocolEvent::CollateralUpdated { .. } => "collateral_updated",
            ProtocolEvent::TokenConfigured { .. } => "token_configured",
            ProtocolEvent::AnswerUpdated { .. } => "answer_updated",
            ProtocolEvent::KeeperPoolStaked { .. } => "keeper_pool_staked",
            ProtocolEvent::KeeperPoolUnstaked { .. } => "keeper_pool_unstaked",
            ProtocolEvent::KeeperPoolWithdrawn { .. } => "keeper_pool_withdrawn",
            ProtocolEvent::KeeperPoolLiquidated { .. } => "keeper_pool_liquidated",
            ProtocolEvent::Transformed { .. } => "transformed",
        }
    }
}

/// A protocol event together with where it was observed on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub tx_hash: String,
    pub log_index: Option<u64>,
    pub block_number: u64,
    pub block_timestamp: DateTime<Utc>,
    /// Contract that emitted the log.
    pub emitter: Address,
    pub event: ProtocolEvent,
}
