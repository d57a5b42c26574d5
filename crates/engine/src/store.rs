//! Entity store abstraction.
//!
//! The engine only ever talks to an [`EntityStore`]: `load` by key, `save` by
//! value. [`MemoryStore`] is the in-process system of record and
//! [`StagedStore`] collects the writes of one notification so the caller can
//! commit them together or drop them. [`UndoLog`] keeps what recent blocks
//! overwrote so they can be rolled back.

use std::collections::{HashMap, VecDeque};

use alloy::primitives::Address;
use indexmap::IndexMap;

use fxvault_common::types::{
    CollateralToken, Entity, EntityKey, FeedId, KeeperPool, KeeperPoolCollateral,
    KeeperPoolCollateralId, KeeperPoolId, RateObservation, SyntheticToken, TokenId, TokenRegistry,
    Transform, TransformId, Vault, VaultCollateral, VaultCollateralId, VaultId, VaultRegistry,
};

/// Key-value access to engine entities. Reads are immediately consistent
/// with earlier writes through the same store.
pub trait EntityStore {
    fn load(&self, key: &EntityKey) -> Option<Entity>;

    fn save(&mut self, entity: Entity);

    fn synthetic_token(&self, id: TokenId) -> Option<SyntheticToken> {
        match self.load(&EntityKey::SyntheticToken(id)) {
            Some(Entity::SyntheticToken(token)) => Some(token),
            _ => None,
        }
    }

    fn collateral_token(&self, id: TokenId) -> Option<CollateralToken> {
        match self.load(&EntityKey::CollateralToken(id)) {
            Some(Entity::CollateralToken(token)) => Some(token),
            _ => None,
        }
    }

    fn vault(&self, id: VaultId) -> Option<Vault> {
        match self.load(&EntityKey::Vault(id)) {
            Some(Entity::Vault(vault)) => Some(vault),
            _ => None,
        }
    }

    fn vault_collateral(&self, id: VaultCollateralId) -> Option<VaultCollateral> {
        match self.load(&EntityKey::VaultCollateral(id)) {
            Some(Entity::VaultCollateral(collateral)) => Some(collateral),
            _ => None,
        }
    }

    fn vault_registry(&self, id: TokenId) -> Option<VaultRegistry> {
        match self.load(&EntityKey::VaultRegistry(id)) {
            Some(Entity::VaultRegistry(registry)) => Some(registry),
            _ => None,
        }
    }

    fn token_registry(&self, root: Address) -> Option<TokenRegistry> {
        match self.load(&EntityKey::TokenRegistry(root)) {
            Some(Entity::TokenRegistry(registry)) => Some(registry),
            _ => None,
        }
    }

    fn rate_observation(&self, id: FeedId) -> Option<RateObservation> {
        match self.load(&EntityKey::RateObservation(id)) {
            Some(Entity::RateObservation(observation)) => Some(observation),
            _ => None,
        }
    }

    fn keeper_pool(&self, id: KeeperPoolId) -> Option<KeeperPool> {
        match self.load(&EntityKey::KeeperPool(id)) {
            Some(Entity::KeeperPool(pool)) => Some(pool),
            _ => None,
        }
    }

    fn keeper_pool_collateral(&self, id: KeeperPoolCollateralId) -> Option<KeeperPoolCollateral> {
        match self.load(&EntityKey::KeeperPoolCollateral(id)) {
            Some(Entity::KeeperPoolCollateral(collateral)) => Some(collateral),
            _ => None,
        }
    }

    fn transform(&self, id: TransformId) -> Option<Transform> {
        match self.load(&EntityKey::Transform(id)) {
            Some(Entity::Transform(transform)) => Some(transform),
            _ => None,
        }
    }
}

/// Hash-map backed store holding every entity in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: HashMap<EntityKey, Entity>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite stored entities with `entities`.
    pub fn apply(&mut self, entities: impl IntoIterator<Item = Entity>) {
        for entity in entities {
            self.entities.insert(entity.key(), entity);
        }
    }

    /// Put back earlier values; `None` removes the entity.
    pub fn restore(&mut self, previous: impl IntoIterator<Item = (EntityKey, Option<Entity>)>) {
        for (key, entity) in previous {
            match entity {
                Some(entity) => {
                    self.entities.insert(key, entity);
                }
                None => {
                    self.entities.remove(&key);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<Entity> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        let mut store = Self::new();
        store.apply(iter);
        store
    }
}

impl EntityStore for MemoryStore {
    fn load(&self, key: &EntityKey) -> Option<Entity> {
        self.entities.get(key).cloned()
    }

    fn save(&mut self, entity: Entity) {
        self.entities.insert(entity.key(), entity);
    }
}

/// Write overlay on top of a read-only base store.
///
/// Nothing reaches the base until the caller takes [`StagedStore::into_writes`]
/// and applies them itself.
pub struct StagedStore<'a, S: EntityStore + ?Sized> {
    base: &'a S,
    writes: IndexMap<EntityKey, Entity>,
}

impl<'a, S: EntityStore + ?Sized> StagedStore<'a, S> {
    pub fn new(base: &'a S) -> Self {
        Self {
            base,
            writes: IndexMap::new(),
        }
    }

    /// Final value of every entity written, in first-write order, leaving out
    /// writes that equal what the base already holds.
    pub fn into_writes(self) -> Vec<Entity> {
        let Self { base, writes } = self;
        writes
            .into_values()
            .filter(|entity| base.load(&entity.key()).as_ref() != Some(entity))
            .collect()
    }
}

impl<S: EntityStore + ?Sized> EntityStore for StagedStore<'_, S> {
    fn load(&self, key: &EntityKey) -> Option<Entity> {
        match self.writes.get(key) {
            Some(entity) => Some(entity.clone()),
            None => self.base.load(key),
        }
    }

    fn save(&mut self, entity: Entity) {
        self.writes.insert(entity.key(), entity);
    }
}

/// Values that entities held before each recent block overwrote them.
#[derive(Debug, Default)]
pub struct UndoLog {
    /// Ascending by block; per block, the value before its first write.
    blocks: VecDeque<(u64, IndexMap<EntityKey, Option<Entity>>)>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember what `base` holds for each entity in `writes`, before they
    /// are applied. A key already recorded for `block` keeps its first value.
    pub fn record<S: EntityStore + ?Sized>(&mut self, block: u64, base: &S, writes: &[Entity]) {
        if writes.is_empty() {
            return;
        }
        if self.blocks.back().is_none_or(|(last, _)| *last != block) {
            self.blocks.push_back((block, IndexMap::new()));
        }
        if let Some((_, previous)) = self.blocks.back_mut() {
            for entity in writes {
                let key = entity.key();
                previous.entry(key).or_insert_with(|| base.load(&key));
            }
        }
    }

    /// Forget blocks below `block`; they can no longer be reorganized.
    pub fn prune_below(&mut self, block: u64) {
        while self.blocks.front().is_some_and(|(number, _)| *number < block) {
            self.blocks.pop_front();
        }
    }

    /// Remove the history of every block at or above `block` and return the
    /// values to restore. Each key gets the value it had before the earliest
    /// of those blocks.
    pub fn rollback_from(&mut self, block: u64) -> Vec<(EntityKey, Option<Entity>)> {
        let mut restore = IndexMap::new();
        while self.blocks.back().is_some_and(|(number, _)| *number >= block) {
            if let Some((_, previous)) = self.blocks.pop_back() {
                // Later iterations are earlier blocks and overwrite.
                restore.extend(previous);
            }
        }
        restore.into_iter().collect()
    }

    /// Number of blocks with recorded history.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
