//! Registry layer: vault owners per synthetic token and configured tokens per
//! protocol root. Membership only ever grows.

use alloy::primitives::Address;

use fxvault_common::types::{OrderedSet, TokenId, TokenKind, TokenRegistry, VaultRegistry};

use crate::store::EntityStore;

pub struct Registry;

impl Registry {
    /// Record that `account` has a vault for `token`. Returns `false` if it
    /// was already registered (nothing is written then).
    pub fn add_owner<S: EntityStore + ?Sized>(
        store: &mut S,
        token: TokenId,
        account: Address,
    ) -> bool {
        let mut registry = store.vault_registry(token).unwrap_or_else(|| VaultRegistry {
            id: token,
            owners: OrderedSet::new(),
        });

        if !registry.owners.insert(account) {
            return false;
        }
        store.save(registry.into());
        true
    }

    /// Accounts with a vault for `token`, in registration order. Empty when
    /// no registry exists yet.
    pub fn list_owners<S: EntityStore + ?Sized>(store: &S, token: TokenId) -> Vec<Address> {
        store
            .vault_registry(token)
            .map(|registry| registry.owners.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Add `token` to the root's synthetic or collateral set.
    pub fn register_token<S: EntityStore + ?Sized>(
        store: &mut S,
        root: Address,
        kind: TokenKind,
        token: TokenId,
    ) -> bool {
        let mut registry = store.token_registry(root).unwrap_or_else(|| TokenRegistry {
            id: root,
            synthetic_tokens: OrderedSet::new(),
            collateral_tokens: OrderedSet::new(),
        });

        let inserted = match kind {
            TokenKind::Synthetic => registry.synthetic_tokens.insert(token),
            TokenKind::Collateral => registry.collateral_tokens.insert(token),
        };
        if inserted {
            tracing::info!(root = %root, token = %token, kind = %kind, "Token registered");
            store.save(registry.into());
        }
        inserted
    }
}
