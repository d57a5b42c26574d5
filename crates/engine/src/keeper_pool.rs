//! Keeper pool bookkeeping.
//!
//! Pool totals and collateral balances are overwritten from chain reads, so
//! replaying an event is harmless. The depositor and liquidation counters are
//! incremental; they only move for events positioned after the last one the
//! pool has already counted.

use alloy::primitives::{Address, U256};

use fxvault_common::types::{KeeperPool, KeeperPoolCollateral, KeeperPoolCollateralId, KeeperPoolId, TokenId};

use crate::store::EntityStore;

/// What happened to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolChange {
    Staked { amount: U256 },
    Unstaked,
    Withdrawn,
    Liquidated,
}

/// Values read from the chain for one pool event. `None` keeps the stored
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReadings {
    pub total_deposits: Option<U256>,
    /// Stake of the event's account once the event has executed.
    pub stake: Option<U256>,
    /// Pool balance per collateral type.
    pub collateral: Vec<(TokenId, Option<U256>)>,
}

pub struct KeeperPools;

impl KeeperPools {
    pub fn load_or_create<S: EntityStore + ?Sized>(
        store: &S,
        address: Address,
        synthetic_token: TokenId,
    ) -> KeeperPool {
        store
            .keeper_pool(KeeperPoolId::derive(address, synthetic_token))
            .unwrap_or_else(|| KeeperPool::new(address, synthetic_token))
    }

    /// Fold one pool event at `position` (block, log index) into the store.
    pub fn apply<S: EntityStore + ?Sized>(
        store: &mut S,
        address: Address,
        synthetic_token: TokenId,
        change: PoolChange,
        readings: &PoolReadings,
        position: (u64, u64),
    ) -> KeeperPool {
        let mut pool = Self::load_or_create(&*store, address, synthetic_token);
        let first_delivery = pool.last_event.is_none_or(|last| position > last);

        if change != PoolChange::Withdrawn
            && let Some(total) = readings.total_deposits
        {
            pool.total_deposits = total;
        }

        match change {
            PoolChange::Staked { amount } => {
                // A stake equal to the whole balance opens a new deposit.
                if first_delivery && readings.stake == Some(amount) {
                    pool.depositor_count += 1;
                }
            }
            PoolChange::Unstaked => {
                if first_delivery && readings.stake == Some(U256::ZERO) {
                    pool.depositor_count = pool.depositor_count.saturating_sub(1);
                }
            }
            PoolChange::Withdrawn => {
                Self::apply_collateral(store, &mut pool, &readings.collateral);
            }
            PoolChange::Liquidated => {
                if first_delivery {
                    pool.liquidations_executed += 1;
                }
                Self::apply_collateral(store, &mut pool, &readings.collateral);
            }
        }

        if first_delivery {
            pool.last_event = Some(position);
        }
        store.save(pool.clone().into());
        pool
    }

    fn apply_collateral<S: EntityStore + ?Sized>(
        store: &mut S,
        pool: &mut KeeperPool,
        balances: &[(TokenId, Option<U256>)],
    ) {
        for (token, amount) in balances {
            let mut holding = store
                .keeper_pool_collateral(KeeperPoolCollateralId::derive(pool.id, *token))
                .unwrap_or_else(|| KeeperPoolCollateral::new(pool.id, *token));
            if let Some(amount) = amount {
                holding.amount = *amount;
            }
            if holding.amount.is_zero() {
                pool.collateral_addresses.remove(token);
            } else {
                pool.collateral_addresses.insert(*token);
            }
            store.save(holding.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxvault_common::types::ONE;

    use crate::store::MemoryStore;

    const POOL: Address = Address::new([0x77; 20]);

    fn token(byte: u8) -> TokenId {
        TokenId(Address::repeat_byte(byte))
    }

    fn readings(total: u64, stake: u64) -> PoolReadings {
        PoolReadings {
            total_deposits: Some(U256::from(total) * ONE),
            stake: Some(U256::from(stake) * ONE),
            collateral: vec![],
        }
    }

    #[test]
    fn test_stake_counts_new_depositors_only() {
        let mut store = MemoryStore::new();
        let amount = U256::from(100) * ONE;

        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount },
            &readings(100, 100),
            (10, 0),
        );
        assert_eq!(pool.depositor_count, 1);
        assert_eq!(pool.total_deposits, amount);

        // Top-up by the same account: balance exceeds the event amount
        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount },
            &readings(200, 200),
            (11, 0),
        );
        assert_eq!(pool.depositor_count, 1);
        assert_eq!(pool.total_deposits, U256::from(200) * ONE);
    }

    #[test]
    fn test_unstake_to_zero_removes_depositor() {
        let mut store = MemoryStore::new();
        let amount = U256::from(50) * ONE;
        KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount },
            &readings(50, 50),
            (10, 0),
        );

        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Unstaked,
            &readings(20, 20),
            (11, 0),
        );
        assert_eq!(pool.depositor_count, 1);

        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Unstaked,
            &readings(0, 0),
            (12, 0),
        );
        assert_eq!(pool.depositor_count, 0);

        // Never underflows
        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Unstaked,
            &readings(0, 0),
            (13, 0),
        );
        assert_eq!(pool.depositor_count, 0);
    }

    #[test]
    fn test_redelivered_event_is_not_counted_twice() {
        let mut store = MemoryStore::new();
        let liquidation = PoolReadings {
            total_deposits: Some(ONE),
            stake: None,
            collateral: vec![(token(0xC1), Some(ONE))],
        };

        let first = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Liquidated,
            &liquidation,
            (20, 3),
        );
        let again = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Liquidated,
            &liquidation,
            (20, 3),
        );
        assert_eq!(first, again);
        assert_eq!(again.liquidations_executed, 1);

        let later = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Liquidated,
            &liquidation,
            (20, 4),
        );
        assert_eq!(later.liquidations_executed, 2);
    }

    #[test]
    fn test_collateral_membership_follows_balance() {
        let mut store = MemoryStore::new();
        let mut readings = PoolReadings {
            total_deposits: None,
            stake: None,
            collateral: vec![(token(0xC1), Some(ONE)), (token(0xC2), Some(U256::ZERO))],
        };

        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Withdrawn,
            &readings,
            (30, 0),
        );
        assert_eq!(pool.collateral_addresses.iter().copied().collect::<Vec<_>>(), vec![token(0xC1)]);
        // Zero balances still get a record
        let zero = store
            .keeper_pool_collateral(KeeperPoolCollateralId::derive(pool.id, token(0xC2)))
            .unwrap();
        assert_eq!(zero.amount, U256::ZERO);

        readings.collateral = vec![(token(0xC1), Some(U256::ZERO)), (token(0xC2), None)];
        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Withdrawn,
            &readings,
            (31, 0),
        );
        assert!(pool.collateral_addresses.is_empty());
    }

    #[test]
    fn test_failed_reads_keep_totals() {
        let mut store = MemoryStore::new();
        KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount: ONE },
            &readings(1, 1),
            (10, 0),
        );

        let pool = KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount: ONE },
            &PoolReadings::default(),
            (11, 0),
        );
        assert_eq!(pool.total_deposits, ONE);
        assert_eq!(pool.depositor_count, 1);
    }

    #[test]
    fn test_pools_are_per_synthetic_token() {
        let mut store = MemoryStore::new();
        KeeperPools::apply(
            &mut store,
            POOL,
            token(0xA1),
            PoolChange::Staked { amount: ONE },
            &readings(1, 1),
            (10, 0),
        );
        let other = KeeperPools::load_or_create(&store, POOL, token(0xB1));
        assert_eq!(other.depositor_count, 0);
        assert!(store.keeper_pool(other.id).is_none());
    }
}
