//! End-to-end engine scenarios: notifications in, vault state out.
//!
//! Runs against `MemoryStore` and a scripted protocol reader, no database or
//! RPC needed:
//!
//! ```bash
//! cargo test -p fxvault-engine --test integration
//! ```

use std::cell::RefCell;
use std::collections::HashMap;

use alloy::primitives::{Address, B256, I256, U256};
use chrono::Utc;

use fxvault_common::error::ReadError;
use fxvault_common::types::{
    FeedId, KeeperPoolCollateralId, KeeperPoolId, Notification, ONE, ProtocolEvent, TokenId,
    TokenKind, TransformId, Vault, VaultHealth, VaultId,
};
use fxvault_engine::feeds::FeedTable;
use fxvault_engine::handlers::{EventProcessor, ProtocolReader};
use fxvault_engine::propagator::PricePropagator;
use fxvault_engine::rates::TokenMetadata;
use fxvault_engine::registry::Registry;
use fxvault_engine::store::{EntityStore, MemoryStore, StagedStore, UndoLog};

// ============================================================
// Shared helpers
// ============================================================

const FX_AUD: TokenId = TokenId(Address::new([0xA1; 20]));
const FX_EUR: TokenId = TokenId(Address::new([0xB1; 20]));
const WETH: TokenId = TokenId(Address::new([0xC1; 20]));
const USDC: TokenId = TokenId(Address::new([0xD1; 20]));

const ANCHOR_FEED: FeedId = FeedId(Address::new([0xE0; 20]));
const AUD_FEED: FeedId = FeedId(Address::new([0xA0; 20]));
const EUR_FEED: FeedId = FeedId(Address::new([0xB0; 20]));
const WETH_FEED: FeedId = FeedId(Address::new([0xC0; 20]));
const USDC_FEED: FeedId = FeedId(Address::new([0xD0; 20]));

const PROTOCOL: Address = Address::new([0xEE; 20]);
const KEEPER_POOL: Address = Address::new([0x77; 20]);
const TRANSFORMER: Address = Address::new([0x55; 20]);
const ALICE: Address = Address::new([0x01; 20]);
const BOB: Address = Address::new([0x02; 20]);

fn units(n: u64) -> U256 {
    U256::from(n) * ONE
}

/// Protocol state the handlers read from. Missing entries read as reverts.
#[derive(Default)]
struct ScriptedReader {
    debts: RefCell<HashMap<(Address, TokenId), U256>>,
    balances: RefCell<HashMap<(Address, TokenId, TokenId), U256>>,
    mint_ratios: RefCell<HashMap<TokenId, U256>>,
    collateral_types: RefCell<Option<Vec<TokenId>>>,
    pool_deposits: RefCell<HashMap<TokenId, U256>>,
    pool_stakes: RefCell<HashMap<(Address, TokenId), U256>>,
    pool_collateral: RefCell<HashMap<(TokenId, TokenId), U256>>,
}

impl ScriptedReader {
    fn set_debt(&self, account: Address, token: TokenId, debt: U256) {
        self.debts.borrow_mut().insert((account, token), debt);
    }

    fn set_balance(&self, account: Address, synthetic: TokenId, collateral: TokenId, amount: U256) {
        self.balances
            .borrow_mut()
            .insert((account, synthetic, collateral), amount);
    }

    fn set_pool(&self, synthetic: TokenId, deposits: U256, stakes: &[(Address, U256)]) {
        self.pool_deposits.borrow_mut().insert(synthetic, deposits);
        let mut pool_stakes = self.pool_stakes.borrow_mut();
        for (account, stake) in stakes {
            pool_stakes.insert((*account, synthetic), *stake);
        }
    }

    fn clear(&self) {
        self.debts.borrow_mut().clear();
        self.balances.borrow_mut().clear();
    }
}

impl ProtocolReader for &ScriptedReader {
    async fn debt(&self, account: Address, token: TokenId, _block: u64) -> Result<U256, ReadError> {
        self.debts
            .borrow()
            .get(&(account, token))
            .copied()
            .ok_or_else(|| ReadError::Reverted("getDebt".to_string()))
    }

    async fn collateral_balance(
        &self,
        account: Address,
        synthetic: TokenId,
        collateral: TokenId,
        _block: u64,
    ) -> Result<U256, ReadError> {
        self.balances
            .borrow()
            .get(&(account, synthetic, collateral))
            .copied()
            .ok_or_else(|| ReadError::Transport("connection reset".to_string()))
    }

    async fn token_metadata(&self, token: TokenId, kind: TokenKind, _block: u64) -> TokenMetadata {
        match kind {
            TokenKind::Synthetic => TokenMetadata {
                symbol: Some(format!("fx{}", &token.to_string()[2..5])),
                decimals: Some(18),
                is_valid: Some(true),
                ..Default::default()
            },
            TokenKind::Collateral => TokenMetadata {
                decimals: Some(if token == USDC { 6 } else { 18 }),
                is_valid: Some(true),
                mint_collateral_ratio: self.mint_ratios.borrow().get(&token).copied(),
                ..Default::default()
            },
        }
    }

    async fn collateral_types(&self, _block: u64) -> Result<Vec<TokenId>, ReadError> {
        self.collateral_types
            .borrow()
            .clone()
            .ok_or_else(|| ReadError::Reverted("getAllCollateralTypes".to_string()))
    }

    async fn keeper_pool_deposits(
        &self,
        _pool: Address,
        synthetic: TokenId,
        _block: u64,
    ) -> Result<U256, ReadError> {
        self.pool_deposits
            .borrow()
            .get(&synthetic)
            .copied()
            .ok_or_else(|| ReadError::Reverted("getPoolTotalDeposit".to_string()))
    }

    async fn keeper_pool_stake(
        &self,
        _pool: Address,
        account: Address,
        synthetic: TokenId,
        _block: u64,
    ) -> Result<U256, ReadError> {
        self.pool_stakes
            .borrow()
            .get(&(account, synthetic))
            .copied()
            .ok_or_else(|| ReadError::Reverted("balanceOfStake".to_string()))
    }

    async fn keeper_pool_collateral(
        &self,
        _pool: Address,
        synthetic: TokenId,
        collateral: TokenId,
        _block: u64,
    ) -> Result<U256, ReadError> {
        self.pool_collateral
            .borrow()
            .get(&(synthetic, collateral))
            .copied()
            .ok_or_else(|| ReadError::Reverted("getPoolCollateralBalance".to_string()))
    }
}

fn processor(reader: &ScriptedReader) -> EventProcessor<&ScriptedReader> {
    let feeds = FeedTable::new(
        ANCHOR_FEED,
        [
            (AUD_FEED, FX_AUD),
            (EUR_FEED, FX_EUR),
            (WETH_FEED, WETH),
            (USDC_FEED, USDC),
        ],
        None,
    );
    EventProcessor::new(reader, PricePropagator::new(PROTOCOL, feeds))
}

fn notification(block_number: u64, emitter: Address, event: ProtocolEvent) -> Notification {
    Notification {
        tx_hash: format!("{:#x}", B256::with_last_byte(block_number as u8)),
        log_index: Some(0),
        block_number,
        block_timestamp: Utc::now(),
        emitter,
        event,
    }
}

fn configured(token: TokenId, kind: TokenKind) -> Notification {
    notification(1, PROTOCOL, ProtocolEvent::TokenConfigured { token, kind })
}

fn answer(feed: FeedId, value: i64, block_number: u64) -> Notification {
    notification(
        block_number,
        feed.0,
        ProtocolEvent::AnswerUpdated {
            feed,
            answer: I256::try_from(value).unwrap(),
            round_id: U256::from(block_number),
            updated_at: block_number * 12,
        },
    )
}

fn debt_updated(account: Address, token: TokenId, block_number: u64) -> Notification {
    notification(
        block_number,
        PROTOCOL,
        ProtocolEvent::DebtUpdated {
            account,
            synthetic_token: token,
        },
    )
}

fn collateral_updated(
    account: Address,
    token: TokenId,
    collateral: TokenId,
    block_number: u64,
) -> Notification {
    notification(
        block_number,
        PROTOCOL,
        ProtocolEvent::CollateralUpdated {
            account,
            synthetic_token: token,
            collateral_token: collateral,
        },
    )
}

fn pool_event(block_number: u64, log_index: u64, event: ProtocolEvent) -> Notification {
    Notification {
        log_index: Some(log_index),
        ..notification(block_number, KEEPER_POOL, event)
    }
}

async fn run(
    processor: &EventProcessor<&ScriptedReader>,
    store: &mut MemoryStore,
    notifications: &[Notification],
) {
    for notification in notifications {
        processor.process(notification, store).await;
    }
}

/// fxAUD and fxEUR at 1.0, WETH at 1.0 (150%), USDC at 1.0 (110%).
async fn bootstrap(reader: &ScriptedReader) -> (EventProcessor<&ScriptedReader>, MemoryStore) {
    reader.mint_ratios.borrow_mut().insert(WETH, U256::from(150));
    reader.mint_ratios.borrow_mut().insert(USDC, U256::from(110));
    let processor = processor(reader);
    let mut store = MemoryStore::new();
    run(
        &processor,
        &mut store,
        &[
            answer(ANCHOR_FEED, 100_000_000, 1),
            configured(FX_AUD, TokenKind::Synthetic),
            configured(FX_EUR, TokenKind::Synthetic),
            configured(WETH, TokenKind::Collateral),
            configured(USDC, TokenKind::Collateral),
            answer(AUD_FEED, 100_000_000, 1),
            answer(EUR_FEED, 100_000_000, 1),
            answer(WETH_FEED, 100_000_000, 1),
            answer(USDC_FEED, 100_000_000, 1),
        ],
    )
    .await;
    (processor, store)
}

/// Open a vault with `debt` fxAUD against `collateral` WETH.
async fn open(
    processor: &EventProcessor<&ScriptedReader>,
    store: &mut MemoryStore,
    reader: &ScriptedReader,
    account: Address,
    token: TokenId,
    debt: U256,
    collateral: U256,
) -> VaultId {
    reader.set_balance(account, token, WETH, collateral);
    reader.set_debt(account, token, debt);
    run(
        processor,
        store,
        &[
            collateral_updated(account, token, WETH, 2),
            debt_updated(account, token, 2),
        ],
    )
    .await;
    VaultId::derive(account, token)
}

fn vault(store: &MemoryStore, id: VaultId) -> Vault {
    store.vault(id).unwrap()
}

// ============================================================
// Valuation scenarios
// ============================================================

#[tokio::test]
async fn test_healthy_then_redeemable_then_insolvent() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;

    let id = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;
    let healthy = vault(&store, id);
    assert_eq!(healthy.collateral_ratio, units(2));
    assert_eq!(healthy.minimum_ratio, units(3) / U256::from(2));
    assert_eq!(healthy.health(), VaultHealth::Healthy);

    reader.set_balance(ALICE, FX_AUD, WETH, units(1200));
    run(&processor, &mut store, &[collateral_updated(ALICE, FX_AUD, WETH, 3)]).await;
    let redeemable = vault(&store, id);
    assert_eq!(redeemable.health(), VaultHealth::Redeemable);
    assert_eq!(redeemable.redeemable_tokens, units(600));

    reader.set_balance(ALICE, FX_AUD, WETH, units(1000));
    run(&processor, &mut store, &[collateral_updated(ALICE, FX_AUD, WETH, 4)]).await;
    let insolvent = vault(&store, id);
    assert_eq!(insolvent.collateral_ratio, ONE);
    assert!(!insolvent.is_redeemable);
    assert_eq!(insolvent.redeemable_tokens, U256::ZERO);
}

#[tokio::test]
async fn test_collateral_before_debt_reaches_fan_out() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;

    reader.set_balance(BOB, FX_AUD, WETH, units(500));
    run(&processor, &mut store, &[collateral_updated(BOB, FX_AUD, WETH, 2)]).await;

    assert_eq!(Registry::list_owners(&store, FX_AUD), vec![BOB]);
    let id = VaultId::derive(BOB, FX_AUD);
    assert_eq!(vault(&store, id).health(), VaultHealth::Inert);

    run(&processor, &mut store, &[answer(WETH_FEED, 200_000_000, 3)]).await;
    assert_eq!(vault(&store, id).collateral_as_reference, units(1000));
}

#[tokio::test]
async fn test_mixed_collateral_uses_value_weighted_minimum() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;

    reader.set_balance(ALICE, FX_AUD, WETH, units(900));
    reader.set_balance(ALICE, FX_AUD, USDC, U256::from(100_000_000u64));
    reader.set_debt(ALICE, FX_AUD, units(100));
    run(
        &processor,
        &mut store,
        &[
            collateral_updated(ALICE, FX_AUD, WETH, 2),
            collateral_updated(ALICE, FX_AUD, USDC, 2),
            debt_updated(ALICE, FX_AUD, 2),
        ],
    )
    .await;

    let vault = vault(&store, VaultId::derive(ALICE, FX_AUD));
    assert_eq!(vault.collateral_as_reference, units(1000));
    // 90% at 150% + 10% at 110%
    assert_eq!(vault.minimum_ratio, units(146) / U256::from(100));
    assert_eq!(vault.collateral_addresses.len(), 2);
}

// ============================================================
// Price fan-out
// ============================================================

#[tokio::test]
async fn test_collateral_price_drop_only_touches_holders() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;

    let holder = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;

    reader.set_balance(BOB, FX_EUR, USDC, U256::from(2_000_000_000u64));
    reader.set_debt(BOB, FX_EUR, units(1000));
    run(
        &processor,
        &mut store,
        &[collateral_updated(BOB, FX_EUR, USDC, 2), debt_updated(BOB, FX_EUR, 2)],
    )
    .await;
    let bystander = VaultId::derive(BOB, FX_EUR);
    let bystander_before = vault(&store, bystander);

    // WETH falls 45%: 2000 WETH now worth 1100
    run(&processor, &mut store, &[answer(WETH_FEED, 55_000_000, 5)]).await;

    let vault_after = vault(&store, holder);
    assert_eq!(vault_after.collateral_ratio, units(11) / U256::from(10));
    assert_eq!(vault_after.health(), VaultHealth::Liquidatable);
    assert!(vault_after.is_redeemable);
    assert_eq!(vault(&store, bystander), bystander_before);
}

#[tokio::test]
async fn test_synthetic_price_rise_revalues_every_owner() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;

    let alice = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;
    let bob = open(&processor, &mut store, &reader, BOB, FX_AUD, units(1000), units(1600)).await;

    // AUD +30%: debt worth 1300
    run(&processor, &mut store, &[answer(AUD_FEED, 130_000_000, 5)]).await;

    assert_eq!(vault(&store, alice).debt_as_reference, units(1300));
    assert_eq!(vault(&store, bob).debt_as_reference, units(1300));
    assert_eq!(vault(&store, alice).health(), VaultHealth::Healthy);
    assert_eq!(vault(&store, bob).health(), VaultHealth::Redeemable);
}

#[tokio::test]
async fn test_anchor_move_reprices_everything() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let id = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;

    // Anchor doubles: every token halves in reference units, ratio holds
    run(&processor, &mut store, &[answer(ANCHOR_FEED, 200_000_000, 6)]).await;

    assert_eq!(store.synthetic_token(FX_AUD).unwrap().rate, ONE / U256::from(2));
    assert_eq!(store.collateral_token(USDC).unwrap().rate, ONE / U256::from(2));
    let vault = vault(&store, id);
    assert_eq!(vault.debt_as_reference, units(500));
    assert_eq!(vault.collateral_as_reference, units(1000));
    assert_eq!(vault.collateral_ratio, units(2));
}

#[tokio::test]
async fn test_token_price_before_anchor_is_dropped() {
    let reader = ScriptedReader::default();
    let processor = processor(&reader);
    let mut store = MemoryStore::new();

    run(
        &processor,
        &mut store,
        &[
            configured(FX_AUD, TokenKind::Synthetic),
            answer(AUD_FEED, 100_000_000, 2),
        ],
    )
    .await;

    assert!(store.rate_observation(AUD_FEED).is_none());
    assert_eq!(
        store.synthetic_token(FX_AUD).unwrap().rate,
        fxvault_common::types::RATE_SENTINEL
    );
}

// ============================================================
// Redelivery and read failures
// ============================================================

#[tokio::test]
async fn test_redelivered_notifications_are_idempotent() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(1500)).await;

    let batch = [
        answer(WETH_FEED, 90_000_000, 7),
        collateral_updated(ALICE, FX_AUD, WETH, 7),
        debt_updated(ALICE, FX_AUD, 7),
    ];
    run(&processor, &mut store, &batch).await;
    let once = store.clone();

    // Replay through a staged store: nothing left to write
    let mut staged = StagedStore::new(&once);
    for notification in &batch {
        processor.process(notification, &mut staged).await;
    }
    assert!(staged.into_writes().is_empty());

    run(&processor, &mut store, &batch).await;
    let id = VaultId::derive(ALICE, FX_AUD);
    assert_eq!(store.vault(id), once.vault(id));
}

#[tokio::test]
async fn test_failed_reads_keep_last_known_values() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let id = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;

    reader.clear();
    run(
        &processor,
        &mut store,
        &[
            debt_updated(ALICE, FX_AUD, 8),
            collateral_updated(ALICE, FX_AUD, WETH, 8),
        ],
    )
    .await;

    let vault = vault(&store, id);
    assert_eq!(vault.debt, units(1000));
    assert_eq!(vault.collateral_as_reference, units(2000));
    assert!(vault.collateral_addresses.contains(&WETH));
}

#[tokio::test]
async fn test_liquidatable_implies_redeemable_across_prices() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let id = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;

    for (block, price) in (10u64..).zip((40_000_000i64..=110_000_000).step_by(2_500_000)) {
        run(&processor, &mut store, &[answer(WETH_FEED, price, block)]).await;
        let vault = vault(&store, id);
        assert!(!vault.is_liquidatable || vault.is_redeemable);
        assert!(vault.redeemable_tokens <= vault.debt);
    }
}

// ============================================================
// Keeper pools and transforms
// ============================================================

#[tokio::test]
async fn test_keeper_pool_tracks_depositors_and_collateral() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let pool_id = KeeperPoolId::derive(KEEPER_POOL, FX_AUD);

    reader.set_pool(FX_AUD, units(100), &[(ALICE, units(100))]);
    let alice_stakes = pool_event(
        20,
        0,
        ProtocolEvent::KeeperPoolStaked {
            pool: KEEPER_POOL,
            account: ALICE,
            synthetic_token: FX_AUD,
            amount: units(100),
        },
    );
    run(&processor, &mut store, &[alice_stakes.clone()]).await;

    reader.set_pool(FX_AUD, units(150), &[(BOB, units(50))]);
    run(
        &processor,
        &mut store,
        &[
            pool_event(
                21,
                0,
                ProtocolEvent::KeeperPoolStaked {
                    pool: KEEPER_POOL,
                    account: BOB,
                    synthetic_token: FX_AUD,
                    amount: units(50),
                },
            ),
            // Redelivered out of order, counted once
            alice_stakes,
        ],
    )
    .await;

    let pool = store.keeper_pool(pool_id).unwrap();
    assert_eq!(pool.depositor_count, 2);
    assert_eq!(pool.total_deposits, units(150));

    // The pool absorbs a vault: deposits shrink, WETH arrives
    *reader.collateral_types.borrow_mut() = Some(vec![WETH, USDC]);
    reader.set_pool(FX_AUD, units(120), &[]);
    reader
        .pool_collateral
        .borrow_mut()
        .insert((FX_AUD, WETH), units(45));
    reader
        .pool_collateral
        .borrow_mut()
        .insert((FX_AUD, USDC), U256::ZERO);
    run(
        &processor,
        &mut store,
        &[pool_event(
            22,
            1,
            ProtocolEvent::KeeperPoolLiquidated {
                pool: KEEPER_POOL,
                account: BOB,
                synthetic_token: FX_AUD,
            },
        )],
    )
    .await;

    let pool = store.keeper_pool(pool_id).unwrap();
    assert_eq!(pool.liquidations_executed, 1);
    assert_eq!(pool.total_deposits, units(120));
    assert_eq!(pool.collateral_addresses.iter().copied().collect::<Vec<_>>(), vec![WETH]);
    let weth = store
        .keeper_pool_collateral(KeeperPoolCollateralId::derive(pool_id, WETH))
        .unwrap();
    assert_eq!(weth.amount, units(45));

    // Collateral swept out to depositors
    reader
        .pool_collateral
        .borrow_mut()
        .insert((FX_AUD, WETH), U256::ZERO);
    run(
        &processor,
        &mut store,
        &[pool_event(
            23,
            0,
            ProtocolEvent::KeeperPoolWithdrawn {
                pool: KEEPER_POOL,
                account: ALICE,
                synthetic_token: FX_AUD,
            },
        )],
    )
    .await;

    let pool = store.keeper_pool(pool_id).unwrap();
    assert!(pool.collateral_addresses.is_empty());
    assert_eq!(pool.total_deposits, units(120));
    assert_eq!(pool.depositor_count, 2);
}

#[tokio::test]
async fn test_unreadable_collateral_types_keep_pool_balances() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let pool_id = KeeperPoolId::derive(KEEPER_POOL, FX_EUR);

    *reader.collateral_types.borrow_mut() = Some(vec![WETH]);
    reader
        .pool_collateral
        .borrow_mut()
        .insert((FX_EUR, WETH), units(3));
    let withdrawn = |block| {
        pool_event(
            block,
            0,
            ProtocolEvent::KeeperPoolWithdrawn {
                pool: KEEPER_POOL,
                account: ALICE,
                synthetic_token: FX_EUR,
            },
        )
    };
    run(&processor, &mut store, &[withdrawn(30)]).await;

    *reader.collateral_types.borrow_mut() = None;
    run(&processor, &mut store, &[withdrawn(31)]).await;

    let pool = store.keeper_pool(pool_id).unwrap();
    assert!(pool.collateral_addresses.contains(&WETH));
    let weth = store
        .keeper_pool_collateral(KeeperPoolCollateralId::derive(pool_id, WETH))
        .unwrap();
    assert_eq!(weth.amount, units(3));
}

#[tokio::test]
async fn test_transform_is_recorded_without_touching_vaults() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let id = open(&processor, &mut store, &reader, ALICE, FX_AUD, units(1000), units(2000)).await;
    let before = vault(&store, id);

    let transform = notification(
        40,
        TRANSFORMER,
        ProtocolEvent::Transformed {
            account: ALICE,
            token_in: FX_AUD,
            token_out: FX_EUR,
            amount_in: units(10),
            amount_out: units(9),
        },
    );
    run(&processor, &mut store, &[transform.clone()]).await;

    let recorded = store
        .transform(TransformId(B256::with_last_byte(40)))
        .unwrap();
    assert_eq!(recorded.account, ALICE);
    assert_eq!(recorded.token_out, FX_EUR);
    assert_eq!(recorded.amount_out, units(9));
    assert_eq!(recorded.block_number, 40);
    assert_eq!(vault(&store, id), before);
}

// ============================================================
// Reorg rollback
// ============================================================

#[tokio::test]
async fn test_rolled_back_debt_event_leaves_no_trace() {
    let reader = ScriptedReader::default();
    let (processor, mut store) = bootstrap(&reader).await;
    let before = store.clone();
    let mut undo = UndoLog::new();

    // Block 10 opens a vault for Bob on a branch that is later orphaned
    reader.set_balance(BOB, FX_EUR, WETH, units(300));
    reader.set_debt(BOB, FX_EUR, units(100));
    for notification in [
        collateral_updated(BOB, FX_EUR, WETH, 10),
        debt_updated(BOB, FX_EUR, 10),
    ] {
        let mut staged = StagedStore::new(&store);
        processor.process(&notification, &mut staged).await;
        let writes = staged.into_writes();
        undo.record(notification.block_number, &store, &writes);
        store.apply(writes);
    }
    let id = VaultId::derive(BOB, FX_EUR);
    assert_eq!(vault(&store, id).debt, units(100));
    assert_eq!(Registry::list_owners(&store, FX_EUR), vec![BOB]);

    store.restore(undo.rollback_from(10));

    assert!(store.vault(id).is_none());
    assert!(Registry::list_owners(&store, FX_EUR).is_empty());
    assert_eq!(store.len(), before.len());
    assert!(undo.is_empty());
}
