use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use chrono::{TimeZone, Utc};
use sqlx::PgPool;

use fxvault_common::repository::EntityRepository;
use fxvault_common::types::Notification;
use fxvault_decoders::DecoderRegistry;
use fxvault_engine::handlers::EventProcessor;
use fxvault_engine::store::{MemoryStore, StagedStore, UndoLog};

use crate::chain::ChainReader;
use crate::reorg::ReorgDetector;

/// What polling one block produced.
#[derive(Debug)]
pub enum BlockOutcome {
    Notifications(Vec<Notification>),
    /// The chain diverged; indexing must resume at this block.
    Reorg(u64),
}

/// Block poller that fetches protocol and feed logs block by block and
/// drives them through the engine.
///
/// Each notification is applied to a staged view of the in-memory store, its
/// writes are committed to PostgreSQL in one transaction and only then
/// applied to memory. What those writes replaced is kept for the reorg
/// window so an orphaned block can be undone in both places.
pub struct BlockPoller<P> {
    provider: P,
    poll_interval: Duration,
    pool: PgPool,
    repository: EntityRepository,
    decoders: DecoderRegistry,
    processor: EventProcessor<ChainReader<P>>,
    store: MemoryStore,
    reorg_detector: ReorgDetector,
    reorg_window: u64,
    undo: UndoLog,
    /// Contracts whose logs are fetched: the protocol root and every feed.
    contract_addresses: Vec<Address>,
    /// Key of this poller's row in `indexer_state`.
    source: String,
    start_block: Option<u64>,
}

impl<P: Provider + Clone> BlockPoller<P> {
    pub fn new(
        provider: P,
        poll_interval_ms: u64,
        pool: PgPool,
        reorg_window: u64,
        processor: EventProcessor<ChainReader<P>>,
        store: MemoryStore,
    ) -> Self {
        let protocol = processor.propagator().root();
        Self {
            provider,
            poll_interval: Duration::from_millis(poll_interval_ms),
            repository: EntityRepository::new(pool.clone()),
            pool,
            decoders: DecoderRegistry::new(protocol),
            processor,
            store,
            reorg_detector: ReorgDetector::new(reorg_window as usize),
            reorg_window,
            undo: UndoLog::new(),
            contract_addresses: vec![protocol],
            source: format!("{:#x}", protocol),
            start_block: None,
        }
    }

    /// Set the contract addresses to filter logs by.
    pub fn with_contract_addresses(mut self, addresses: Vec<Address>) -> Self {
        tracing::info!(count = addresses.len(), "Watching contract logs");
        self.contract_addresses = addresses;
        self
    }

    /// Decode keeper pool and transformer logs too, for whichever of the two
    /// is deployed. Their addresses still need to be watched.
    pub fn with_optional_contracts(
        mut self,
        keeper_pool: Option<Address>,
        transformer: Option<Address>,
    ) -> Self {
        let protocol = self.processor.propagator().root();
        self.decoders = DecoderRegistry::new(protocol)
            .with_keeper_pool(keeper_pool)
            .with_transformer(transformer);
        self
    }

    /// Block to start from when no cursor is stored (default: latest).
    pub fn with_start_block(mut self, start_block: Option<u64>) -> Self {
        self.start_block = start_block;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Start the polling loop. Runs indefinitely until the task is cancelled.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut current_block = match self.get_last_indexed_block().await? {
            Some(last) => last + 1,
            None => match self.start_block {
                Some(start) => start,
                None => {
                    tracing::info!("No previous indexed block found, starting from latest");
                    self.provider.get_block_number().await?
                }
            },
        };

        tracing::info!(
            source = %self.source,
            start_block = current_block,
            entities = self.store.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Block poller started"
        );

        loop {
            match self.poll_block(current_block).await {
                Ok(BlockOutcome::Notifications(notifications)) => {
                    if !notifications.is_empty() {
                        tracing::info!(
                            block = current_block,
                            notifications = notifications.len(),
                            "Decoded notifications from block"
                        );
                        self.apply_notifications(&notifications).await?;
                    }
                    // Always update indexer state, even for blocks with no events
                    self.update_indexer_state(current_block).await?;
                    self.undo
                        .prune_below(current_block.saturating_sub(self.reorg_window));
                    current_block += 1;
                }
                Ok(BlockOutcome::Reorg(from_block)) => {
                    tracing::warn!(
                        reorg_at = from_block,
                        current = current_block,
                        "Reorg detected! Redelivering from divergence point."
                    );
                    self.rollback_from(from_block).await?;
                    current_block = from_block;
                    continue;
                }
                Err(e) => {
                    // Block might not exist yet, wait and retry
                    tracing::debug!(
                        block = current_block,
                        error = %e,
                        "Block not yet available, waiting..."
                    );
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            }

            // Brief sleep to avoid hammering the RPC when caught up
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Poll a single block: fetch it, check for reorg, fetch logs, decode them.
    async fn poll_block(&mut self, block_number: u64) -> anyhow::Result<BlockOutcome> {
        let block = self
            .provider
            .get_block_by_number(block_number.into())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Block {} not found", block_number))?;

        let block_hash = block.header.hash;
        let parent_hash = block.header.parent_hash;
        let block_timestamp = Utc
            .timestamp_opt(block.header.timestamp as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);

        if let Some(reorg_block) = self
            .reorg_detector
            .check_and_record(block_number, block_hash, parent_hash, &self.provider)
            .await?
        {
            return Ok(BlockOutcome::Reorg(reorg_block));
        }

        let filter = Filter::new()
            .from_block(block_number)
            .to_block(block_number)
            .address(self.contract_addresses.clone())
            .event_signature(self.decoders.all_signatures());

        let logs = self.provider.get_logs(&filter).await?;

        let mut notifications = Vec::new();
        for log in &logs {
            if let Some(mut notification) =
                self.decoders
                    .decode(&log.inner, block_number, block_timestamp)
            {
                notification.tx_hash = log
                    .transaction_hash
                    .map(|h| format!("{:#x}", h))
                    .unwrap_or_default();
                notification.log_index = log.log_index;
                notifications.push(notification);
            }
        }

        Ok(BlockOutcome::Notifications(notifications))
    }

    /// Run notifications through the engine in order, committing each one's
    /// writes before the next is processed.
    pub async fn apply_notifications(&mut self, notifications: &[Notification]) -> anyhow::Result<()> {
        for notification in notifications {
            let writes = {
                let mut staged = StagedStore::new(&self.store);
                self.processor.process(notification, &mut staged).await;
                staged.into_writes()
            };

            if writes.is_empty() {
                tracing::debug!(
                    tx_hash = %notification.tx_hash,
                    event = notification.event.name(),
                    "Notification changed nothing"
                );
                continue;
            }

            self.repository
                .persist(&writes, notification.block_number)
                .await?;
            self.undo
                .record(notification.block_number, &self.store, &writes);
            self.store.apply(writes);
        }
        Ok(())
    }

    /// Undo every write made by blocks at or above `from_block`, in
    /// PostgreSQL and in memory, and move the cursor back before it.
    ///
    /// Blocks older than the reorg window, or applied before a restart, are
    /// no longer recorded and stay as they are.
    pub async fn rollback_from(&mut self, from_block: u64) -> anyhow::Result<()> {
        let previous = self.undo.rollback_from(from_block);
        let cursor = from_block.saturating_sub(1);
        if !previous.is_empty() {
            self.repository.restore(&previous, cursor).await?;
            tracing::warn!(
                from_block,
                entities = previous.len(),
                "Rolled back orphaned writes"
            );
            self.store.restore(previous);
        }
        self.update_indexer_state(cursor).await?;
        Ok(())
    }

    /// Update the indexer's last processed block number.
    pub async fn update_indexer_state(&self, block_number: u64) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO indexer_state (source, last_block)
            VALUES ($1, $2)
            ON CONFLICT (source) DO UPDATE SET last_block = $2, updated_at = NOW()
            "#,
        )
        .bind(&self.source)
        .bind(block_number as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the last indexed block number from the database.
    pub async fn get_last_indexed_block(&self) -> anyhow::Result<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_block FROM indexer_state WHERE source = $1")
                .bind(&self.source)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(b,)| b as u64))
    }
}
