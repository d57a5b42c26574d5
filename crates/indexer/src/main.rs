use alloy::providers::ProviderBuilder;

use fxvault_common::config::AppConfig;
use fxvault_common::db;
use fxvault_common::repository::EntityRepository;
use fxvault_engine::feeds::FeedTable;
use fxvault_engine::handlers::EventProcessor;
use fxvault_engine::propagator::PricePropagator;
use fxvault_engine::store::MemoryStore;
use fxvault_indexer::chain::ChainReader;
use fxvault_indexer::poller::BlockPoller;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fxvault_indexer=info,fxvault_engine=info,fxvault_decoders=debug".into()
            }),
        )
        .json()
        .init();

    tracing::info!("fxvault indexer starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Warm the in-memory store from the last committed state
    let store: MemoryStore = EntityRepository::new(pool.clone())
        .load_all()
        .await?
        .into_iter()
        .collect();
    tracing::info!(entities = store.len(), "Entity store loaded");

    let provider = ProviderBuilder::new().connect_http(config.rpc_url.parse()?);
    let propagator = PricePropagator::new(
        config.protocol_address,
        FeedTable::from_config(&config.feeds),
    );
    let processor = EventProcessor::new(
        ChainReader::new(provider.clone(), config.protocol_address),
        propagator,
    );

    let mut poller = BlockPoller::new(
        provider,
        config.indexer_poll_interval_ms,
        pool,
        config.indexer_reorg_window,
        processor,
        store,
    )
    .with_contract_addresses(config.watched_addresses())
    .with_optional_contracts(config.keeper_pool_address, config.transformer_address)
    .with_start_block(config.indexer_start_block);

    tracing::info!(
        protocol = %config.protocol_address,
        feeds = config.feeds.feeds.len() + 1,
        keeper_pool = ?config.keeper_pool_address,
        transformer = ?config.transformer_address,
        "Starting block poller"
    );

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = poller.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Block poller exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("fxvault indexer stopped.");
    Ok(())
}
