use std::str::FromStr;

use alloy::primitives::Address;

use crate::error::AppError;
use crate::types::{FeedId, TokenId};

/// Price feed wiring, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Feed quoting the reference asset itself.
    pub anchor: FeedId,
    /// Each remaining feed and the token it prices.
    pub feeds: Vec<(FeedId, TokenId)>,
    /// Token that is the reference asset (its rate is always ONE).
    pub reference_token: Option<TokenId>,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// EVM JSON-RPC endpoint
    pub rpc_url: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 10)
    pub db_max_connections: u32,

    /// Block polling interval in milliseconds (default: 2000)
    pub indexer_poll_interval_ms: u64,

    /// Number of recent block hashes to track for reorg detection
    pub indexer_reorg_window: u64,

    /// First block to index when no cursor is stored
    pub indexer_start_block: Option<u64>,

    /// Protocol root contract: emits vault/configuration events and keys the token registry
    pub protocol_address: Address,

    pub feeds: FeedConfig,

    /// Keeper pool contract, if its pools are indexed
    pub keeper_pool_address: Option<Address>,

    /// Synthetic token transformer, if transforms are indexed
    pub transformer_address: Option<Address>,

    /// Port of the read API
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let protocol_address = required_address("PROTOCOL_ADDRESS")?;
        let anchor = FeedId(required_address("ANCHOR_FEED")?);
        let feeds = parse_price_feeds(&std::env::var("PRICE_FEEDS").unwrap_or_default())?;
        let reference_token = optional_address("REFERENCE_TOKEN")?.map(TokenId);

        Ok(Self {
            rpc_url: std::env::var("RPC_URL")
                .unwrap_or_else(|_| "https://arb1.arbitrum.io/rpc".to_string()),
            database_url: std::env::var("DATABASE_URL").map_err(|_| {
                AppError::Config("DATABASE_URL environment variable is required".to_string())
            })?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", "10")?,
            indexer_poll_interval_ms: parsed("INDEXER_POLL_INTERVAL_MS", "2000")?,
            indexer_reorg_window: parsed("INDEXER_REORG_WINDOW", "12")?,
            indexer_start_block: match std::env::var("INDEXER_START_BLOCK") {
                Ok(value) => Some(parse_number("INDEXER_START_BLOCK", &value)?),
                Err(_) => None,
            },
            protocol_address,
            feeds: FeedConfig {
                anchor,
                feeds,
                reference_token,
            },
            keeper_pool_address: optional_address("KEEPER_POOL_ADDRESS")?,
            transformer_address: optional_address("TRANSFORMER_ADDRESS")?,
            api_port: parsed("API_PORT", "3000")?,
        })
    }

    /// Every contract whose logs the indexer needs.
    pub fn watched_addresses(&self) -> Vec<Address> {
        let mut addresses = vec![self.protocol_address, self.feeds.anchor.0];
        addresses.extend(self.feeds.feeds.iter().map(|(feed, _)| feed.0));
        addresses.extend(self.keeper_pool_address);
        addresses.extend(self.transformer_address);
        addresses
    }
}

fn parsed<T: FromStr>(name: &str, default: &str) -> Result<T, AppError> {
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    parse_number(name, &value)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, AppError> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "{} must be a valid {}: {}",
            name,
            std::any::type_name::<T>(),
            value
        ))
    })
}

fn required_address(name: &str) -> Result<Address, AppError> {
    let value = std::env::var(name)
        .map_err(|_| AppError::Config(format!("{} environment variable is required", name)))?;
    parse_address(name, &value)
}

fn optional_address(name: &str) -> Result<Option<Address>, AppError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => parse_address(name, &value).map(Some),
        _ => Ok(None),
    }
}

fn parse_address(name: &str, value: &str) -> Result<Address, AppError> {
    Address::from_str(value.trim()).map_err(|e| {
        AppError::Config(format!("{} is not a valid address ({}): {}", name, value, e))
    })
}

/// Parse `feed=token,feed=token` into feed/token pairs.
pub fn parse_price_feeds(value: &str) -> Result<Vec<(FeedId, TokenId)>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (feed, token) = entry.split_once('=').ok_or_else(|| {
                AppError::Config(format!("PRICE_FEEDS entry must be feed=token: {}", entry))
            })?;
            Ok((
                FeedId(parse_address("PRICE_FEEDS", feed)?),
                TokenId(parse_address("PRICE_FEEDS", token)?),
            ))
        })
        .collect()
}
