pub mod handle;
pub mod keeper_pool;
pub mod oracle;
pub mod transformer;


use alloy::primitives::{Address, B256, Log};
use chrono::{DateTime, Utc};
use fxvault_common::types::Notification;

/// Trait that all contract-specific decoders must implement.
pub trait EventDecoder: Send + Sync {
    /// Returns the event topic signatures this decoder handles.
    fn event_signatures(&self) -> Vec<B256>;

    /// Attempt to decode a raw log entry into a `Notification`.
    /// Returns `None` if this decoder doesn't handle the log.
    fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification>;

    /// Human-readable name for this decoder.
    fn name(&self) -> &'static str;
}

/// Registry of all available decoders, used by the indexer's event router.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn EventDecoder>>,
}

impl DecoderRegistry {
    /// Decoders for the protocol contract at `protocol` and for price feeds.
    pub fn new(protocol: Address) -> Self {
        Self {
            decoders: vec![
                Box::new(handle::HandleDecoder::new(protocol)),
                Box::new(oracle::OracleDecoder::new()),
            ],
        }
    }

    /// Also decode the keeper pool at `pool`, if one is deployed.
    pub fn with_keeper_pool(mut self, pool: Option<Address>) -> Self {
        if let Some(address) = pool {
            self.decoders
                .push(Box::new(keeper_pool::KeeperPoolDecoder::new(address)));
        }
        self
    }

    /// Also decode conversions made through the transformer at `transformer`.
    pub fn with_transformer(mut self, transformer: Option<Address>) -> Self {
        if let Some(address) = transformer {
            self.decoders
                .push(Box::new(transformer::TransformerDecoder::new(address)));
        }
        self
    }

    /// Try to decode a log using all registered decoders.
    /// Returns the first successful decode, or `None`.
    pub fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification> {
        for decoder in &self.decoders {
            if let Some(notification) = decoder.decode(log, block_number, block_timestamp) {
                tracing::debug!(
                    decoder = decoder.name(),
                    event = notification.event.name(),
                    "Decoded event"
                );
                return Some(notification);
            }
        }
        None
    }

    /// Get all event signatures across all registered decoders, without
    /// duplicates. Used as the topic0 filter for log queries.
    pub fn all_signatures(&self) -> Vec<B256> {
        let mut signatures: Vec<B256> = Vec::new();
        for signature in self.decoders.iter().flat_map(|d| d.event_signatures()) {
            if !signatures.contains(&signature) {
                signatures.push(signature);
            }
        }
        signatures
    }
}
