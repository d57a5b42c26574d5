use alloy::primitives::{B256, I256, Log, U256, keccak256};
use chrono::{DateTime, Utc};
use fxvault_common::types::{FeedId, Notification, ProtocolEvent};

use crate::EventDecoder;

/// Price aggregator decoder for
/// `AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 updatedAt)`.
///
/// The emitting contract is the feed. Whether the feed is one we track is
/// decided downstream by the feed table.
pub struct OracleDecoder {
    answer_updated: B256,
}

impl OracleDecoder {
    pub fn new() -> Self {
        Self {
            answer_updated: keccak256("AnswerUpdated(int256,uint256,uint256)"),
        }
    }
}

impl Default for OracleDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder for OracleDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![self.answer_updated]
    }

    fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification> {
        if *log.topics().first()? != self.answer_updated {
            return None;
        }

        let answer = I256::from_raw(U256::from_be_bytes(log.topics().get(1)?.0));
        let round_id = U256::from_be_bytes(log.topics().get(2)?.0);
        let data = log.data.data.as_ref();
        if data.len() < 32 {
            tracing::warn!(feed = %log.address, "AnswerUpdated without updatedAt, skipping");
            return None;
        }
        let updated_at: u64 = U256::from_be_slice(&data[..32]).saturating_to();

        Some(Notification {
            tx_hash: String::new(),
            log_index: None,
            block_number,
            block_timestamp,
            emitter: log.address,
            event: ProtocolEvent::AnswerUpdated {
                feed: FeedId(log.address),
                answer,
                round_id,
                updated_at,
            },
        })
    }

    fn name(&self) -> &'static str {
        "Oracle"
    }
}
