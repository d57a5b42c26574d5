use alloy::primitives::{Address, B256, Log, U256, keccak256};
use chrono::{DateTime, Utc};
use fxvault_common::types::{Notification, ProtocolEvent, TokenId};

use crate::EventDecoder;
use crate::handle::topic_address;

/// Decoder for the transformer's
/// `Transform(address indexed account, address indexed tokenIn, address indexed tokenOut, uint256 amountIn, uint256 amountOut)`.
pub struct TransformerDecoder {
    transformer: Address,
    transform: B256,
}

impl TransformerDecoder {
    pub fn new(transformer: Address) -> Self {
        Self {
            transformer,
            transform: keccak256("Transform(address,address,address,uint256,uint256)"),
        }
    }
}

impl EventDecoder for TransformerDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![self.transform]
    }

    fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification> {
        if log.address != self.transformer || *log.topics().first()? != self.transform {
            return None;
        }

        let data = log.data.data.as_ref();
        if data.len() < 64 {
            tracing::warn!(transformer = %log.address, "Transform without amounts, skipping");
            return None;
        }

        Some(Notification {
            tx_hash: String::new(),
            log_index: None,
            block_number,
            block_timestamp,
            emitter: log.address,
            event: ProtocolEvent::Transformed {
                account: topic_address(log, 1)?,
                token_in: TokenId(topic_address(log, 2)?),
                token_out: TokenId(topic_address(log, 3)?),
                amount_in: U256::from_be_slice(&data[..32]),
                amount_out: U256::from_be_slice(&data[32..64]),
            },
        })
    }

    fn name(&self) -> &'static str {
        "Transformer"
    }
}
