use alloy::primitives::{Address, B256, Log, keccak256};
use chrono::{DateTime, Utc};
use fxvault_common::types::{Notification, ProtocolEvent, TokenId, TokenKind};

use crate::EventDecoder;

/// Protocol contract event decoder.
///
/// Handles:
/// - `UpdateDebt(address indexed account, address indexed fxToken)`
/// - `UpdateCollateral(address indexed account, address indexed fxToken, address indexed collateralToken)`
/// - `ConfigureFxToken(address indexed fxToken)`
/// - `ConfigureCollateralToken(address indexed collateralToken)`
///
/// Only logs emitted by the configured protocol address are accepted.
pub struct HandleDecoder {
    protocol: Address,
    update_debt: B256,
    update_collateral: B256,
    configure_fx_token: B256,
    configure_collateral_token: B256,
}

impl HandleDecoder {
    pub fn new(protocol: Address) -> Self {
        Self {
            protocol,
            update_debt: keccak256("UpdateDebt(address,address)"),
            update_collateral: keccak256("UpdateCollateral(address,address,address)"),
            configure_fx_token: keccak256("ConfigureFxToken(address)"),
            configure_collateral_token: keccak256("ConfigureCollateralToken(address)"),
        }
    }
}

/// Indexed `address` parameter: the low 20 bytes of the topic.
pub(crate) fn topic_address(log: &Log, index: usize) -> Option<Address> {
    log.topics()
        .get(index)
        .map(|topic| Address::from_slice(&topic.as_slice()[12..32]))
}

impl EventDecoder for HandleDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![
            self.update_debt,
            self.update_collateral,
            self.configure_fx_token,
            self.configure_collateral_token,
        ]
    }

    fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification> {
        if log.address != self.protocol {
            return None;
        }
        let topic0 = log.topics().first()?;

        let event = if *topic0 == self.update_debt {
            ProtocolEvent::DebtUpdated {
                account: topic_address(log, 1)?,
                synthetic_token: TokenId(topic_address(log, 2)?),
            }
        } else if *topic0 == self.update_collateral {
            ProtocolEvent::CollateralUpdated {
                account: topic_address(log, 1)?,
                synthetic_token: TokenId(topic_address(log, 2)?),
                collateral_token: TokenId(topic_address(log, 3)?),
            }
        } else if *topic0 == self.configure_fx_token {
            ProtocolEvent::TokenConfigured {
                token: TokenId(topic_address(log, 1)?),
                kind: TokenKind::Synthetic,
            }
        } else if *topic0 == self.configure_collateral_token {
            ProtocolEvent::TokenConfigured {
                token: TokenId(topic_address(log, 1)?),
                kind: TokenKind::Collateral,
            }
        } else {
            return None;
        };

        Some(Notification {
            tx_hash: String::new(),
            log_index: None, // Set by caller
            block_number,
            block_timestamp,
            emitter: log.address,
            event,
        })
    }

    fn name(&self) -> &'static str {
        "Handle"
    }
}
