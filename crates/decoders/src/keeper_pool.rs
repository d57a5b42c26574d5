use alloy::primitives::{Address, B256, Log, U256, keccak256};
use chrono::{DateTime, Utc};
use fxvault_common::types::{Notification, ProtocolEvent, TokenId};

use crate::EventDecoder;
use crate::handle::topic_address;

/// Keeper pool decoder.
///
/// Handles:
/// - `Stake(address indexed account, address indexed fxToken, uint256 amount)`
/// - `Unstake(address indexed account, address indexed fxToken, uint256 amount)`
/// - `Withdraw(address indexed account, address indexed fxToken)`
/// - `Liquidate(address indexed account, address indexed fxToken, uint256 amount)`
pub struct KeeperPoolDecoder {
    pool: Address,
    stake: B256,
    unstake: B256,
    withdraw: B256,
    liquidate: B256,
}

impl KeeperPoolDecoder {
    pub fn new(pool: Address) -> Self {
        Self {
            pool,
            stake: keccak256("Stake(address,address,uint256)"),
            unstake: keccak256("Unstake(address,address,uint256)"),
            withdraw: keccak256("Withdraw(address,address)"),
            liquidate: keccak256("Liquidate(address,address,uint256)"),
        }
    }
}

fn amount(log: &Log) -> Option<U256> {
    log.data.data.get(..32).map(U256::from_be_slice)
}

impl EventDecoder for KeeperPoolDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![self.stake, self.unstake, self.withdraw, self.liquidate]
    }

    fn decode(
        &self,
        log: &Log,
        block_number: u64,
        block_timestamp: DateTime<Utc>,
    ) -> Option<Notification> {
        if log.address != self.pool {
            return None;
        }
        let topic0 = log.topics().first()?;
        let account = topic_address(log, 1)?;
        let synthetic_token = TokenId(topic_address(log, 2)?);

        let event = if *topic0 == self.stake {
            ProtocolEvent::KeeperPoolStaked {
                pool: self.pool,
                account,
                synthetic_token,
                amount: amount(log)?,
            }
        } else if *topic0 == self.unstake {
            ProtocolEvent::KeeperPoolUnstaked {
                pool: self.pool,
                account,
                synthetic_token,
                amount: amount(log)?,
            }
        } else if *topic0 == self.withdraw {
            ProtocolEvent::KeeperPoolWithdrawn {
                pool: self.pool,
                account,
                synthetic_token,
            }
        } else if *topic0 == self.liquidate {
            ProtocolEvent::KeeperPoolLiquidated {
                pool: self.pool,
                account,
                synthetic_token,
            }
        } else {
            return None;
        };

        Some(Notification {
            tx_hash: String::new(),
            log_index: None,
            block_number,
            block_timestamp,
            emitter: log.address,
            event,
        })
    }

    fn name(&self) -> &'static str {
        "KeeperPool"
    }
}
