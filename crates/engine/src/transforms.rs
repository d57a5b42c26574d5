//! Change log of synthetic token conversions.

use std::str::FromStr;

use alloy::primitives::B256;

use fxvault_common::types::{Notification, ProtocolEvent, Transform, TransformId};

use crate::store::EntityStore;

pub struct TransformLog;

impl TransformLog {
    /// Store the transform carried by `notification`, keyed by its
    /// transaction hash. `None` for other events or an unparseable hash.
    pub fn record<S: EntityStore + ?Sized>(
        store: &mut S,
        notification: &Notification,
    ) -> Option<Transform> {
        let ProtocolEvent::Transformed {
            account,
            token_in,
            token_out,
            amount_in,
            amount_out,
        } = &notification.event
        else {
            return None;
        };

        let Ok(tx_hash) = B256::from_str(&notification.tx_hash) else {
            tracing::warn!(tx_hash = %notification.tx_hash, "Transform without a transaction hash, skipping");
            return None;
        };

        let transform = Transform {
            id: TransformId(tx_hash),
            account: *account,
            token_in: *token_in,
            token_out: *token_out,
            amount_in: *amount_in,
            amount_out: *amount_out,
            timestamp: notification.block_timestamp.timestamp().max(0) as u64,
            block_number: notification.block_number,
        };
        store.save(transform.clone().into());
        Some(transform)
    }
}
