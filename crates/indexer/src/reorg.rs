use std::collections::VecDeque;

use alloy::primitives::B256;
use alloy::providers::Provider;

/// Sliding-window reorg detector.
///
/// Maintains a window of recent `(block_number, block_hash)` pairs.
/// On each new block, checks whether the parent hash matches the expected chain.
/// If a mismatch is found, returns the block number where the reorg occurred
/// so the poller can redeliver from there.
pub struct ReorgDetector {
    /// Recent block hashes: (block_number, block_hash)
    window: VecDeque<(u64, B256)>,
    /// Maximum window size
    max_size: usize,
}

impl ReorgDetector {
    pub fn new(max_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(max_size),
            max_size: max_size.max(1),
        }
    }

    /// Check the new block against the window and record it.
    /// Returns `Some(reorg_block_number)`, the earliest block that diverged,
    /// without recording anything when the parent hash does not match.
    pub async fn check_and_record(
        &mut self,
        block_number: u64,
        block_hash: B256,
        parent_hash: B256,
        provider: &impl Provider,
    ) -> anyhow::Result<Option<u64>> {
        if let Some(expected) = self.conflicting_parent(block_number, parent_hash) {
            tracing::warn!(
                block_number,
                expected = %expected,
                actual = %parent_hash,
                "Reorg detected: parent hash mismatch"
            );

            let reorg_start = self.find_divergence_point(provider).await?;
            self.truncate_from(reorg_start);
            return Ok(Some(reorg_start));
        }

        self.record(block_number, block_hash);
        Ok(None)
    }

    /// Recorded hash of `block_number - 1` when it differs from `parent_hash`.
    pub fn conflicting_parent(&self, block_number: u64, parent_hash: B256) -> Option<B256> {
        let parent = block_number.checked_sub(1)?;
        self.window
            .iter()
            .find(|(num, _)| *num == parent)
            .map(|(_, hash)| *hash)
            .filter(|hash| *hash != parent_hash)
    }

    /// Record a canonical block, evicting the oldest entry past capacity.
    /// Re-recording a block number replaces its hash.
    pub fn record(&mut self, block_number: u64, block_hash: B256) {
        self.truncate_from(block_number);
        self.window.push_back((block_number, block_hash));
        if self.window.len() > self.max_size {
            self.window.pop_front();
        }
    }

    /// Forget every block at or above `block_number`.
    pub fn truncate_from(&mut self, block_number: u64) {
        self.window.retain(|(num, _)| *num < block_number);
    }

    /// Walk back through the window to find the earliest block where the hash diverges.
    async fn find_divergence_point(&self, provider: &impl Provider) -> anyhow::Result<u64> {
        for (block_number, expected_hash) in self.window.iter().rev() {
            let block = provider.get_block_by_number((*block_number).into()).await?;

            match block {
                Some(b) if b.header.hash == *expected_hash => {
                    // This block is still canonical; reorg starts after it
                    return Ok(*block_number + 1);
                }
                _ => continue,
            }
        }

        // Deeper than the window: replay from the oldest block we know about.
        Ok(self.window.front().map(|(num, _)| *num).unwrap_or(0))
    }

    /// Current window size (number of tracked blocks).
    pub fn window_size(&self) -> usize {
        self.window.len()
    }
}
