use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use primitive_types::U256;

use crate::consensus::pow::{block_preimage, double_hash, hash_below_target, u256_to_bytes};

/// Nonces tried between two looks at the cancellation flag.
pub const CANCEL_CHECK_INTERVAL: u64 = 4_096;

/// Write-once flag shared between the coordinator and one search.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    Found { nonce: u64, hash: [u8; 32] },
    /// Every nonce up to u64::MAX failed.
    Exhausted,
    Cancelled,
}

/// Returns the smallest nonce whose block hash is below `target`.
///
/// Nonces are scanned in ascending order; the flag is checked every
/// `CANCEL_CHECK_INTERVAL` attempts and once more before a hit is reported.
pub fn find_nonce(
    block_hash: &U256,
    coinbase: &[u8],
    target: &U256,
    cancel: &CancelToken,
) -> SearchOutcome {
    let target = u256_to_bytes(target);
    let mut preimage = block_preimage(block_hash, 0, coinbase);

    let mut nonce: u64 = 0;
    loop {
        if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return SearchOutcome::Cancelled;
        }

        preimage[32..40].copy_from_slice(&nonce.to_be_bytes());
        let hash = double_hash(&preimage);
        if hash_below_target(&hash, &target) {
            if cancel.is_cancelled() {
                return SearchOutcome::Cancelled;
            }
            return SearchOutcome::Found { nonce, hash };
        }

        if nonce == u64::MAX {
            return SearchOutcome::Exhausted;
        }
        nonce += 1;
    }
}
