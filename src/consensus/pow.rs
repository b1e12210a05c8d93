use primitive_types::{U256, U512};
use sha2::{Digest, Sha256};

use super::{
    LARGEST_TIMESPAN, POW_LIMIT, POW_TARGET_TIMESPAN, SMALLEST_TIMESPAN, SUBSIDY,
    SUBSIDY_HALVING_INTERVAL,
};

/// Bitcoin's double SHA-256: SHA256(SHA256(data)).
#[inline]
pub fn double_hash(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Big-endian 32-byte encoding of a 256-bit value.
pub fn u256_to_bytes(value: &U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

/// Reads a big-endian 32-byte digest as an unsigned integer.
pub fn u256_from_bytes(bytes: &[u8; 32]) -> U256 {
    U256::from_big_endian(bytes)
}

/// `block_hash ∥ be64(nonce) ∥ coinbase`, the input hashed by miners and validators.
pub fn block_preimage(block_hash: &U256, nonce: u64, coinbase: &[u8]) -> Vec<u8> {
    let mut preimage = Vec::with_capacity(32 + 8 + coinbase.len());
    preimage.extend_from_slice(&u256_to_bytes(block_hash));
    preimage.extend_from_slice(&nonce.to_be_bytes());
    preimage.extend_from_slice(coinbase);
    preimage
}

/// Candidate hash for the next block on top of `block_hash`.
pub fn candidate_hash(block_hash: &U256, nonce: u64, coinbase: &[u8]) -> [u8; 32] {
    double_hash(&block_preimage(block_hash, nonce, coinbase))
}

/// True iff `hash`, read big-endian, is strictly below `target`.
///
/// Equal-length big-endian arrays order the same way as the numbers they encode,
/// so this is a plain byte comparison.
#[inline]
pub fn hash_below_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    hash < target
}

pub fn clamp(value: u64, lower_bound: u64, upper_bound: u64) -> u64 {
    value.max(lower_bound).min(upper_bound)
}

/// Next PoW target after a retarget window.
///
/// The elapsed time is clamped to [TIMESPAN/4, TIMESPAN*4], turned into a
/// 1000-scaled factor, and the target is multiplied before it is divided.
/// Both truncations are part of consensus.
pub fn calculate_next_work_required(target: &U256, time: u64, prev_retarget_time: u64) -> U256 {
    let timespan = clamp(
        time.saturating_sub(prev_retarget_time),
        SMALLEST_TIMESPAN,
        LARGEST_TIMESPAN,
    );
    let scaled = timespan * 1000 / POW_TARGET_TIMESPAN;

    // target < 2^256 and scaled <= 4000, so the product needs 512 bits.
    let new_target = target.full_mul(U256::from(scaled)) / U512::from(1000u64);
    if new_target >= U512::from(POW_LIMIT) {
        return POW_LIMIT;
    }
    // A zero target would make every block invalid.
    U256::try_from(new_target).unwrap_or(POW_LIMIT).max(U256::one())
}

/// Reward for the block at `height`: SUBSIDY halved once per interval, zero
/// once the shift would be undefined.
pub fn block_subsidy(height: u64) -> u64 {
    let halvings = height / SUBSIDY_HALVING_INTERVAL;
    if halvings >= 64 {
        return 0;
    }
    SUBSIDY >> halvings
}
