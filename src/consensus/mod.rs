pub mod events;
pub mod pow;
pub mod state;

use primitive_types::U256;

pub use events::ChainEvent;
pub use pow::{block_subsidy, calculate_next_work_required, clamp, double_hash};
pub use state::{AssetParams, Bootstrapped, CallContext, ChainState, MinedBlock, Payment};

/// Decimal places of the reward asset.
pub const DECIMALS: u32 = 8;

/// Minor units in one coin (10^DECIMALS).
pub const COIN: u64 = 100_000_000;

/// Total supply of the reward asset.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

pub const GENESIS_BLOCK_HEIGHT: u64 = 0;

/// 0x000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f
pub const GENESIS_BLOCK_HASH: U256 = U256([
    0x72B3_F1B6_0A8C_E26F,
    0x4FF7_63AE_46A2_A6C1,
    0x9C08_5AE1_6583_1E93,
    0x0000_0000_0019_D668,
]);

pub const SUBSIDY_HALVING_INTERVAL: u64 = 210_000;

/// Reward for the first halving era.
pub const SUBSIDY: u64 = 50 * COIN;

/// Easiest allowed target, 0x003fff..ff. Kept high so blocks are cheap to find.
pub const POW_LIMIT: U256 = U256([
    u64::MAX,
    u64::MAX,
    u64::MAX,
    0x003F_FFFF_FFFF_FFFF,
]);

/// One hour between retargets.
pub const POW_TARGET_TIMESPAN: u64 = 60 * 60;

/// One block every 10 seconds.
pub const POW_TARGET_SPACING: u64 = 10;

pub const SMALLEST_TIMESPAN: u64 = POW_TARGET_TIMESPAN / 4;
pub const LARGEST_TIMESPAN: u64 = POW_TARGET_TIMESPAN * 4;

/// Retarget every 360 blocks.
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = POW_TARGET_TIMESPAN / POW_TARGET_SPACING;

/// Minimum seed payment (minor native units) accepted by `bootstrap`.
pub const MIN_SEED_AMOUNT: u64 = 300_000;

/// Number of operations in a bootstrap group: the seed payment and the call.
pub const BOOTSTRAP_GROUP_SIZE: usize = 2;

pub const ASSET_NAME: &str = "EMU";
pub const ASSET_UNIT_NAME: &str = "EMUSHIS";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_constants() {
        assert_eq!(MAX_MONEY, 2_100_000_000_000_000);
        assert_eq!(SUBSIDY, 5_000_000_000);
        assert_eq!(SMALLEST_TIMESPAN, 900);
        assert_eq!(LARGEST_TIMESPAN, 14_400);
        assert_eq!(DIFFICULTY_ADJUSTMENT_INTERVAL, 360);
    }

    #[test]
    fn fixed_256_bit_constants_match_their_hex() {
        let mut bytes = [0u8; 32];
        GENESIS_BLOCK_HASH.to_big_endian(&mut bytes);
        assert_eq!(
            hex::encode(bytes),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );

        POW_LIMIT.to_big_endian(&mut bytes);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x3f);
        assert!(bytes[2..].iter().all(|b| *b == 0xff));
        assert_eq!(POW_LIMIT.bits(), 246);
    }
}
