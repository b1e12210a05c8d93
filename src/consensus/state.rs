use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::events::ChainEvent;
use super::pow::{
    block_subsidy, calculate_next_work_required, candidate_hash, hash_below_target,
    u256_from_bytes, u256_to_bytes,
};
use super::{
    ASSET_NAME, ASSET_UNIT_NAME, BOOTSTRAP_GROUP_SIZE, DECIMALS, DIFFICULTY_ADJUSTMENT_INTERVAL,
    GENESIS_BLOCK_HASH, GENESIS_BLOCK_HEIGHT, MAX_MONEY, MIN_SEED_AMOUNT, POW_LIMIT,
};
use crate::error::ConsensusError;

/// Durable state of one emulated chain. Only `bootstrap` and `mine` produce a
/// successor; neither mutates `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub block_height: u64,
    /// Hash of the current tip; the next block builds on it.
    pub block_hash: U256,
    /// Miner-supplied tag of the latest block.
    #[serde(with = "hex_bytes")]
    pub coinbase: Vec<u8>,
    pub prev_retarget_time: u64,
    pub time: u64,
    pub target: U256,
    /// Reward asset, set once by `bootstrap`.
    pub asset_id: Option<u64>,
    pub creator: String,
}

/// A native payment submitted in the same group as a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
}

/// What the execution environment knows about the call being applied.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub sender: &'a str,
    pub app_address: &'a str,
    pub group_size: usize,
    /// Ledger timestamp (seconds) of the round the call executes in.
    pub now: u64,
}

/// Parameters of the asset created at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetParams {
    pub name: String,
    pub unit_name: String,
    pub total: u64,
    pub decimals: u32,
    pub manager: String,
    pub reserve: String,
}

#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub state: ChainState,
    pub asset_id: u64,
    pub asset: AssetParams,
}

#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub state: ChainState,
    /// Amount of the reward asset owed to the sender.
    pub reward: u64,
    pub events: Vec<ChainEvent>,
}

impl ChainState {
    /// State of a freshly created application.
    pub fn genesis(creator: impl Into<String>) -> Self {
        Self {
            block_height: GENESIS_BLOCK_HEIGHT,
            block_hash: GENESIS_BLOCK_HASH,
            coinbase: Vec::new(),
            prev_retarget_time: 0,
            time: 0,
            target: POW_LIMIT,
            asset_id: None,
            creator: creator.into(),
        }
    }

    pub fn is_bootstrapped(&self) -> bool {
        matches!(self.asset_id, Some(id) if id != 0)
    }

    /// Creates the reward asset and starts the clock. Only the creator may
    /// call it, once, grouped with a seed payment to the application.
    pub fn bootstrap(
        &self,
        ctx: &CallContext<'_>,
        seed: &Payment,
        asset_id: u64,
    ) -> Result<Bootstrapped, ConsensusError> {
        if self.is_bootstrapped() {
            return Err(ConsensusError::AlreadyBootstrapped);
        }
        if ctx.sender != self.creator {
            return Err(ConsensusError::NotCreator);
        }
        if seed.receiver != ctx.app_address {
            return Err(ConsensusError::WrongReceiver);
        }
        if ctx.group_size != BOOTSTRAP_GROUP_SIZE {
            return Err(ConsensusError::GroupSize {
                expected: BOOTSTRAP_GROUP_SIZE,
                actual: ctx.group_size,
            });
        }
        if seed.amount < MIN_SEED_AMOUNT {
            return Err(ConsensusError::SeedTooSmall {
                amount: seed.amount,
                minimum: MIN_SEED_AMOUNT,
            });
        }
        if asset_id == 0 {
            return Err(ConsensusError::InvalidAssetId);
        }

        let mut state = self.clone();
        state.asset_id = Some(asset_id);
        state.prev_retarget_time = ctx.now;
        state.time = ctx.now;

        Ok(Bootstrapped {
            state,
            asset_id,
            asset: AssetParams {
                name: ASSET_NAME.to_string(),
                unit_name: ASSET_UNIT_NAME.to_string(),
                total: MAX_MONEY,
                decimals: DECIMALS,
                manager: ctx.app_address.to_string(),
                reserve: ctx.app_address.to_string(),
            },
        })
    }

    /// Appends a block if `dhash(block_hash ∥ nonce ∥ coinbase)` is below the
    /// target, retargeting on interval boundaries.
    pub fn mine(
        &self,
        ctx: &CallContext<'_>,
        nonce: u64,
        coinbase: &[u8],
    ) -> Result<MinedBlock, ConsensusError> {
        if !self.is_bootstrapped() {
            return Err(ConsensusError::NotBootstrapped);
        }

        let candidate = candidate_hash(&self.block_hash, nonce, coinbase);
        if !hash_below_target(&candidate, &u256_to_bytes(&self.target)) {
            return Err(ConsensusError::InvalidBlock);
        }

        let mut next = self.clone();
        next.block_height += 1;
        next.block_hash = u256_from_bytes(&candidate);
        next.coinbase = coinbase.to_vec();
        next.time = ctx.now;

        let mut events = Vec::with_capacity(2);
        if next.should_adjust_difficulty() {
            let new_target =
                calculate_next_work_required(&next.target, next.time, next.prev_retarget_time);
            events.push(ChainEvent::Retargeted {
                retargeted_at: ctx.now,
                prev_retarget_time: next.prev_retarget_time,
                prev_target: next.target,
                new_target,
            });
            next.prev_retarget_time = ctx.now;
            next.target = new_target;
        }

        let reward = block_subsidy(next.block_height);
        events.push(ChainEvent::Rewarded {
            miner: ctx.sender.to_string(),
            reward,
        });

        Ok(MinedBlock {
            state: next,
            reward,
            events,
        })
    }

    fn should_adjust_difficulty(&self) -> bool {
        self.block_height % DIFFICULTY_ADJUSTMENT_INTERVAL == 0
    }
}

/// Serde helper: byte vectors as lowercase hex strings.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
