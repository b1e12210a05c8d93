use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::pow::u256_to_bytes;

/// ASCII unit separator placed between log fields.
pub const FIELD_SEPARATOR: u8 = 0x1F;

/// Records emitted by an accepted `mine` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// Emitted on blocks whose height is a multiple of the adjustment interval.
    Retargeted {
        retargeted_at: u64,
        prev_retarget_time: u64,
        prev_target: U256,
        new_target: U256,
    },
    /// Emitted on every accepted block.
    Rewarded { miner: String, reward: u64 },
}

/// One value in a log record.
enum Field<'a> {
    Text(&'a str),
    Uint(u64),
    BigUint(&'a U256),
    Bytes(Vec<u8>),
}

impl Field<'_> {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Field::Text(s) => out.extend_from_slice(s.as_bytes()),
            Field::Uint(n) => out.extend_from_slice(&n.to_be_bytes()),
            Field::BigUint(n) => out.extend_from_slice(&u256_to_bytes(n)),
            Field::Bytes(b) => out.extend_from_slice(b),
        }
    }
}

impl ChainEvent {
    /// Byte layout written to the application log: key/value pairs joined by 0x1F.
    pub fn encode(&self) -> Vec<u8> {
        let fields = match self {
            ChainEvent::Retargeted {
                retargeted_at,
                prev_retarget_time,
                prev_target,
                new_target,
            } => vec![
                Field::Text("retargeted_at"),
                Field::Uint(*retargeted_at),
                Field::Text("prev_retarget_time"),
                Field::Uint(*prev_retarget_time),
                Field::Text("prev_target"),
                Field::BigUint(prev_target),
                Field::Text("new_target"),
                Field::BigUint(new_target),
            ],
            ChainEvent::Rewarded { miner, reward } => vec![
                Field::Text("miner"),
                Field::Bytes(address_bytes(miner)),
                Field::Text("reward"),
                Field::Uint(*reward),
            ],
        };

        let mut out = Vec::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push(FIELD_SEPARATOR);
            }
            field.write_to(&mut out);
        }
        out
    }
}

/// Raw bytes behind a hex address; anything else is logged as its UTF-8 text.
fn address_bytes(address: &str) -> Vec<u8> {
    hex::decode(address).unwrap_or_else(|_| address.as_bytes().to_vec())
}
