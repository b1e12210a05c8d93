use thiserror::Error;

/// Reasons a `bootstrap` or `mine` call is rejected by the state machine.
/// A rejected call leaves the chain state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("Application has already been bootstrapped")]
    AlreadyBootstrapped,

    #[error("Application not bootstrapped")]
    NotBootstrapped,

    #[error("Only the creator may call this method")]
    NotCreator,

    #[error("Receiver must be app address")]
    WrongReceiver,

    #[error("Group size must be {expected}, got {actual}")]
    GroupSize { expected: usize, actual: usize },

    #[error("Amount must be >= {minimum}, got {amount}")]
    SeedTooSmall { amount: u64, minimum: u64 },

    #[error("Asset id must be non-zero")]
    InvalidAssetId,

    #[error("Invalid block")]
    InvalidBlock,
}

/// Failures talking to, or executing against, the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("unknown application {0}")]
    UnknownApp(u64),

    #[error("unknown asset {0}")]
    UnknownAsset(u64),

    #[error("account {address} is not opted in to asset {asset_id}")]
    NotOptedIn { address: String, asset_id: u64 },

    #[error("insufficient funds in {address}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        address: String,
        balance: u64,
        needed: u64,
    },

    #[error("malformed group: {0}")]
    MalformedGroup(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(&'static str),

    /// The node refused the transaction (client side view of any of the above).
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("ledger unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl LedgerError {
    /// Infrastructure failures that the next poll cycle may recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Unavailable(_))
    }
}

/// Problems with `.env.emu` or the values it holds. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file parse: {0}")]
    Parse(#[from] dotenvy::Error),

    #[error("Invalid network: {0} (expected localnet, testnet or mainnet)")]
    InvalidNetwork(String),

    #[error("{0} not found in config")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("APP_ID already set in config: {0}")]
    AlreadyDeployed(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consensus_messages_are_descriptive() {
        assert_eq!(
            ConsensusError::SeedTooSmall {
                amount: 1,
                minimum: 300_000
            }
            .to_string(),
            "Amount must be >= 300000, got 1"
        );
        assert_eq!(ConsensusError::InvalidBlock.to_string(), "Invalid block");
    }

    #[test]
    fn only_infrastructure_failures_are_transient() {
        assert!(LedgerError::Unavailable("502".into()).is_transient());
        assert!(!LedgerError::Rejected("Invalid block".into()).is_transient());
        assert!(!LedgerError::from(ConsensusError::NotBootstrapped).is_transient());
    }
}
