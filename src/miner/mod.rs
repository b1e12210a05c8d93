pub mod coordinator;
pub mod search;

pub use coordinator::{ChainTracker, Coordinator, MinerSettings, Observation, Submission};
pub use search::{CancelToken, SearchOutcome, find_nonce};
