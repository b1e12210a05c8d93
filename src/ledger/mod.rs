pub mod http;
pub mod local;

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consensus::{ChainState, Payment};
use crate::error::LedgerError;

pub use http::{HttpLedger, NodeClient};
pub use local::{AccountView, AppHandle, AppInfo, Clock, LocalLedger, ManualClock, SystemClock};

pub const BOOTSTRAP_METHOD: &str = "bootstrap";
pub const MINE_METHOD: &str = "mine";
pub const OPT_IN_METHOD: &str = "opt_in";

/// One operation of an atomic group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupTxn {
    Payment(Payment),
    AppCall { app_id: u64, method: String },
}

/// The two-operation group that bootstraps `app_id`.
pub fn bootstrap_group(app_id: u64, seed: Payment) -> Vec<GroupTxn> {
    vec![
        GroupTxn::Payment(seed),
        GroupTxn::AppCall {
            app_id,
            method: BOOTSTRAP_METHOD.to_string(),
        },
    ]
}

/// A view of one application as seen by one account.
///
/// Calls are atomic: a rejected call leaves no trace in the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Point-in-time read of the chain state.
    async fn get_state(&self) -> Result<ChainState, LedgerError>;

    /// Submits `[seed, bootstrap()]` as one group. Returns the new asset id.
    async fn bootstrap(&self, seed: Payment) -> Result<u64, LedgerError>;

    /// Submits a block. Returns the reward transferred to the caller.
    async fn mine(&self, nonce: u64, coinbase: &[u8]) -> Result<u64, LedgerError>;
}

/// Bootstraps the application unless a previous run already did.
pub async fn ensure_bootstrapped<L: Ledger + ?Sized>(
    ledger: &L,
    seed: Payment,
) -> Result<u64, LedgerError> {
    let state = ledger.get_state().await?;
    if let Some(asset_id) = state.asset_id.filter(|_| state.is_bootstrapped()) {
        debug!("already bootstrapped with asset {asset_id}");
        return Ok(asset_id);
    }
    let asset_id = ledger.bootstrap(seed).await?;
    info!("bootstrapped, reward asset {asset_id}");
    Ok(asset_id)
}

/// Digest an account signs to authorize `call` under `method`.
pub fn call_sighash<T: Serialize>(method: &str, call: &T) -> [u8; 32] {
    let payload = serde_json::json!({
        "method": method,
        "call": call,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}
