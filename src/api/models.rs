use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::{GroupTxn, LocalLedger, call_sighash};
use crate::wallet::{Account, pubkey_to_address_hex, verify_signature_hex};

/// Shared node state: one in-process ledger behind the HTTP handlers.
pub struct AppState {
    pub ledger: Arc<LocalLedger>,
}

impl AppState {
    pub fn new(ledger: Arc<LocalLedger>) -> Self {
        Self { ledger }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(LocalLedger::with_system_clock()))
    }
}

/* ---------- Signed calls ---------- */

/// A call made on behalf of `sender`, authorized by an ECDSA signature over
/// `call_sighash(method, call)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCall<T> {
    pub sender: String,
    pub signature: String,
    pub call: T,
}

impl<T: Serialize> SignedCall<T> {
    pub fn sign(account: &Account, method: &str, call: T) -> Self {
        let signature = account.sign(call_sighash(method, &call));
        Self {
            sender: account.address(),
            signature,
            call,
        }
    }

    /// Checks the signature and returns the normalized sender address.
    pub fn verify(&self, method: &str) -> Result<String, LedgerError> {
        let sender = pubkey_to_address_hex(&self.sender).map_err(LedgerError::InvalidSignature)?;
        let digest = call_sighash(method, &self.call);
        match verify_signature_hex(&sender, &self.signature, digest) {
            Ok(true) => Ok(sender),
            Ok(false) => Err(LedgerError::InvalidSignature("signature does not match sender")),
            Err(e) => Err(LedgerError::InvalidSignature(e)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapCall {
    pub app_id: u64,
    pub group: Vec<GroupTxn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MineCall {
    pub app_id: u64,
    pub nonce: u64,
    /// Hex-encoded coinbase tag.
    pub coinbase: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptInCall {
    pub asset_id: u64,
}

/* ---------- Requests / responses ---------- */

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAppRequest {
    pub creator: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub address: String,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub asset_id: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MineResponse {
    pub reward: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub app_id: u64,
    /// Hex of each encoded event, oldest first.
    pub logs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_call_verifies() {
        let account = Account::generate();
        let call = OptInCall { asset_id: 1002 };
        let signed = SignedCall::sign(&account, "opt_in", call);
        assert_eq!(signed.verify("opt_in").unwrap(), account.address());
    }

    #[test]
    fn tampered_call_is_rejected() {
        let account = Account::generate();
        let mut signed = SignedCall::sign(
            &account,
            "mine",
            MineCall {
                app_id: 1001,
                nonce: 64,
                coinbase: String::new(),
            },
        );
        assert!(matches!(
            signed.verify("bootstrap"),
            Err(LedgerError::InvalidSignature(_))
        ));

        signed.call.nonce = 65;
        assert!(matches!(
            signed.verify("mine"),
            Err(LedgerError::InvalidSignature(_))
        ));

        signed.sender = "not-a-key".into();
        assert!(matches!(
            signed.verify("mine"),
            Err(LedgerError::InvalidSignature("invalid pubkey hex"))
        ));
    }
}
