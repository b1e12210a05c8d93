use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::{BOOTSTRAP_METHOD, Ledger, MINE_METHOD, OPT_IN_METHOD, bootstrap_group};
use super::local::{AccountView, AppInfo};
use crate::api::models::{
    BootstrapCall, BootstrapResponse, CreateAppRequest, FaucetRequest, LogsResponse, MineCall,
    MineResponse, OptInCall, SignedCall,
};
use crate::consensus::{ChainState, Payment};
use crate::error::LedgerError;
use crate::wallet::Account;

/// Client for a node's `/api/v1` surface, acting as one account.
#[derive(Debug, Clone)]
pub struct NodeClient {
    client: Client,
    base_url: String,
    account: Account,
}

impl NodeClient {
    pub fn new(base_url: impl Into<String>, account: Account) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account,
        }
    }

    pub fn address(&self) -> String {
        self.account.address()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn send<R: DeserializeOwned>(&self, req: RequestBuilder) -> Result<R, LedgerError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }
        let reason = resp.text().await.unwrap_or_default();
        debug!("node answered {status}: {reason}");
        if status.is_server_error() {
            Err(LedgerError::Unavailable(format!("{status}: {reason}")))
        } else {
            Err(LedgerError::Rejected(reason))
        }
    }

    /// Creates an application whose creator is this account.
    pub async fn create_app(&self) -> Result<AppInfo, LedgerError> {
        let body = CreateAppRequest {
            creator: self.address(),
        };
        self.send(self.client.post(self.url("/apps/")).json(&body)).await
    }

    /// Dev faucet; only served by local nodes.
    pub async fn fund(&self, amount: u64) -> Result<AccountView, LedgerError> {
        let body = FaucetRequest {
            address: self.address(),
            amount,
        };
        self.send(self.client.post(self.url("/faucet/")).json(&body)).await
    }

    pub async fn opt_in(&self, asset_id: u64) -> Result<AccountView, LedgerError> {
        let body = SignedCall::sign(&self.account, OPT_IN_METHOD, OptInCall { asset_id });
        let url = self.url(&format!("/accounts/{}/opt-in/", self.address()));
        self.send(self.client.post(url).json(&body)).await
    }

    pub async fn account(&self) -> Result<AccountView, LedgerError> {
        let url = self.url(&format!("/accounts/{}/", self.address()));
        self.send(self.client.get(url)).await
    }

    /// Hex-encoded event records of `app_id`, oldest first.
    pub async fn logs(&self, app_id: u64) -> Result<Vec<String>, LedgerError> {
        let url = self.url(&format!("/apps/{app_id}/logs/"));
        let resp: LogsResponse = self.send(self.client.get(url)).await?;
        Ok(resp.logs)
    }

    pub fn app(&self, app_id: u64) -> HttpLedger {
        HttpLedger {
            node: self.clone(),
            app_id,
        }
    }
}

/// `Ledger` for one application on a remote node.
#[derive(Debug, Clone)]
pub struct HttpLedger {
    node: NodeClient,
    app_id: u64,
}

impl HttpLedger {
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn node(&self) -> &NodeClient {
        &self.node
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn get_state(&self) -> Result<ChainState, LedgerError> {
        let url = self.node.url(&format!("/apps/{}/state/", self.app_id));
        self.node.send(self.node.client.get(url)).await
    }

    async fn bootstrap(&self, seed: Payment) -> Result<u64, LedgerError> {
        let call = BootstrapCall {
            app_id: self.app_id,
            group: bootstrap_group(self.app_id, seed),
        };
        let body = SignedCall::sign(&self.node.account, BOOTSTRAP_METHOD, call);
        let url = self.node.url(&format!("/apps/{}/bootstrap/", self.app_id));
        let resp: BootstrapResponse = self.node.send(self.node.client.post(url).json(&body)).await?;
        Ok(resp.asset_id)
    }

    async fn mine(&self, nonce: u64, coinbase: &[u8]) -> Result<u64, LedgerError> {
        let call = MineCall {
            app_id: self.app_id,
            nonce,
            coinbase: hex::encode(coinbase),
        };
        let body = SignedCall::sign(&self.node.account, MINE_METHOD, call);
        let url = self.node.url(&format!("/apps/{}/mine/", self.app_id));
        let resp: MineResponse = self.node.send(self.node.client.post(url).json(&body)).await?;
        Ok(resp.reward)
    }
}
