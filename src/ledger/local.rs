use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{BOOTSTRAP_METHOD, GroupTxn, Ledger, bootstrap_group};
use crate::consensus::{AssetParams, CallContext, ChainState, Payment};
use crate::error::{ConsensusError, LedgerError};

/// First identifier handed out for applications and assets.
pub const FIRST_ID: u64 = 1001;

/// Source of ledger timestamps (seconds).
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        Utc::now().timestamp().max(0) as u64
    }
}

/// Clock moved by hand, for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self(AtomicU64::new(start))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub app_id: u64,
    pub app_address: String,
}

/// Native balance and asset holdings of one account. An asset key present
/// with amount 0 means opted in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub address: String,
    pub balance: u64,
    pub assets: BTreeMap<u64, u64>,
}

impl AccountView {
    pub fn is_opted_in(&self, asset_id: u64) -> bool {
        self.assets.contains_key(&asset_id)
    }
}

#[derive(Debug, Default, Clone)]
struct AccountRecord {
    balance: u64,
    assets: BTreeMap<u64, u64>,
}

#[derive(Debug)]
struct AppRecord {
    address: String,
    state: ChainState,
    logs: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Book {
    accounts: HashMap<String, AccountRecord>,
    apps: BTreeMap<u64, AppRecord>,
    assets: HashMap<u64, AssetParams>,
    next_id: u64,
    last_time: u64,
}

impl Book {
    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn app(&self, app_id: u64) -> Result<&AppRecord, LedgerError> {
        self.apps.get(&app_id).ok_or(LedgerError::UnknownApp(app_id))
    }

    fn balance(&self, address: &str) -> u64 {
        self.accounts.get(address).map(|a| a.balance).unwrap_or(0)
    }

    fn holding(&self, address: &str, asset_id: u64) -> Option<u64> {
        self.accounts
            .get(address)
            .and_then(|a| a.assets.get(&asset_id).copied())
    }

    fn account_mut(&mut self, address: &str) -> &mut AccountRecord {
        self.accounts.entry(address.to_string()).or_default()
    }
}

/// In-process execution environment: accounts, assets and emulator apps.
///
/// Every call is validated against the current book first and only then
/// written, under a single lock, so calls are atomic and serialized.
pub struct LocalLedger {
    book: Mutex<Book>,
    clock: Arc<dyn Clock>,
}

impl LocalLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            book: Mutex::new(Book {
                accounts: HashMap::new(),
                apps: BTreeMap::new(),
                assets: HashMap::new(),
                next_id: FIRST_ID,
                last_time: 0,
            }),
            clock,
        }
    }

    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock))
    }

    /// Ledger time for a call; never goes backwards.
    fn now(&self, book: &mut Book) -> u64 {
        book.last_time = book.last_time.max(self.clock.now());
        book.last_time
    }

    pub fn create_app(&self, creator: &str) -> AppInfo {
        let mut book = self.book.lock().expect("mutex poisoned");
        let app_id = book.allocate_id();
        let app_address = app_address(app_id);
        book.apps.insert(
            app_id,
            AppRecord {
                address: app_address.clone(),
                state: ChainState::genesis(creator),
                logs: Vec::new(),
            },
        );
        info!("APP - created {app_id} for creator {creator}");
        AppInfo {
            app_id,
            app_address,
        }
    }

    /// Dev faucet: credits native units to `address`.
    pub fn fund(&self, address: &str, amount: u64) -> AccountView {
        let mut book = self.book.lock().expect("mutex poisoned");
        let account = book.account_mut(address);
        account.balance = account.balance.saturating_add(amount);
        debug!("FAUCET - {address} +{amount} -> {}", account.balance);
        view(address, account)
    }

    pub fn opt_in(&self, address: &str, asset_id: u64) -> Result<AccountView, LedgerError> {
        let mut book = self.book.lock().expect("mutex poisoned");
        if !book.assets.contains_key(&asset_id) {
            return Err(LedgerError::UnknownAsset(asset_id));
        }
        let account = book.account_mut(address);
        account.assets.entry(asset_id).or_insert(0);
        debug!("OPT-IN - {address} -> asset {asset_id}");
        Ok(view(address, account))
    }

    pub fn account(&self, address: &str) -> AccountView {
        let book = self.book.lock().expect("mutex poisoned");
        book.accounts
            .get(address)
            .map(|a| view(address, a))
            .unwrap_or_else(|| AccountView {
                address: address.to_string(),
                ..AccountView::default()
            })
    }

    pub fn asset(&self, asset_id: u64) -> Result<AssetParams, LedgerError> {
        let book = self.book.lock().expect("mutex poisoned");
        book.assets
            .get(&asset_id)
            .cloned()
            .ok_or(LedgerError::UnknownAsset(asset_id))
    }

    pub fn state(&self, app_id: u64) -> Result<ChainState, LedgerError> {
        let book = self.book.lock().expect("mutex poisoned");
        Ok(book.app(app_id)?.state.clone())
    }

    pub fn logs(&self, app_id: u64) -> Result<Vec<Vec<u8>>, LedgerError> {
        let book = self.book.lock().expect("mutex poisoned");
        Ok(book.app(app_id)?.logs.clone())
    }

    /// Executes a bootstrap group: the seed payment plus the `bootstrap` call.
    pub fn bootstrap(
        &self,
        app_id: u64,
        sender: &str,
        group: &[GroupTxn],
    ) -> Result<u64, LedgerError> {
        let mut book = self.book.lock().expect("mutex poisoned");
        let now = self.now(&mut book);

        let calls = group
            .iter()
            .filter(|txn| match txn {
                GroupTxn::AppCall { app_id: id, method } => {
                    *id == app_id && method == BOOTSTRAP_METHOD
                }
                GroupTxn::Payment(_) => false,
            })
            .count();
        if calls != 1 {
            return Err(LedgerError::MalformedGroup(format!(
                "expected one bootstrap call for app {app_id}, found {calls}"
            )));
        }
        let seed = group
            .iter()
            .find_map(|txn| match txn {
                GroupTxn::Payment(p) => Some(p),
                _ => None,
            })
            .ok_or_else(|| LedgerError::MalformedGroup("missing seed payment".into()))?;

        let app = book.app(app_id)?;
        let ctx = CallContext {
            sender,
            app_address: &app.address,
            group_size: group.len(),
            now,
        };
        let asset_id = book.next_id;
        let out = app.state.bootstrap(&ctx, seed, asset_id).inspect_err(|e| {
            warn!("BOOTSTRAP - app {app_id} rejected: {e}");
        })?;

        let payer_balance = book.balance(&seed.sender);
        if payer_balance < seed.amount {
            return Err(LedgerError::InsufficientFunds {
                address: seed.sender.clone(),
                balance: payer_balance,
                needed: seed.amount,
            });
        }

        // validated; apply
        book.allocate_id();
        book.account_mut(&seed.sender).balance -= seed.amount;
        let receiver = book.account_mut(&seed.receiver);
        receiver.balance = receiver.balance.saturating_add(seed.amount);

        let app_addr = out.asset.reserve.clone();
        let total = out.asset.total;
        book.assets.insert(asset_id, out.asset);
        book.account_mut(&app_addr).assets.insert(asset_id, total);
        if let Some(app) = book.apps.get_mut(&app_id) {
            app.state = out.state;
        }

        info!("BOOTSTRAP - app {app_id} asset {asset_id} at {now}");
        Ok(asset_id)
    }

    /// Executes `mine(nonce, coinbase)` for `sender`; returns the reward paid.
    pub fn mine(
        &self,
        app_id: u64,
        sender: &str,
        nonce: u64,
        coinbase: &[u8],
    ) -> Result<u64, LedgerError> {
        let mut book = self.book.lock().expect("mutex poisoned");
        let now = self.now(&mut book);

        let app = book.app(app_id)?;
        let ctx = CallContext {
            sender,
            app_address: &app.address,
            group_size: 1,
            now,
        };
        let mined = app.state.mine(&ctx, nonce, coinbase).inspect_err(|e| {
            debug!("MINE - app {app_id} nonce {nonce} rejected: {e}");
        })?;
        let app_addr = app.address.clone();

        let asset_id = mined
            .state
            .asset_id
            .ok_or(ConsensusError::NotBootstrapped)?;
        if book.holding(sender, asset_id).is_none() {
            return Err(LedgerError::NotOptedIn {
                address: sender.to_string(),
                asset_id,
            });
        }
        let reserve = book.holding(&app_addr, asset_id).unwrap_or(0);
        if reserve < mined.reward {
            return Err(LedgerError::InsufficientFunds {
                address: app_addr,
                balance: reserve,
                needed: mined.reward,
            });
        }

        // validated; apply
        let reward = mined.reward;
        let height = mined.state.block_height;
        if let Some(held) = book.account_mut(&app_addr).assets.get_mut(&asset_id) {
            *held -= reward;
        }
        if let Some(held) = book.account_mut(sender).assets.get_mut(&asset_id) {
            *held += reward;
        }
        if let Some(app) = book.apps.get_mut(&app_id) {
            app.state = mined.state;
            app.logs.extend(mined.events.iter().map(|e| e.encode()));
        }

        info!("MINE - app {app_id} block #{height} by {sender}, reward {reward}");
        Ok(reward)
    }

    /// Binds this ledger to one application and one sending account.
    pub fn handle(self: &Arc<Self>, app_id: u64, sender: impl Into<String>) -> AppHandle {
        AppHandle {
            ledger: Arc::clone(self),
            app_id,
            sender: sender.into(),
        }
    }
}

/// Deterministic account address of an application.
pub fn app_address(app_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"appID");
    hasher.update(app_id.to_be_bytes());
    hex::encode(hasher.finalize())
}

fn view(address: &str, account: &AccountRecord) -> AccountView {
    AccountView {
        address: address.to_string(),
        balance: account.balance,
        assets: account.assets.clone(),
    }
}

/// `Ledger` over an in-process `LocalLedger`.
#[derive(Clone)]
pub struct AppHandle {
    ledger: Arc<LocalLedger>,
    app_id: u64,
    sender: String,
}

#[async_trait]
impl Ledger for AppHandle {
    async fn get_state(&self) -> Result<ChainState, LedgerError> {
        self.ledger.state(self.app_id)
    }

    async fn bootstrap(&self, seed: Payment) -> Result<u64, LedgerError> {
        let group = bootstrap_group(self.app_id, seed);
        self.ledger.bootstrap(self.app_id, &self.sender, &group)
    }

    async fn mine(&self, nonce: u64, coinbase: &[u8]) -> Result<u64, LedgerError> {
        self.ledger.mine(self.app_id, &self.sender, nonce, coinbase)
    }
}
