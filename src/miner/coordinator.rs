use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use super::search::{CancelToken, SearchOutcome, find_nonce};
use crate::consensus::ChainState;
use crate::error::LedgerError;
use crate::ledger::Ledger;

#[derive(Debug, Clone)]
pub struct MinerSettings {
    /// Tag mixed into every candidate block.
    pub coinbase: Vec<u8>,
    /// Pause between polls while no search is running.
    pub poll_interval: Duration,
    /// Longest wait on a running search before polling again.
    pub attempt_timeout: Duration,
}

impl Default for MinerSettings {
    fn default() -> Self {
        Self {
            coinbase: Vec::new(),
            poll_interval: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// What one height reading means relative to the last block mined against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    NewBlock,
    Unchanged,
    /// Lower than the last seen height; ignored.
    Stale,
}

/// Remembers the last height work was started for. Only strictly greater
/// heights count as new blocks.
#[derive(Debug, Clone, Default)]
pub struct ChainTracker {
    last_height: Option<u64>,
}

impl ChainTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tracker that already considers `height` handled.
    pub fn resume_at(height: u64) -> Self {
        Self {
            last_height: Some(height),
        }
    }

    pub fn last_height(&self) -> Option<u64> {
        self.last_height
    }

    pub fn classify(&self, height: u64) -> Observation {
        match self.last_height {
            None => Observation::NewBlock,
            Some(last) if height > last => Observation::NewBlock,
            Some(last) if height == last => Observation::Unchanged,
            Some(_) => Observation::Stale,
        }
    }

    pub fn record(&mut self, height: u64) {
        self.last_height = Some(height);
    }

    pub fn observe(&mut self, height: u64) -> Observation {
        let observation = self.classify(height);
        if observation == Observation::NewBlock {
            self.record(height);
        }
        observation
    }
}

/// One background search against a snapshot of the chain.
#[derive(Debug)]
pub struct MiningAttempt {
    id: u64,
    height: u64,
    token: CancelToken,
    result: oneshot::Receiver<SearchOutcome>,
}

impl MiningAttempt {
    fn spawn(id: u64, snapshot: &ChainState, coinbase: Vec<u8>) -> std::io::Result<Self> {
        let token = CancelToken::new();
        let (tx, rx) = oneshot::channel();

        let block_hash = snapshot.block_hash;
        let target = snapshot.target;
        let search_token = token.clone();
        thread::Builder::new()
            .name(format!("search-{}", snapshot.block_height))
            .spawn(move || {
                let outcome = find_nonce(&block_hash, &coinbase, &target, &search_token);
                // receiver gone means the attempt was discarded
                let _ = tx.send(outcome);
            })?;

        Ok(Self {
            id,
            height: snapshot.block_height,
            token,
            result: rx,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Height of the block this attempt builds on.
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    fn cancel(&self) {
        self.token.cancel();
    }
}

/// Result of handing a finished search to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted { reward: u64 },
    /// The ledger refused the block; usually someone else mined first.
    Rejected,
    /// Nothing was submitted (cancelled, exhausted or lost search).
    Skipped,
}

/// Polls the ledger and keeps at most one search running against the
/// newest observed block.
pub struct Coordinator<L: Ledger + ?Sized> {
    ledger: Arc<L>,
    settings: MinerSettings,
    tracker: ChainTracker,
    active: Option<MiningAttempt>,
    attempts_started: u64,
}

impl<L: Ledger + ?Sized> Coordinator<L> {
    pub fn new(ledger: Arc<L>, settings: MinerSettings) -> Self {
        Self {
            ledger,
            settings,
            tracker: ChainTracker::new(),
            active: None,
            attempts_started: 0,
        }
    }

    pub fn with_tracker(mut self, tracker: ChainTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn attempts_started(&self) -> u64 {
        self.attempts_started
    }

    pub fn active(&self) -> Option<&MiningAttempt> {
        self.active.as_ref()
    }

    /// Reads the chain once and starts a fresh search if a new block appeared.
    pub async fn poll(&mut self) -> Result<Observation, LedgerError> {
        let snapshot = self.ledger.get_state().await?;
        let height = snapshot.block_height;

        let observation = self.tracker.classify(height);
        match observation {
            Observation::NewBlock => {
                info!("MINER - new block #{height}");
                if let Some(old) = self.active.take() {
                    old.cancel();
                    debug!("MINER - cancelled attempt {} at #{}", old.id, old.height);
                }
                let id = self.attempts_started + 1;
                match MiningAttempt::spawn(id, &snapshot, self.settings.coinbase.clone()) {
                    Ok(attempt) => {
                        debug!("MINER - attempt {id} searching on #{height}");
                        self.attempts_started = id;
                        self.active = Some(attempt);
                        self.tracker.record(height);
                    }
                    // height stays unrecorded so the next poll retries
                    Err(e) => error!("MINER - could not start search thread: {e}"),
                }
            }
            Observation::Unchanged => debug!("MINER - still at #{height}"),
            Observation::Stale => warn!(
                "MINER - ignoring stale read #{height}, already past #{}",
                self.tracker.last_height().unwrap_or_default()
            ),
        }
        Ok(observation)
    }

    /// Waits up to `attempt_timeout` for the active search. Returns the
    /// finished attempt with its outcome, or `None` if it is still running.
    async fn wait_for_attempt(&mut self) -> Option<(MiningAttempt, SearchOutcome)> {
        let attempt = self.active.as_mut()?;
        let waited = timeout(self.settings.attempt_timeout, &mut attempt.result).await;
        match waited {
            Err(_) => {
                debug!("MINER - attempt {} still searching", attempt.id);
                None
            }
            Ok(Err(_)) => {
                warn!("MINER - attempt {} ended without a result", attempt.id);
                let attempt = self.active.take()?;
                Some((attempt, SearchOutcome::Cancelled))
            }
            Ok(Ok(outcome)) => {
                let attempt = self.active.take()?;
                Some((attempt, outcome))
            }
        }
    }

    async fn submit(&self, attempt: &MiningAttempt, outcome: SearchOutcome) -> Submission {
        match outcome {
            SearchOutcome::Found { nonce, hash } => {
                if attempt.token.is_cancelled() {
                    debug!("MINER - dropping nonce {nonce} of cancelled attempt {}", attempt.id);
                    return Submission::Skipped;
                }
                info!(
                    "MINER - nonce {nonce} solves #{} ({})",
                    attempt.height,
                    hex::encode(hash)
                );
                match self.ledger.mine(nonce, &self.settings.coinbase).await {
                    Ok(reward) => {
                        info!("MINER - block #{} accepted, reward {reward}", attempt.height + 1);
                        Submission::Accepted { reward }
                    }
                    Err(e) if e.is_transient() => {
                        warn!("MINER - submission for #{} failed: {e}", attempt.height);
                        Submission::Rejected
                    }
                    Err(e) => {
                        warn!("MINER - stale submission for #{}: {e}", attempt.height);
                        Submission::Rejected
                    }
                }
            }
            SearchOutcome::Exhausted => {
                warn!("MINER - nonce space exhausted on #{}", attempt.height);
                Submission::Skipped
            }
            SearchOutcome::Cancelled => Submission::Skipped,
        }
    }

    /// One iteration: poll, then wait on the search or idle for
    /// `poll_interval`. Returns the submission if a search finished.
    pub async fn step(&mut self) -> Option<Submission> {
        match self.poll().await {
            Ok(_) => {}
            Err(e) if e.is_transient() => warn!("MINER - ledger read failed, retrying: {e}"),
            Err(e) => error!("MINER - ledger read rejected: {e}"),
        }

        if self.active.is_none() {
            sleep(self.settings.poll_interval).await;
            return None;
        }
        let (attempt, outcome) = self.wait_for_attempt().await?;
        Some(self.submit(&attempt, outcome).await)
    }

    /// Runs until `shutdown` resolves, then cancels any running search.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.step() => {}
            }
        }
        info!("MINER - shutting down after {} attempts", self.attempts_started);
        self.shutdown();
    }

    pub fn shutdown(&mut self) {
        if let Some(attempt) = self.active.take() {
            attempt.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use primitive_types::U256;

    use crate::consensus::{GENESIS_BLOCK_HASH, POW_LIMIT, Payment, SUBSIDY};

    /// Serves queued reads, then repeats the last one; records submissions.
    struct ScriptedLedger {
        reads: Mutex<VecDeque<Result<ChainState, LedgerError>>>,
        last: Mutex<Option<ChainState>>,
        mined: Mutex<Vec<(u64, Vec<u8>)>>,
        reject_with: Option<String>,
    }

    impl ScriptedLedger {
        fn new(reads: Vec<Result<ChainState, LedgerError>>) -> Self {
            Self {
                reads: Mutex::new(reads.into()),
                last: Mutex::new(None),
                mined: Mutex::new(Vec::new()),
                reject_with: None,
            }
        }

        fn heights(heights: &[u64], target: U256) -> Self {
            Self::new(heights.iter().map(|h| Ok(state_at(*h, target))).collect())
        }

        fn mined(&self) -> Vec<(u64, Vec<u8>)> {
            self.mined.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ledger for ScriptedLedger {
        async fn get_state(&self) -> Result<ChainState, LedgerError> {
            let next = self.reads.lock().unwrap().pop_front();
            match next {
                Some(Ok(state)) => {
                    *self.last.lock().unwrap() = Some(state.clone());
                    Ok(state)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone().expect("script is empty")),
            }
        }

        async fn bootstrap(&self, _seed: Payment) -> Result<u64, LedgerError> {
            unreachable!("coordinator never bootstraps")
        }

        async fn mine(&self, nonce: u64, coinbase: &[u8]) -> Result<u64, LedgerError> {
            self.mined.lock().unwrap().push((nonce, coinbase.to_vec()));
            match &self.reject_with {
                Some(reason) => Err(LedgerError::Rejected(reason.clone())),
                None => Ok(SUBSIDY),
            }
        }
    }

    fn state_at(height: u64, target: U256) -> ChainState {
        let mut state = ChainState::genesis("creator");
        state.asset_id = Some(1001);
        state.block_height = height;
        if height > 0 {
            state.block_hash = GENESIS_BLOCK_HASH + U256::from(height);
        }
        state.target = target;
        state
    }

    fn fast() -> MinerSettings {
        MinerSettings {
            coinbase: Vec::new(),
            poll_interval: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn tracker_only_moves_forward() {
        let mut tracker = ChainTracker::new();
        let seen: Vec<_> = [5, 5, 6, 6, 7, 3]
            .into_iter()
            .map(|h| tracker.observe(h))
            .collect();
        assert_eq!(
            seen,
            vec![
                Observation::NewBlock,
                Observation::Unchanged,
                Observation::NewBlock,
                Observation::Unchanged,
                Observation::NewBlock,
                Observation::Stale,
            ]
        );
        assert_eq!(tracker.last_height(), Some(7));
    }

    #[tokio::test]
    async fn two_new_attempts_for_heights_five_to_seven() {
        // zero target: searches run until cancelled
        let ledger = Arc::new(ScriptedLedger::heights(&[5, 5, 6, 6, 7], U256::zero()));
        let mut coordinator =
            Coordinator::new(ledger.clone(), fast()).with_tracker(ChainTracker::resume_at(5));

        assert_eq!(coordinator.poll().await.unwrap(), Observation::Unchanged);
        assert_eq!(coordinator.poll().await.unwrap(), Observation::Unchanged);
        assert!(coordinator.active().is_none());

        assert_eq!(coordinator.poll().await.unwrap(), Observation::NewBlock);
        let first = coordinator.active().unwrap();
        let (first_id, first_token) = (first.id(), first.token().clone());
        assert_eq!(first.height(), 6);

        assert_eq!(coordinator.poll().await.unwrap(), Observation::Unchanged);
        assert_eq!(coordinator.active().unwrap().id(), first_id);
        assert!(!first_token.is_cancelled());

        assert_eq!(coordinator.poll().await.unwrap(), Observation::NewBlock);
        assert!(first_token.is_cancelled());
        assert_eq!(coordinator.active().unwrap().height(), 7);
        assert_eq!(coordinator.attempts_started(), 2);

        coordinator.shutdown();
        assert!(ledger.mined().is_empty());
    }

    #[tokio::test]
    async fn fresh_start_counts_first_read_as_new_block() {
        let ledger = Arc::new(ScriptedLedger::heights(&[5, 5, 6, 6, 7], U256::zero()));
        let mut coordinator = Coordinator::new(ledger, fast());

        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(coordinator.poll().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Observation::NewBlock,
                Observation::Unchanged,
                Observation::NewBlock,
                Observation::Unchanged,
                Observation::NewBlock,
            ]
        );
        assert_eq!(coordinator.attempts_started(), 3);
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn lower_height_keeps_current_attempt() {
        let ledger = Arc::new(ScriptedLedger::heights(&[7, 6], U256::zero()));
        let mut coordinator = Coordinator::new(ledger, fast());

        coordinator.poll().await.unwrap();
        let token = coordinator.active().unwrap().token().clone();
        assert_eq!(coordinator.poll().await.unwrap(), Observation::Stale);
        assert!(!token.is_cancelled());
        assert_eq!(coordinator.active().unwrap().height(), 7);
        coordinator.shutdown();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn found_nonce_is_submitted_once() {
        let mut genesis = state_at(0, POW_LIMIT);
        genesis.block_hash = GENESIS_BLOCK_HASH;
        let ledger = Arc::new(ScriptedLedger::new(vec![Ok(genesis)]));
        let mut coordinator = Coordinator::new(ledger.clone(), fast());

        let submission = coordinator.step().await;
        assert_eq!(submission, Some(Submission::Accepted { reward: SUBSIDY }));
        assert_eq!(ledger.mined(), vec![(64, Vec::new())]);
        assert!(coordinator.active().is_none());
    }

    #[tokio::test]
    async fn stale_rejection_is_not_retried() {
        let mut ledger = ScriptedLedger::heights(&[3], POW_LIMIT);
        ledger.reject_with = Some("Invalid block".into());
        let ledger = Arc::new(ledger);
        let mut coordinator = Coordinator::new(ledger.clone(), fast());

        assert_eq!(coordinator.step().await, Some(Submission::Rejected));
        assert!(coordinator.active().is_none());

        // same height again: idle, nothing resubmitted
        assert_eq!(coordinator.step().await, None);
        assert_eq!(coordinator.step().await, None);
        assert_eq!(ledger.mined().len(), 1);
        assert_eq!(coordinator.attempts_started(), 1);
    }

    #[tokio::test]
    async fn cancelled_attempt_never_submits() {
        let ledger = Arc::new(ScriptedLedger::heights(&[2], POW_LIMIT));
        let mut coordinator = Coordinator::new(ledger.clone(), fast());

        coordinator.poll().await.unwrap();
        coordinator.active().unwrap().token().cancel();
        let (attempt, outcome) = coordinator.wait_for_attempt().await.unwrap();
        assert_eq!(coordinator.submit(&attempt, outcome).await, Submission::Skipped);
        assert!(ledger.mined().is_empty());
    }

    #[tokio::test]
    async fn read_failures_are_absorbed() {
        let ledger = Arc::new(ScriptedLedger::new(vec![
            Err(LedgerError::Unavailable("502".into())),
            Ok(state_at(4, U256::zero())),
        ]));
        let mut coordinator = Coordinator::new(ledger, fast());

        assert_eq!(coordinator.step().await, None);
        assert!(coordinator.active().is_none());

        assert_eq!(coordinator.poll().await.unwrap(), Observation::NewBlock);
        assert_eq!(coordinator.active().unwrap().height(), 4);
        coordinator.shutdown();
    }

    #[tokio::test]
    async fn run_stops_on_shutdown_and_cancels_search() {
        let ledger = Arc::new(ScriptedLedger::heights(&[9], U256::zero()));
        let mut coordinator = Coordinator::new(ledger, fast());

        coordinator.run(sleep(Duration::from_millis(50))).await;
        assert!(coordinator.active().is_none());
        assert_eq!(coordinator.attempts_started(), 1);
    }
}
