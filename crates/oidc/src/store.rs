//! In-memory store tying a login's PKCE verifier to its state token across
//! the provider redirect. Entries are single-use and time-bounded.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use tracing::debug;

/// Default lifetime of a pending login attempt.
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Default interval between expiry sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct PendingLogin {
    verifier: String,
    expires_at: Instant,
}

/// Outcome of a failed [`PendingLoginStore::take_if_valid`].
#[derive(Debug, PartialEq, Eq)]
pub enum TakeError {
    /// State unknown: never inserted, already consumed, or swept.
    NotFound,
    /// Entry existed but its TTL had passed; it has been removed.
    Expired,
}

/// Map from state token to pending login, shared across request tasks.
///
/// All map operations run under one mutex so a state can never be consumed
/// twice; nothing network-bound happens while it is held.
#[derive(Debug, Default)]
pub struct PendingLoginStore {
    entries: Mutex<HashMap<String, PendingLogin>>,
}

impl PendingLoginStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or overwrite) the pending login for `state`.
    pub fn put(&self, state: &str, verifier: &str, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            state.to_string(),
            PendingLogin {
                verifier: verifier.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        debug!(size = entries.len(), "pending login stored");
    }

    /// Atomically look up and remove the entry for `state`.
    ///
    /// Returns the verifier exactly once per inserted state; an entry whose
    /// TTL has passed is removed and reported as [`TakeError::Expired`].
    /// An entry exactly at the boundary is still valid.
    pub fn take_if_valid(&self, state: &str) -> Result<String, TakeError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.remove(state).ok_or(TakeError::NotFound)?;
        if entry.expires_at < Instant::now() {
            return Err(TakeError::Expired);
        }
        Ok(entry.verifier)
    }

    /// Drop every expired entry, returning how many were removed. Guards
    /// against unbounded growth from abandoned login attempts.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at >= now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run [`PendingLoginStore::sweep`] on a fixed interval until the returned
/// handle is aborted. Owned by the process lifecycle, not the request path.
pub fn spawn_sweeper(
    store: std::sync::Arc<PendingLoginStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            let cleaned = store.sweep();
            if cleaned > 0 {
                debug!(cleaned, "swept expired pending logins");
            }
        }
    })
}
