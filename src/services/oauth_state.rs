//! OAuth Connect-Flow State Store
//!
//! Time-bounded in-memory store for transient OAuth state tokens issued
//! during the repository connect flow. Explicitly owned and injected through
//! the application state; a background sweep task with a watch-channel
//! shutdown removes expired entries. Tokens are single-use: a claim removes
//! the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::watch;
use tracing::{debug, info};

/// Payload carried by one pending connect flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthState {
    /// Where to send the browser after the flow completes
    pub return_to: Option<String>,
}

struct Entry {
    state: OAuthState,
    issued_at: Instant,
}

/// Injected store for transient OAuth state
#[derive(Clone)]
pub struct OAuthStateStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Issue a fresh single-use state token.
    pub fn issue(&self, state: OAuthState) -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.entries.lock().expect("state lock").insert(
            token.clone(),
            Entry {
                state,
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Claim a token, removing it. Returns `None` for unknown, already
    /// claimed, or expired tokens.
    pub fn claim(&self, token: &str) -> Option<OAuthState> {
        let mut entries = self.entries.lock().expect("state lock");
        let entry = entries.remove(token)?;
        if entry.issued_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.state)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("state lock");
        let before = entries.len();
        entries.retain(|_, entry| entry.issued_at.elapsed() <= self.ttl);
        before - entries.len()
    }

    /// Start the periodic sweep task.
    ///
    /// Returns a shutdown sender; dropping it or sending `true` stops the
    /// task. Tied to the service lifecycle in `main`, not a module-level
    /// singleton.
    pub fn start_sweeper(&self, interval: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let store = self.clone();

        tokio::spawn(async move {
            info!(?interval, "starting OAuth state sweeper");
            let mut timer = tokio::time::interval(interval);
            timer.tick().await; // skip the immediate first tick

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let removed = store.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired OAuth states");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("OAuth state sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(return_to: Option<&str>) -> OAuthState {
        OAuthState {
            return_to: return_to.map(str::to_string),
        }
    }

    #[test]
    fn issue_then_claim_round_trips() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        let token = store.issue(state(Some("/settings")));

        let claimed = store.claim(&token).expect("claim");
        assert_eq!(claimed.return_to.as_deref(), Some("/settings"));
    }

    #[test]
    fn tokens_are_single_use() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        let token = store.issue(state(None));

        assert!(store.claim(&token).is_some());
        assert!(store.claim(&token).is_none());
    }

    #[test]
    fn unknown_token_is_rejected() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        assert!(store.claim("deadbeef").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let store = OAuthStateStore::new(Duration::ZERO);
        let token = store.issue(state(None));
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.claim(&token).is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = OAuthStateStore::new(Duration::from_millis(20));
        let old = store.issue(state(None));
        std::thread::sleep(Duration::from_millis(30));
        let fresh = store.issue(state(None));

        assert_eq!(store.sweep_expired(), 1);
        assert!(store.claim(&old).is_none());
        assert!(store.claim(&fresh).is_some());
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let store = OAuthStateStore::new(Duration::from_secs(60));
        let shutdown = store.start_sweeper(Duration::from_millis(10));

        shutdown.send(true).expect("send shutdown");
        // Give the task a moment to observe the signal and exit.
        tokio::time::sleep(Duration::from_millis(30)).await;
    }
}
