//! In-process single-flight coordinator.
//!
//! Concurrent callers that request the same logical operation — same
//! `(client_id, audience, scope)` key — share one execution and observe the
//! same settled result, success or failure, instead of each starting a new
//! network exchange.
//!
//! # Semantics
//!
//! - The first caller for a key becomes the **leader** and runs the
//!   operation; callers arriving while it is in flight become **followers**
//!   awaiting the leader's settled value over a `watch` channel.
//! - The in-flight record is removed when the operation settles, regardless
//!   of outcome, so a failed attempt never poisons subsequent calls.
//!   Removal is tied to a drop guard and therefore holds on every exit
//!   path, including leader cancellation.
//! - If the leader is cancelled before publishing, followers observe the
//!   closed channel and retry leadership with their own operation.

use std::{collections::HashMap, future::Future};

use parking_lot::Mutex;
use tokio::sync::watch;

/// Removes the in-flight record when dropped.
struct InflightGuard<'a, T> {
    inflight: &'a Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
    key: &'a str,
}

impl<T> Drop for InflightGuard<'_, T> {
    fn drop(&mut self) {
        self.inflight.lock().remove(self.key);
    }
}

/// Coalesces concurrent identical requests into one underlying operation.
///
/// `T` must be `Clone` so every coalesced caller can receive the settled
/// value; results are typically `Result<_, _>` with cloneable errors.
pub struct SingleFlight<T: Clone> {
    inflight: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self { inflight: Mutex::new(HashMap::new()) }
    }

    /// Runs `op` for `key`, unless an execution for `key` is already in
    /// flight, in which case the caller awaits that execution's result.
    pub async fn run<F, Fut>(&self, key: &str, op: F) -> T
    where
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            enum Role<T> {
                Leader(watch::Sender<Option<T>>),
                Follower(watch::Receiver<Option<T>>),
            }

            let role = {
                let mut inflight = self.inflight.lock();
                match inflight.get(key) {
                    Some(rx) => Role::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        inflight.insert(key.to_owned(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Leader(tx) => {
                    let guard = InflightGuard { inflight: &self.inflight, key };
                    let out = op().await;
                    drop(guard);
                    // Followers holding the receiver still observe the value
                    // after the record is gone; new callers start fresh.
                    let _ = tx.send(Some(out.clone()));
                    return out;
                }
                Role::Follower(mut rx) => {
                    loop {
                        let settled = rx.borrow_and_update().clone();
                        if let Some(value) = settled {
                            return value;
                        }
                        if rx.changed().await.is_err() {
                            // Leader went away without settling; contend for
                            // leadership and run the operation ourselves.
                            break;
                        }
                    }
                }
            }
        }
    }
}
