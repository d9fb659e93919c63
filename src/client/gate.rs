//! Pending-call bookkeeping.
//!
//! The gate maps each outstanding correlation token to a oneshot completion
//! handle. Registering a call inserts an entry; a matching reply removes it
//! and wakes the waiting future. Replies whose token matches nothing —
//! stale after a timeout, or foreign altogether — are dropped silently by
//! contract with the remote service; the gate counts them so integrators
//! can observe the drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::CorrelationToken;

/// Acquire a mutex guard, intentionally ignoring poisoning.
///
/// The protected state is a best-effort pending-call map (token → oneshot
/// sender). There are no invariants spanning multiple fields, and the worst
/// outcome of a poisoned lock is a dropped or unmatched reply, which the
/// caller already has to tolerate. This also avoids propagating non-`Send`
/// poison errors across async boundaries.
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // ---
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

type PendingMap = HashMap<CorrelationToken, oneshot::Sender<Bytes>>;

/// Tracks calls waiting for their correlated reply.
pub(crate) struct CorrelationGate {
    // ---
    pending: Mutex<PendingMap>,
    stale: AtomicU64,
}

impl CorrelationGate {
    // ---

    pub fn new() -> Self {
        // ---
        Self {
            pending: Mutex::new(PendingMap::new()),
            stale: AtomicU64::new(0),
        }
    }

    /// Register a new outstanding call.
    ///
    /// Returns the receiver that resolves when the matching reply arrives.
    pub fn register(&self, token: CorrelationToken) -> oneshot::Receiver<Bytes> {
        // ---
        let (tx, rx) = oneshot::channel();
        lock_ignore_poison(&self.pending).insert(token, tx);
        rx
    }

    /// Deliver a reply to the call it correlates with.
    ///
    /// Returns `true` if the token matched an outstanding call. A `false`
    /// return is the stale-reply branch: the payload is dropped on the
    /// floor and only the counter records that it existed.
    pub fn complete(&self, token: &CorrelationToken, payload: Bytes) -> bool {
        // ---
        let tx = lock_ignore_poison(&self.pending).remove(token);

        match tx {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    // Caller gave up between removal and send; same outcome
                    // as a stale reply.
                    self.stale.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%token, "reply arrived after call was abandoned");
                    return false;
                }
                true
            }
            None => {
                self.stale.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%token, "dropping reply with no matching outstanding call");
                false
            }
        }
    }

    /// Remove an outstanding call without delivering a reply.
    ///
    /// Used for timeout cleanup; a reply arriving later takes the stale
    /// branch in [`complete`](Self::complete).
    pub fn abandon(&self, token: &CorrelationToken) -> bool {
        // ---
        lock_ignore_poison(&self.pending).remove(token).is_some()
    }

    /// Drop every outstanding completion handle.
    ///
    /// Called when the reply inbox closes; blocked callers observe
    /// `ReplyChannelClosed` instead of waiting on a dead session.
    pub fn fail_all(&self) {
        // ---
        lock_ignore_poison(&self.pending).clear();
    }

    /// Number of calls currently awaiting a reply.
    pub fn outstanding(&self) -> usize {
        // ---
        lock_ignore_poison(&self.pending).len()
    }

    /// Number of replies dropped because no outstanding call matched.
    pub fn stale_replies(&self) -> u64 {
        // ---
        self.stale.load(Ordering::Relaxed)
    }
}
