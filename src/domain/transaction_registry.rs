//! Concurrent storage of in-flight transactions.
//!
//! [`TransactionRegistry`] maps each [`TransactionId`] to its pending
//! callback state. It is shared between the thread issuing commands and
//! the transport's delivery thread. Registration, resolution and
//! cancellation all go through one map lock, and every callback runs
//! after that lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::TransactionId;
use super::callback_info::{CallbackInfo, ResultKind};
use super::dispatcher::{Delivery, Dispatch};
use crate::error::ToolkitError;

/// Lifetime of a registered transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Resolved at most once, then removed.
    SingleShot,
    /// Delivered any number of times until removed.
    Standing,
}

/// What [`TransactionRegistry::resolve`] did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The callback was invoked.
    Delivered,
    /// The payload did not match the expected kind; nothing was invoked
    /// and the entry was left in place.
    Mismatched,
    /// No entry for the id (never registered, already resolved or cancelled).
    Unknown,
}

type SharedDispatch = Arc<Mutex<Box<dyn Dispatch>>>;

/// One registered transaction.
#[derive(Debug)]
struct PendingTransaction {
    expected: ResultKind,
    kind: TransactionKind,
    created_at: DateTime<Utc>,
    callback: SharedDispatch,
}

/// Lightweight view of a pending transaction for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    /// Transaction identifier.
    pub transaction_id: TransactionId,
    /// Expected result kind.
    pub expected: ResultKind,
    /// Single-shot or standing.
    pub kind: TransactionKind,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

/// Central store for all pending transactions.
///
/// # Concurrency
///
/// - `register`, `resolve`, `reject` and `remove` may be called from any
///   thread.
/// - A single-shot entry is taken out of the map before its callback runs,
///   so it fires at most once no matter how resolve and cancel interleave.
/// - Deliveries to one standing subscription are serialized by a
///   per-entry lock.
#[derive(Debug, Default)]
pub struct TransactionRegistry {
    pending: Mutex<HashMap<TransactionId, PendingTransaction>>,
}

impl TransactionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<TransactionId, PendingTransaction>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a callback and returns its freshly allocated id.
    pub fn register(&self, callback: Box<dyn Dispatch>, kind: TransactionKind) -> TransactionId {
        self.register_with(kind, |_| callback)
    }

    /// Registers a callback built from its own transaction id.
    ///
    /// `make` runs while the registry is locked and must not call back
    /// into the registry.
    pub fn register_with(
        &self,
        kind: TransactionKind,
        make: impl FnOnce(TransactionId) -> Box<dyn Dispatch>,
    ) -> TransactionId {
        let mut map = self.map();
        let mut transaction_id = TransactionId::new();
        while map.contains_key(&transaction_id) {
            transaction_id = TransactionId::new();
        }
        let callback = make(transaction_id);
        let expected = callback.expected();
        map.insert(
            transaction_id,
            PendingTransaction {
                expected,
                kind,
                created_at: Utc::now(),
                callback: Arc::new(Mutex::new(callback)),
            },
        );
        drop(map);

        tracing::debug!(%transaction_id, %expected, ?kind, "transaction registered");
        transaction_id
    }

    /// Delivers a decoded payload or error to the transaction's callback.
    ///
    /// Single-shot entries are removed before the callback runs; standing
    /// entries are kept. Unknown ids are dropped silently.
    pub fn resolve(
        &self,
        transaction_id: TransactionId,
        outcome: Result<CallbackInfo, ToolkitError>,
    ) -> Resolution {
        let mut map = self.map();
        let Some((expected, kind, callback)) = map
            .get(&transaction_id)
            .map(|e| (e.expected, e.kind, Arc::clone(&e.callback)))
        else {
            return Resolution::Unknown;
        };

        if let Ok(info) = &outcome
            && info.kind() != expected
        {
            tracing::debug!(
                %transaction_id,
                %expected,
                actual = %info.kind(),
                "dropping mismatched payload"
            );
            return Resolution::Mismatched;
        }

        if kind == TransactionKind::SingleShot {
            map.remove(&transaction_id);
        }
        drop(map);

        invoke(&callback, outcome)
    }

    /// Removes the transaction and hands it an error, whatever its kind.
    ///
    /// Returns `false` if the id was not registered.
    pub fn reject(&self, transaction_id: TransactionId, error: ToolkitError) -> bool {
        let removed = self.map().remove(&transaction_id);
        let Some(entry) = removed else {
            return false;
        };
        tracing::debug!(%transaction_id, %error, "transaction rejected");
        invoke(&entry.callback, Err(error));
        true
    }

    /// Removes a transaction without invoking its callback.
    ///
    /// Idempotent; returns `true` if an entry was removed.
    pub fn remove(&self, transaction_id: TransactionId) -> bool {
        let removed = self.map().remove(&transaction_id).is_some();
        if removed {
            tracing::debug!(%transaction_id, "transaction removed");
        }
        removed
    }

    /// Returns the kind the transaction expects, if it is pending.
    #[must_use]
    pub fn expected_kind(&self, transaction_id: TransactionId) -> Option<ResultKind> {
        self.map().get(&transaction_id).map(|e| e.expected)
    }

    /// Returns `true` if the transaction is pending.
    #[must_use]
    pub fn contains(&self, transaction_id: TransactionId) -> bool {
        self.map().contains_key(&transaction_id)
    }

    /// Returns summaries of all pending transactions, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSummary> {
        let map = self.map();
        let mut summaries: Vec<PendingSummary> = map
            .iter()
            .map(|(id, entry)| PendingSummary {
                transaction_id: *id,
                expected: entry.expected,
                kind: entry.kind,
                created_at: entry.created_at,
            })
            .collect();
        drop(map);
        summaries.sort_by_key(|s| s.created_at);
        summaries
    }

    /// Returns the ids of all pending transactions.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<TransactionId> {
        self.map().keys().copied().collect()
    }

    /// Returns the number of pending transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    /// Returns `true` if no transaction is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

fn invoke(callback: &SharedDispatch, outcome: Result<CallbackInfo, ToolkitError>) -> Resolution {
    let mut dispatch = callback.lock().unwrap_or_else(PoisonError::into_inner);
    match dispatch.execute(outcome) {
        Delivery::Delivered => Resolution::Delivered,
        Delivery::Mismatched => Resolution::Mismatched,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::callback_info::{LookAtAchievedInfo, MotionInfo};
    use crate::domain::dispatcher::Callback;

    fn counting<T: crate::domain::ResultPayload>() -> (Arc<AtomicUsize>, Box<dyn Dispatch>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let cb = Callback::<T>::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (hits, Box::new(cb))
    }

    fn motion() -> CallbackInfo {
        CallbackInfo::Motion(MotionInfo::default())
    }

    #[test]
    fn ids_are_pairwise_distinct() {
        let registry = TransactionRegistry::new();
        let mut ids = HashSet::new();
        for _ in 0..500 {
            let (_, cb) = counting::<MotionInfo>();
            ids.insert(registry.register(cb, TransactionKind::SingleShot));
        }
        assert_eq!(ids.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn single_shot_fires_once_then_is_gone() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<MotionInfo>();
        let id = registry.register(cb, TransactionKind::SingleShot);

        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Delivered);
        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Unknown);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn standing_fires_until_removed() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<MotionInfo>();
        let id = registry.register(cb, TransactionKind::Standing);

        for _ in 0..3 {
            assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Delivered);
        }
        assert!(registry.remove(id));
        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Unknown);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remove_then_resolve_never_fires() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<MotionInfo>();
        let id = registry.register(cb, TransactionKind::SingleShot);
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Unknown);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn mismatched_payload_leaves_entry_pending() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<LookAtAchievedInfo>();
        let id = registry.register(cb, TransactionKind::SingleShot);
        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Mismatched);
        assert!(registry.contains(id));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let look = CallbackInfo::LookAtAchieved(LookAtAchievedInfo::default());
        assert_eq!(registry.resolve(id, Ok(look)), Resolution::Delivered);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reject_removes_standing_entries_too() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<MotionInfo>();
        let id = registry.register(cb, TransactionKind::Standing);
        assert!(registry.reject(id, ToolkitError::TransportSend("down".to_string())));
        assert!(!registry.contains(id));
        assert!(!registry.reject(id, ToolkitError::NotConnected));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_resolve_single_shot() {
        let registry = TransactionRegistry::new();
        let (hits, cb) = counting::<LookAtAchievedInfo>();
        let id = registry.register(cb, TransactionKind::SingleShot);
        let resolution = registry.resolve(id, Err(ToolkitError::Internal("x".to_string())));
        assert_eq!(resolution, Resolution::Delivered);
        assert!(registry.is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resolve_racing_remove_fires_at_most_once() {
        for _ in 0..200 {
            let registry = Arc::new(TransactionRegistry::new());
            let (hits, cb) = counting::<MotionInfo>();
            let id = registry.register(cb, TransactionKind::SingleShot);

            let resolver = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.resolve(id, Ok(motion())))
            };
            let canceller = {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.remove(id))
            };
            let Ok(resolution) = resolver.join() else {
                panic!("resolver thread panicked");
            };
            let Ok(removed) = canceller.join() else {
                panic!("canceller thread panicked");
            };

            let fired = hits.load(Ordering::SeqCst);
            assert!(fired <= 1);
            assert_eq!(fired == 1, resolution == Resolution::Delivered);
            assert_ne!(removed, resolution == Resolution::Delivered);
            assert!(registry.is_empty());
        }
    }

    #[test]
    fn callback_may_cancel_its_own_subscription() {
        let registry = Arc::new(TransactionRegistry::new());
        let slot: Arc<Mutex<Option<TransactionId>>> = Arc::new(Mutex::new(None));
        let cb = {
            let registry = Arc::clone(&registry);
            let slot = Arc::clone(&slot);
            Callback::<MotionInfo>::new(move |_| {
                let id = slot.lock().ok().and_then(|g| *g);
                if let Some(id) = id {
                    registry.remove(id);
                }
            })
        };
        let id = registry.register(Box::new(cb), TransactionKind::Standing);
        if let Ok(mut guard) = slot.lock() {
            *guard = Some(id);
        }
        assert_eq!(registry.resolve(id, Ok(motion())), Resolution::Delivered);
        assert!(!registry.contains(id));
    }

    #[test]
    fn pending_lists_summaries() {
        let registry = TransactionRegistry::new();
        let (_, a) = counting::<MotionInfo>();
        let (_, b) = counting::<LookAtAchievedInfo>();
        let first = registry.register(a, TransactionKind::Standing);
        registry.register(b, TransactionKind::SingleShot);
        let pending = registry.pending();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().any(|p| p.transaction_id == first
            && p.kind == TransactionKind::Standing
            && p.expected == ResultKind::Motion));
        assert_eq!(registry.expected_kind(first), Some(ResultKind::Motion));
    }
}
