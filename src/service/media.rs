//! Bookkeeping for side-channel media fetches.
//!
//! The session runs at most one photo fetch and one video stream at a
//! time. Each [`FetchSlot`] remembers the task currently filling it, keyed
//! by a generation counter so that a finishing fetch never clears a slot
//! a newer fetch has since taken over.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::domain::TransactionId;

#[derive(Debug)]
struct ActiveFetch {
    generation: u64,
    transaction_id: TransactionId,
    abort: AbortHandle,
}

#[derive(Debug, Default)]
struct SlotState {
    generation: u64,
    active: Option<ActiveFetch>,
}

/// Holds at most one in-flight fetch.
#[derive(Debug, Default)]
pub struct FetchSlot {
    state: Mutex<SlotState>,
}

impl FetchSlot {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the fetch built by `make` and makes it the slot's current one.
    ///
    /// `make` receives the generation to pass back to [`FetchSlot::finish`].
    /// A fetch already in the slot is aborted.
    pub fn start<F>(
        &self,
        transaction_id: TransactionId,
        runtime: &Handle,
        make: impl FnOnce(u64) -> F,
    ) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state();
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let task = runtime.spawn(make(generation));
        if let Some(previous) = state.active.replace(ActiveFetch {
            generation,
            transaction_id,
            abort: task.abort_handle(),
        }) {
            previous.abort.abort();
            tracing::debug!(
                replaced = %previous.transaction_id,
                %transaction_id,
                "media fetch replaced"
            );
        }
        generation
    }

    /// Clears the slot if `generation` still owns it.
    pub fn finish(&self, generation: u64) -> bool {
        let mut state = self.state();
        let owns = state
            .active
            .as_ref()
            .is_some_and(|active| active.generation == generation);
        if owns {
            state.active = None;
        }
        owns
    }

    /// Aborts and clears the fetch for `transaction_id`, if it owns the slot.
    pub fn release(&self, transaction_id: TransactionId) -> bool {
        let mut state = self.state();
        let owns = state
            .active
            .as_ref()
            .is_some_and(|active| active.transaction_id == transaction_id);
        if !owns {
            return false;
        }
        if let Some(active) = state.active.take() {
            active.abort.abort();
        }
        true
    }

    /// Returns the transaction currently owning the slot.
    #[must_use]
    pub fn current(&self) -> Option<TransactionId> {
        self.state().active.as_ref().map(|a| a.transaction_id)
    }

    /// Returns `true` while a fetch owns the slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state().active.is_some()
    }
}

/// The photo and video slots of one session.
#[derive(Debug, Default)]
pub struct MediaSlots {
    /// Photo downloads.
    pub photo: FetchSlot,
    /// Video streams.
    pub video: FetchSlot,
}

impl MediaSlots {
    /// Aborts any fetch owned by `transaction_id`.
    pub fn release(&self, transaction_id: TransactionId) -> bool {
        let photo = self.photo.release(transaction_id);
        let video = self.video.release(transaction_id);
        if photo || video {
            tracing::debug!(%transaction_id, "media fetch aborted");
        }
        photo || video
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn finish_clears_current_generation() {
        let slot = FetchSlot::default();
        let id = TransactionId::new();
        let generation = slot.start(id, &Handle::current(), |_| async {});
        assert_eq!(slot.current(), Some(id));
        assert!(slot.finish(generation));
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn stale_finish_does_not_clear_newer_fetch() {
        let slot = FetchSlot::default();
        let first = TransactionId::new();
        let second = TransactionId::new();
        let old = slot.start(first, &Handle::current(), |_| async {});
        let new = slot.start(second, &Handle::current(), |_| async {});
        assert_ne!(old, new);

        assert!(!slot.finish(old));
        assert_eq!(slot.current(), Some(second));
        assert!(slot.finish(new));
        assert!(!slot.finish(new));
    }

    #[tokio::test]
    async fn release_aborts_running_fetch() {
        let slot = FetchSlot::default();
        let id = TransactionId::new();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let completed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&completed);

        slot.start(id, &Handle::current(), move |_| async move {
            let _ = started_tx.send(());
            futures_util::future::pending::<()>().await;
            flag.store(true, Ordering::SeqCst);
        });
        let _ = started_rx.await;

        assert!(!slot.release(TransactionId::new()));
        assert!(slot.release(id));
        assert!(!slot.is_active());
        tokio::task::yield_now().await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn replacing_aborts_previous_fetch() {
        let slot = FetchSlot::default();
        let first = TransactionId::new();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (dropped_tx, dropped_rx) = oneshot::channel::<()>();

        struct OnDrop(Option<oneshot::Sender<()>>);
        impl Drop for OnDrop {
            fn drop(&mut self) {
                if let Some(tx) = self.0.take() {
                    let _ = tx.send(());
                }
            }
        }

        slot.start(first, &Handle::current(), move |_| async move {
            let _guard = OnDrop(Some(dropped_tx));
            let _ = started_tx.send(());
            futures_util::future::pending::<()>().await;
        });
        let _ = started_rx.await;

        let second = TransactionId::new();
        slot.start(second, &Handle::current(), |_| async {
            futures_util::future::pending::<()>().await;
        });
        assert!(dropped_rx.await.is_ok());
        assert_eq!(slot.current(), Some(second));
        assert!(!slot.release(first));
        assert!(slot.release(second));
    }

    #[tokio::test]
    async fn slots_release_either_kind() {
        let slots = MediaSlots::default();
        let id = TransactionId::new();
        slots.video.start(id, &Handle::current(), |_| async {});
        assert!(slots.release(id));
        assert!(!slots.video.is_active());
        assert!(!slots.release(id));
    }
}
