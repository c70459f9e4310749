//! Cancellation registry: one abort handle per in-flight request id.
//!
//! # How aborting works (for beginners)
//!
//! Every accepted request gets a `oneshot` channel.  The registry keeps the
//! sending half; the task running the local call keeps the receiving half
//! wrapped in an [`AbortSignal`] and races it against the call in a
//! `tokio::select!`.  Cancelling an id removes the sender and fires it, which
//! makes the call's task drop its HTTP future and stop.
//!
//! Removing an entry without firing it (see [`CancellationRegistry::complete`])
//! drops the sender; the signal then never resolves, so a call that is
//! emitting its final event is not cut short.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;
use tunnel_core::RequestId;

/// Errors raised by [`CancellationRegistry::register`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A call with this id is already in flight.
    #[error("request {0} is already in flight")]
    DuplicateId(RequestId),
}

/// Receiving half of one call's abort handle.
#[derive(Debug)]
pub struct AbortSignal(oneshot::Receiver<()>);

impl AbortSignal {
    /// Resolves once the call is cancelled.  Never resolves if the handle
    /// was completed instead.
    pub async fn aborted(&mut self) {
        if (&mut self.0).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Map from request id to the abort handle of its local call.
///
/// Entries are locked individually, so registering, cancelling and completing
/// different ids never contend with each other or block the event loop.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    calls: DashMap<RequestId, oneshot::Sender<()>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new in-flight call under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if `id` is already registered;
    /// the existing call is left untouched.
    pub fn register(&self, id: RequestId) -> Result<AbortSignal, RegistryError> {
        match self.calls.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(AbortSignal(rx))
            }
        }
    }

    /// Aborts and removes the call registered under `id`.
    ///
    /// Returns `false` if no such call is in flight.
    pub fn cancel(&self, id: RequestId) -> bool {
        match self.calls.remove(&id) {
            Some((_, tx)) => {
                // The call may have finished on its own in the meantime.
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Removes the call registered under `id` without aborting it.
    pub fn complete(&self, id: RequestId) -> bool {
        self.calls.remove(&id).is_some()
    }

    /// Aborts and removes every registered call.  Returns how many there were.
    pub fn clear(&self) -> usize {
        let ids: Vec<RequestId> = self.calls.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.calls.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
