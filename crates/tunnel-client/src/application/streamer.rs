//! Response streamer: turns one local HTTP call into relay events.
//!
//! # Lifecycle
//!
//! ```text
//! Dispatched ──headers──► HeadersSent ──chunk──► Streaming ──end──► Completed
//!     │                        │                     │
//!     └────── error / timeout ─┴─────────────────────┴────────────► Failed
//!
//! any state ──cancel / disconnect──► Aborted   (nothing further is emitted)
//! ```
//!
//! What reaches the relay for one id:
//!
//! | Outcome                      | Events                                            |
//! |------------------------------|---------------------------------------------------|
//! | success                      | `responseHeader`, `responseContentBinary`*, `responseFinished` |
//! | failure before headers       | `responseError`                                   |
//! | failure after headers        | `responseHeader`, `responseContentBinary`*, `responseFinished` |
//! | aborted                      | whatever was already sent, nothing more           |
//!
//! All events for one id are pushed by a single task, one after the other,
//! onto the connection's FIFO outbound queue, so the relay sees them in
//! emission order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use tunnel_core::{OrderedMap, OutboundEvent, RequestId};

use crate::application::emitter::RelayEmitter;
use crate::application::ports::{LocalCall, LocalCallError, LocalHttpClient};
use crate::application::registry::{AbortSignal, CancellationRegistry};

/// Reason reported in `responseError` when the ceiling expires before headers.
pub const TIMEOUT_REASON: &str = "timeout";

/// Where one call currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Dispatched,
    HeadersSent,
    Streaming,
    Completed,
    Failed,
    Aborted,
    /// Never started: the call could not be constructed.
    Discarded,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallState::Completed | CallState::Failed | CallState::Aborted | CallState::Discarded
        )
    }
}

/// Emits the relay events of one call.
///
/// Header emission is guarded by an atomic flag so that `responseHeader` goes
/// out at most once per id, whichever path reaches it first.
#[derive(Debug)]
pub struct ResponseStreamer {
    id: RequestId,
    emitter: RelayEmitter,
    registry: Arc<CancellationRegistry>,
    headers_sent: AtomicBool,
    state: Mutex<CallState>,
}

impl ResponseStreamer {
    pub fn new(id: RequestId, emitter: RelayEmitter, registry: Arc<CancellationRegistry>) -> Self {
        Self {
            id,
            emitter,
            registry,
            headers_sent: AtomicBool::new(false),
            state: Mutex::new(CallState::Dispatched),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn state(&self) -> CallState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: CallState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }

    async fn emit(&self, event: OutboundEvent) {
        if !self.emitter.emit(event).await {
            debug!(id = %self.id, "relay connection closed; event dropped");
        }
    }

    /// Emits `responseHeader`.  Returns `false` (and emits nothing) if the
    /// headers for this id were already sent.
    ///
    /// Repeated header names collapse to their last value.
    pub async fn on_headers(&self, status: u16, headers: Vec<(String, String)>) -> bool {
        if self.headers_sent.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut map = OrderedMap::new();
        for (name, value) in headers {
            map.insert(name, value);
        }
        self.set_state(CallState::HeadersSent);
        self.emit(OutboundEvent::ResponseHeader {
            id: self.id,
            headers: map,
            status_code: status,
        })
        .await;
        true
    }

    /// Emits one body chunk.  Empty chunks are skipped.
    pub async fn on_content(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.set_state(CallState::Streaming);
        self.emit(OutboundEvent::ResponseContentBinary {
            id: self.id,
            body: chunk.to_vec(),
        })
        .await;
    }

    /// Removes the id from the registry and emits `responseFinished`.
    pub async fn on_complete(&self) {
        self.registry.complete(self.id);
        self.set_state(CallState::Completed);
        self.emit(OutboundEvent::ResponseFinished { id: self.id }).await;
    }

    /// Removes the id from the registry and emits the single terminal event
    /// for a failed call: `responseError` if no header went out yet,
    /// `responseFinished` otherwise.
    pub async fn on_failure(&self, reason: &str) {
        self.registry.complete(self.id);
        self.set_state(CallState::Failed);
        let event = if self.headers_sent() {
            OutboundEvent::ResponseFinished { id: self.id }
        } else {
            OutboundEvent::ResponseError {
                id: self.id,
                reason: reason.to_string(),
            }
        };
        self.emit(event).await;
    }

    /// Marks the call aborted.  Emits nothing; the registry entry is already
    /// gone.
    pub fn abort(&self) {
        self.set_state(CallState::Aborted);
    }

    /// Drops a call that never started: removes the id, emits nothing.
    pub fn discard(&self) {
        self.registry.complete(self.id);
        self.set_state(CallState::Discarded);
    }
}

// ── Call driver ───────────────────────────────────────────────────────────────

/// Runs one local call to its end and returns the final state.
///
/// The call races against its abort signal (checked first on every wake-up).
/// `ceiling` bounds the time spent waiting on the local service, from
/// dispatch to the last body byte.  Queueing an event onto the relay
/// connection is never cut short by it, so an event the relay has not seen
/// is never treated as sent.
pub async fn run_call(
    client: Arc<dyn LocalHttpClient>,
    call: LocalCall,
    streamer: ResponseStreamer,
    mut signal: AbortSignal,
    ceiling: Duration,
) -> CallState {
    let deadline = Instant::now() + ceiling;

    tokio::select! {
        biased;
        _ = signal.aborted() => {
            debug!(id = %streamer.id(), "local call aborted");
            streamer.abort();
        }
        _ = drive_call(&*client, call, &streamer, deadline) => {}
    }

    streamer.state()
}

async fn drive_call(
    client: &dyn LocalHttpClient,
    call: LocalCall,
    streamer: &ResponseStreamer,
    deadline: Instant,
) {
    let id = call.id;
    let response = match timeout_at(deadline, client.send(call)).await {
        Err(_) => {
            warn!(%id, "local call timed out before headers");
            streamer.on_failure(TIMEOUT_REASON).await;
            return;
        }
        Ok(Ok(response)) => response,
        Ok(Err(LocalCallError::Construction(msg))) => {
            warn!(%id, "cannot build local call: {msg}");
            streamer.discard();
            return;
        }
        Ok(Err(e)) => {
            warn!(%id, "local call failed: {e}");
            streamer.on_failure(&e.to_string()).await;
            return;
        }
    };

    debug!(%id, status = response.status, "local response headers received");
    streamer.on_headers(response.status, response.headers).await;

    let mut body = response.body;
    loop {
        match timeout_at(deadline, body.next()).await {
            Err(_) => {
                warn!(%id, "local response body timed out");
                streamer.on_failure(TIMEOUT_REASON).await;
                return;
            }
            Ok(None) => break,
            Ok(Some(Ok(bytes))) => streamer.on_content(bytes).await,
            Ok(Some(Err(e))) => {
                warn!(%id, "local response body failed: {e}");
                streamer.on_failure(&e.to_string()).await;
                return;
            }
        }
    }

    streamer.on_complete().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
