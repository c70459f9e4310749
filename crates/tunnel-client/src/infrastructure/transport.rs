//! Relay transport: the connection loop that drives a [`TunnelClient`].
//!
//! This module is responsible for:
//!
//! 1. Opening the relay WebSocket (see [`crate::infrastructure::relay_conn`]).
//! 2. Speaking the Engine.IO / Socket.IO handshake: wait for the open packet,
//!    join the default namespace, wait for the acknowledgement.
//! 3. Answering server pings and declaring the connection dead when the
//!    server goes quiet for longer than `pingInterval + pingTimeout`.
//! 4. Handing every inbound event to the client's router.
//! 5. Running one writer task that drains the outbound queue in FIFO order.
//! 6. Reporting connect / disconnect edges to the session.
//! 7. Reconnecting after `reconnect_delay` until the `running` flag clears.
//!
//! # Tasks per connection
//!
//! ```text
//!  reader (this task) ──control──┐
//!                                ├──► writer task ──► WebSocket sink
//!  request tasks ──outbound──────┘
//! ```
//!
//! Control frames (namespace connect, pongs) take priority over queued
//! events.  Events for one request id are pushed by a single task, so the
//! writer preserves their order.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{anyhow, Context};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};
use tunnel_core::protocol::{decode_packet, encode_outbound, Frame, Packet};
use tunnel_core::OutboundEvent;

use crate::application::{RelayEmitter, TunnelClient};
use crate::infrastructure::relay_conn::connect_relay;

/// How often blocking waits wake up to check the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Liveness window used until the open packet announces the real one.
const DEFAULT_LIVENESS: Duration = Duration::from_secs(45);

/// Capacity of the control channel (namespace connect, pongs).
const CONTROL_CAPACITY: usize = 16;

// ── Public API ────────────────────────────────────────────────────────────────

/// Starts the transport on its own task and returns immediately.
///
/// The task connects, reconnects after failures, and returns once `running`
/// is cleared.
pub fn connect(client: TunnelClient, running: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(run_transport(client, running))
}

/// Runs the connect / reconnect loop until `running` is cleared.
pub async fn run_transport(client: TunnelClient, running: Arc<AtomicBool>) {
    let delay = client.config().reconnect_delay;

    while running.load(Ordering::Relaxed) {
        match run_connection(&client, &running).await {
            Ok(()) => info!("relay connection closed"),
            Err(e) => warn!("relay connection failed: {e:#}"),
        }
        client.session().on_disconnected();

        if running.load(Ordering::Relaxed) {
            debug!(?delay, "waiting before reconnecting");
            wait_while_running(delay, &running).await;
        }
    }

    client.session().on_disconnected();
    info!("relay transport stopped");
}

/// Sleeps for `delay`, waking every [`POLL_INTERVAL`] to check `running`.
async fn wait_while_running(delay: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + delay;
    while running.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep((deadline - now).min(POLL_INTERVAL)).await;
    }
}

// ── One connection ────────────────────────────────────────────────────────────

/// Runs one relay connection from handshake to close.
///
/// Returns `Ok(())` on an orderly close (relay close packet, WebSocket close,
/// shutdown) and an error for everything else.  The session is always told
/// about the disconnect before this returns.
async fn run_connection(client: &TunnelClient, running: &AtomicBool) -> anyhow::Result<()> {
    let config = Arc::clone(client.config());
    let stream = connect_relay(&config).await?;
    info!(relay = %config.relay_url, "relay WebSocket established");

    let (ws_tx, ws_rx) = stream.split();
    let (control_tx, control_rx) = mpsc::channel::<String>(CONTROL_CAPACITY);
    let (emitter, outbound_rx) = RelayEmitter::channel(config.outbound_queue_capacity);

    let writer = tokio::spawn(write_frames(ws_tx, control_rx, outbound_rx));

    let result = read_packets(client, running, ws_rx, control_tx, emitter, &writer).await;

    // Detaches the emitter, so the writer's queue closes once the request
    // tasks holding clones are aborted.
    client.session().on_disconnected();
    writer.abort();
    result
}

/// Reader loop: decodes inbound frames and reacts to each packet.
async fn read_packets<S>(
    client: &TunnelClient,
    running: &AtomicBool,
    mut ws_rx: S,
    control_tx: mpsc::Sender<String>,
    emitter: RelayEmitter,
    writer: &JoinHandle<anyhow::Result<()>>,
) -> anyhow::Result<()>
where
    S: futures_util::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    let mut pending_emitter = Some(emitter);
    let mut liveness = DEFAULT_LIVENESS;
    let mut last_seen = Instant::now();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; closing relay connection");
            return Ok(());
        }
        if writer.is_finished() {
            return Err(anyhow!("relay writer stopped"));
        }
        if last_seen.elapsed() > liveness {
            return Err(anyhow!("no traffic from relay for {liveness:?}"));
        }

        // Short timeout so the loop can check the flags above even when the
        // relay is silent.
        let message = match timeout(POLL_INTERVAL, ws_rx.next()).await {
            Err(_) => continue,
            Ok(None) => return Ok(()),
            Ok(Some(Err(WsError::ConnectionClosed))) => return Ok(()),
            Ok(Some(Err(e))) => return Err(e).context("relay read failed"),
            Ok(Some(Ok(message))) => message,
        };
        last_seen = Instant::now();

        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(frame) => {
                debug!(?frame, "relay sent WebSocket close");
                return Ok(());
            }
            WsMessage::Binary(data) => {
                warn!(len = data.len(), "unexpected binary frame from relay (ignored)");
                continue;
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        let packet = match decode_packet(&text) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("dropping undecodable relay frame: {e}");
                continue;
            }
        };

        match packet {
            Packet::Open(info) => {
                liveness = Duration::from_millis(info.ping_interval + info.ping_timeout);
                debug!(sid = %info.sid, ?liveness, "engine.io session opened");
                send_control(&control_tx, &Packet::Connect(None)).await?;
            }
            Packet::Ping => send_control(&control_tx, &Packet::Pong).await?,
            Packet::Pong | Packet::Noop => {}
            Packet::Connect(ack) => match pending_emitter.take() {
                Some(emitter) => client.session().on_connected(emitter, announced_scheme(ack.as_ref())),
                None => debug!("duplicate namespace acknowledgement ignored"),
            },
            Packet::Event { name, payload } => {
                let outcome = client.router().route_event(&name, payload);
                debug!(event = %name, ?outcome, "relay event routed");
            }
            Packet::ConnectError(reason) => {
                return Err(anyhow!("relay refused the connection: {reason}"));
            }
            Packet::Close | Packet::Disconnect => {
                info!("relay closed the session");
                return Ok(());
            }
        }
    }
}

/// Public scheme announced in the namespace acknowledgement, if any.
fn announced_scheme(ack: Option<&Value>) -> Option<String> {
    ack.and_then(|v| v.get("protocol"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn send_control(control_tx: &mpsc::Sender<String>, packet: &Packet) -> anyhow::Result<()> {
    let text = packet.encode()?;
    control_tx
        .send(text)
        .await
        .map_err(|_| anyhow!("relay writer stopped"))
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes control frames and queued events to the relay until both channels
/// close or a write fails.
async fn write_frames<S>(
    mut sink: S,
    mut control_rx: mpsc::Receiver<String>,
    mut outbound_rx: mpsc::Receiver<OutboundEvent>,
) -> anyhow::Result<()>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    loop {
        let frames = tokio::select! {
            biased;
            Some(text) = control_rx.recv() => vec![Frame::Text(text)],
            Some(event) = outbound_rx.recv() => match encode_outbound(&event) {
                Ok(frames) => frames,
                Err(e) => {
                    error!(event = event.name(), "cannot encode outbound event: {e}");
                    continue;
                }
            },
            else => break,
        };

        for frame in frames {
            let message = match frame {
                Frame::Text(text) => WsMessage::Text(text),
                Frame::Binary(data) => WsMessage::Binary(data),
            };
            if let Err(e) = sink.send(message).await {
                error!("relay write failed: {e}");
                return Err(e).context("relay write failed");
            }
        }
    }

    let _ = sink.close().await;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
