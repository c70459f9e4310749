//! Relay tunnel client entry point.
//!
//! This binary keeps one outbound WebSocket connection to a public relay and
//! replays the HTTP requests the relay forwards against a service that is
//! only reachable on the private network.
//!
//! # Why an outbound tunnel?
//!
//! The local service sits behind NAT or a firewall and cannot accept inbound
//! connections from the internet.  The client dials out instead; the relay
//! pushes requests down that connection and receives the responses back.
//!
//! # Usage
//!
//! ```text
//! tunnel-client [OPTIONS] --uuid <UUID> --secret <SECRET>
//!
//! Options:
//!   --relay-url <URL>          Relay base address [default: https://myopenhab.org/]
//!   --local-url <URL>          Local service base address [default: http://127.0.0.1:8080/]
//!   --uuid <UUID>              Instance id registered with the relay
//!   --secret <SECRET>          Shared secret registered with the relay
//!   --no-remote-access         Refuse proxied HTTP requests
//!   --host-version <VERSION>   Version of the host automation system [default: unknown]
//!   --request-timeout <SECS>   Ceiling on one local call [default: 30]
//!   --max-connections <N>      Concurrent local connections [default: 200]
//!   --reconnect-delay <SECS>   Pause before reconnecting [default: 5]
//!   --expose <ITEM>            Item the relay may command (repeatable)
//!   --item <NAME:KIND[:STATE]> Item to seed the in-memory registry with (repeatable)
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable                  | Default                    | Description                   |
//! |---------------------------|----------------------------|-------------------------------|
//! | `TUNNEL_RELAY_URL`        | `https://myopenhab.org/`   | Relay base address            |
//! | `TUNNEL_LOCAL_URL`        | `http://127.0.0.1:8080/`   | Local service base address    |
//! | `TUNNEL_UUID`             | (required)                 | Instance id                   |
//! | `TUNNEL_SECRET`           | (required)                 | Shared secret                 |
//! | `TUNNEL_NO_REMOTE_ACCESS` | `false`                    | Refuse proxied requests       |
//! | `TUNNEL_HOST_VERSION`     | `unknown`                  | Host version header           |
//! | `TUNNEL_REQUEST_TIMEOUT`  | `30`                       | Local call ceiling (secs)     |
//! | `TUNNEL_MAX_CONNECTIONS`  | `200`                      | Local connection cap          |
//! | `TUNNEL_RECONNECT_DELAY`  | `5`                        | Reconnect pause (secs)        |
//! | `TUNNEL_EXPOSE`           | (none)                     | Comma-separated exposed items |

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;
use uuid::Uuid;

use tunnel_client::application::TunnelClient;
use tunnel_client::domain::{Credentials, TunnelConfig};
use tunnel_client::infrastructure::{connect, InMemoryItemRegistry, ReqwestLocalClient};
use tunnel_core::{ItemKind, ItemSnapshot, ItemState};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relay tunnel client.
///
/// Connects to the relay and proxies its requests to the local service.
#[derive(Debug, Parser)]
#[command(
    name = "tunnel-client",
    about = "Outbound relay tunnel for a private HTTP service",
    version
)]
struct Cli {
    /// Base address of the relay.
    #[arg(long, default_value = "https://myopenhab.org/", env = "TUNNEL_RELAY_URL")]
    relay_url: String,

    /// Base address of the local service requests are replayed against.
    #[arg(long, default_value = "http://127.0.0.1:8080/", env = "TUNNEL_LOCAL_URL")]
    local_url: String,

    /// Instance id registered with the relay.
    #[arg(long, env = "TUNNEL_UUID")]
    uuid: String,

    /// Shared secret registered with the relay.
    #[arg(long, env = "TUNNEL_SECRET", hide_env_values = true)]
    secret: String,

    /// Refuse proxied HTTP requests; notifications and commands still work.
    #[arg(long, env = "TUNNEL_NO_REMOTE_ACCESS")]
    no_remote_access: bool,

    /// Version of the host automation system, sent to the relay.
    #[arg(long, default_value = "unknown", env = "TUNNEL_HOST_VERSION")]
    host_version: String,

    /// Ceiling on one local call in seconds, from dispatch to last byte.
    #[arg(long, default_value_t = 30, env = "TUNNEL_REQUEST_TIMEOUT")]
    request_timeout: u64,

    /// Maximum concurrent connections to the local service.
    #[arg(long, default_value_t = 200, env = "TUNNEL_MAX_CONNECTIONS")]
    max_connections: usize,

    /// Pause in seconds between a lost connection and the next attempt.
    #[arg(long, default_value_t = 5, env = "TUNNEL_RECONNECT_DELAY")]
    reconnect_delay: u64,

    /// Item the relay may command and observe.  Repeat or comma-separate.
    #[arg(long = "expose", env = "TUNNEL_EXPOSE", value_delimiter = ',')]
    exposed: Vec<String>,

    /// Item to seed the in-memory registry with, as `Name:Kind[:State]`.
    #[arg(long = "item", value_parser = parse_item_spec)]
    items: Vec<ItemSnapshot>,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`TunnelConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if a URL or the instance id does not parse, or if the
    /// resulting configuration is invalid.
    fn into_tunnel_config(self) -> anyhow::Result<TunnelConfig> {
        let relay_url = Url::parse(&self.relay_url)
            .with_context(|| format!("invalid relay URL: '{}'", self.relay_url))?;
        let local_base_url = Url::parse(&self.local_url)
            .with_context(|| format!("invalid local URL: '{}'", self.local_url))?;
        let instance_id = Uuid::parse_str(&self.uuid)
            .with_context(|| format!("invalid instance id: '{}'", self.uuid))?;

        let config = TunnelConfig {
            relay_url,
            local_base_url,
            credentials: Credentials {
                instance_id,
                secret: self.secret,
            },
            remote_access: !self.no_remote_access,
            host_version: self.host_version,
            local_request_timeout: Duration::from_secs(self.request_timeout),
            max_connections_per_destination: self.max_connections,
            reconnect_delay: Duration::from_secs(self.reconnect_delay),
            exposed_items: self.exposed.into_iter().collect(),
            ..TunnelConfig::default()
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Parses `Name:Kind[:State]`, e.g. `Kitchen_Light:Switch:ON`.
fn parse_item_spec(spec: &str) -> Result<ItemSnapshot, String> {
    let mut parts = spec.splitn(3, ':');
    let name = parts.next().filter(|n| !n.is_empty()).ok_or("missing item name")?;
    let kind: ItemKind = parts
        .next()
        .ok_or_else(|| format!("missing item kind in '{spec}'"))?
        .parse()?;
    let state = parts
        .next()
        .map(|s| ItemState(s.to_string()))
        .unwrap_or_else(ItemState::null);
    Ok(ItemSnapshot {
        name: name.to_string(),
        kind,
        state,
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` controls the level.
/// 2. CLI arguments are parsed into a [`TunnelConfig`].
/// 3. The local HTTP executor and the in-memory item registry are created
///    and wired into a [`TunnelClient`].
/// 4. A Ctrl+C handler clears the shared `running` flag.
/// 5. The transport connects and reconnects until the flag clears.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();
    let items = cli.items.clone();
    let config = cli.into_tunnel_config()?;

    info!(
        instance = %config.credentials.instance_id,
        relay = %config.relay_url,
        local = %config.local_base_url,
        remote_access = config.remote_access,
        exposed = config.exposed_items.len(),
        "relay tunnel client starting"
    );

    // ── Wiring ────────────────────────────────────────────────────────────────
    let local_http = Arc::new(ReqwestLocalClient::new(config.max_connections_per_destination));
    let registry = Arc::new(InMemoryItemRegistry::with_items(items));
    let client = TunnelClient::new(config, local_http, registry.clone(), registry.clone());
    registry.set_update_sink(Arc::new(client.notifier().clone()));

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Transport loop ────────────────────────────────────────────────────────
    connect(client, running)
        .await
        .context("relay transport task panicked")?;

    info!("relay tunnel client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
