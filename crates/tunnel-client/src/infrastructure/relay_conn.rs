//! Opening the WebSocket connection to the relay.
//!
//! The relay serves Socket.IO under `/socket.io/` on its base address.  This
//! module derives the WebSocket URL from the configured base and attaches the
//! identity headers the relay authenticates on.
//!
//! # Handshake headers
//!
//! | Header           | Value                                   |
//! |------------------|-----------------------------------------|
//! | `uuid`           | instance id                             |
//! | `secret`         | shared secret                           |
//! | `openhabversion` | version of the host automation system   |
//! | `clientversion`  | version of this client                  |
//! | `remoteaccess`   | `"true"` or `"false"`                   |
//!
//! Identity travels only in these headers, never inside event payloads.

use anyhow::Context;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::domain::TunnelConfig;

/// Query string selecting Engine.IO v4 over a plain WebSocket transport.
pub const ENGINE_IO_QUERY: &str = "EIO=4&transport=websocket";

/// A connected relay WebSocket.
pub type RelayStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Derives the Socket.IO WebSocket URL from the relay base address.
///
/// `https` becomes `wss` and `http` becomes `ws`; `ws`/`wss` are kept.  Any
/// path on the base is kept as a prefix.
///
/// # Errors
///
/// Returns an error for any other scheme.
///
/// # Example
///
/// ```rust
/// use url::Url;
/// use tunnel_client::infrastructure::relay_conn::websocket_url;
///
/// let base = Url::parse("https://myopenhab.org/").unwrap();
/// assert_eq!(
///     websocket_url(&base).unwrap().as_str(),
///     "wss://myopenhab.org/socket.io/?EIO=4&transport=websocket"
/// );
/// ```
pub fn websocket_url(relay: &Url) -> anyhow::Result<Url> {
    let scheme = match relay.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => anyhow::bail!("unsupported relay URL scheme: {other}"),
    };

    let mut url = relay.clone();
    url.set_scheme(scheme)
        .map_err(|()| anyhow::anyhow!("cannot switch {relay} to {scheme}"))?;
    let path = format!("{}/socket.io/", relay.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(Some(ENGINE_IO_QUERY));
    url.set_fragment(None);
    Ok(url)
}

/// Builds the WebSocket upgrade request, identity headers included.
///
/// # Errors
///
/// Returns an error if the relay URL is unusable or a configured value is not
/// a valid header value.
pub fn handshake_request(config: &TunnelConfig) -> anyhow::Result<Request> {
    let url = websocket_url(&config.relay_url)?;
    let mut request = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("invalid relay WebSocket URL {url}"))?;

    let headers = request.headers_mut();
    headers.insert(
        "uuid",
        HeaderValue::from_str(&config.credentials.instance_id.to_string())?,
    );
    headers.insert(
        "secret",
        HeaderValue::from_str(&config.credentials.secret).context("secret is not a valid header value")?,
    );
    headers.insert(
        "openhabversion",
        HeaderValue::from_str(&config.host_version).context("invalid host version")?,
    );
    headers.insert(
        "clientversion",
        HeaderValue::from_str(&config.client_version).context("invalid client version")?,
    );
    headers.insert(
        "remoteaccess",
        HeaderValue::from_static(if config.remote_access { "true" } else { "false" }),
    );
    Ok(request)
}

/// Opens one WebSocket connection to the relay.
///
/// # Errors
///
/// Returns an error if the handshake request cannot be built or the relay
/// cannot be reached.
pub async fn connect_relay(config: &TunnelConfig) -> anyhow::Result<RelayStream> {
    let request = handshake_request(config)?;
    debug!(url = %request.uri(), instance = %config.credentials.instance_id, "connecting to relay");
    let (stream, response) = connect_async(request)
        .await
        .with_context(|| format!("failed to connect to relay at {}", config.relay_url))?;
    debug!(status = %response.status(), "relay WebSocket upgraded");
    Ok(stream)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
