//! Socket.IO v4 / Engine.IO v4 packet codec for the relay WebSocket.
//!
//! Wire format of a WebSocket *text* frame:
//! ```text
//! <engine.io type>[<socket.io type>[<attachments>-][/<nsp>,][<ack id>]][<json>]
//!
//! 0{"sid":"..","pingInterval":25000,"pingTimeout":20000}   open
//! 2 / 3                                                    ping / pong
//! 40 / 40{"sid":".."}                                      connect (request / ack)
//! 41                                                       disconnect
//! 42["request",{...}]                                      event
//! 451-["responseContentBinary",{..,"body":{"_placeholder":true,"num":0}}]
//!                                                          binary event header
//! 44{"message":"not authorized"}                           connect error
//! ```
//!
//! A binary event header is followed by one WebSocket *binary* frame per
//! attachment carrying the raw bytes.
//!
//! The relay only uses the default namespace `/`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::ProtocolError;
use crate::protocol::events::OutboundEvent;

// Engine.IO packet types.
const EIO_OPEN: char = '0';
const EIO_CLOSE: char = '1';
const EIO_PING: char = '2';
const EIO_PONG: char = '3';
const EIO_MESSAGE: char = '4';
const EIO_NOOP: char = '6';

// Socket.IO packet types.
const SIO_CONNECT: char = '0';
const SIO_DISCONNECT: char = '1';
const SIO_EVENT: char = '2';
const SIO_ACK: char = '3';
const SIO_CONNECT_ERROR: char = '4';
const SIO_BINARY_EVENT: char = '5';
const SIO_BINARY_ACK: char = '6';

/// One WebSocket frame, independent of the WebSocket library in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Payload of the Engine.IO open packet.
///
/// Intervals are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

/// A decoded text packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO handshake; first packet sent by the server.
    Open(OpenInfo),
    /// Engine.IO close.
    Close,
    /// Engine.IO heartbeat from the server.
    Ping,
    /// Engine.IO heartbeat reply from the client.
    Pong,
    /// Engine.IO no-op.
    Noop,
    /// Socket.IO namespace connect; the client sends it without payload, the
    /// server acknowledges it with an object.
    Connect(Option<Value>),
    /// Socket.IO namespace disconnect.
    Disconnect,
    /// Socket.IO event.
    Event { name: String, payload: Value },
    /// Socket.IO connect refusal, e.g. bad credentials.
    ConnectError(Value),
}

impl Packet {
    /// Encodes the packet as the text of one WebSocket frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if a JSON payload cannot be
    /// serialized.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        let text = match self {
            Packet::Open(info) => format!("{EIO_OPEN}{}", serde_json::to_string(info)?),
            Packet::Close => EIO_CLOSE.to_string(),
            Packet::Ping => EIO_PING.to_string(),
            Packet::Pong => EIO_PONG.to_string(),
            Packet::Noop => EIO_NOOP.to_string(),
            Packet::Connect(None) => format!("{EIO_MESSAGE}{SIO_CONNECT}"),
            Packet::Connect(Some(payload)) => format!(
                "{EIO_MESSAGE}{SIO_CONNECT}{}",
                serde_json::to_string(payload)?
            ),
            Packet::Disconnect => format!("{EIO_MESSAGE}{SIO_DISCONNECT}"),
            Packet::Event { name, payload } => format!(
                "{EIO_MESSAGE}{SIO_EVENT}{}",
                serde_json::to_string(&(name, payload))?
            ),
            Packet::ConnectError(payload) => format!(
                "{EIO_MESSAGE}{SIO_CONNECT_ERROR}{}",
                serde_json::to_string(payload)?
            ),
        };
        Ok(text)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one WebSocket text frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is empty, uses an unknown packet
/// type, addresses a foreign namespace, or carries malformed JSON.
///
/// # Examples
///
/// ```rust
/// use tunnel_core::protocol::packet::{decode_packet, Packet};
///
/// assert_eq!(decode_packet("2").unwrap(), Packet::Ping);
/// let event = decode_packet(r#"42["cancel",{"id":7}]"#).unwrap();
/// assert!(matches!(event, Packet::Event { ref name, .. } if name == "cancel"));
/// ```
pub fn decode_packet(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::EmptyFrame)?;
    let rest = chars.as_str();

    match kind {
        EIO_OPEN => Ok(Packet::Open(serde_json::from_str(rest)?)),
        EIO_CLOSE => Ok(Packet::Close),
        EIO_PING => Ok(Packet::Ping),
        EIO_PONG => Ok(Packet::Pong),
        EIO_NOOP => Ok(Packet::Noop),
        EIO_MESSAGE => decode_socket_packet(rest),
        other => Err(ProtocolError::UnknownPacketType(other)),
    }
}

/// Encodes an outbound event into the frames that carry it.
///
/// Text-only events produce one frame.  Events with a binary attachment
/// produce the binary event header followed by one binary frame; the two
/// must be written back to back.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the payload cannot be
/// serialized.
pub fn encode_outbound(event: &OutboundEvent) -> Result<Vec<Frame>, ProtocolError> {
    let body = serde_json::to_string(&(event.name(), event.payload()?))?;
    match event.attachment() {
        None => Ok(vec![Frame::Text(format!("{EIO_MESSAGE}{SIO_EVENT}{body}"))]),
        Some(bytes) => Ok(vec![
            Frame::Text(format!("{EIO_MESSAGE}{SIO_BINARY_EVENT}1-{body}")),
            Frame::Binary(bytes.to_vec()),
        ]),
    }
}

// ── Socket.IO layer ───────────────────────────────────────────────────────────

fn decode_socket_packet(text: &str) -> Result<Packet, ProtocolError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(ProtocolError::EmptyFrame)?;
    let rest = strip_namespace(chars.as_str())?;

    match kind {
        SIO_CONNECT => {
            if rest.is_empty() {
                Ok(Packet::Connect(None))
            } else {
                Ok(Packet::Connect(Some(serde_json::from_str(rest)?)))
            }
        }
        SIO_DISCONNECT => Ok(Packet::Disconnect),
        SIO_EVENT => decode_event(strip_ack_id(rest)),
        SIO_CONNECT_ERROR => {
            let payload = if rest.is_empty() {
                Value::Null
            } else {
                serde_json::from_str(rest)?
            };
            Ok(Packet::ConnectError(payload))
        }
        SIO_BINARY_EVENT => Err(ProtocolError::UnsupportedBinaryEvent),
        SIO_ACK | SIO_BINARY_ACK => Err(ProtocolError::UnsupportedMessageType(kind)),
        other => Err(ProtocolError::UnsupportedMessageType(other)),
    }
}

/// Removes an optional `/nsp,` prefix, accepting only the default namespace.
fn strip_namespace(text: &str) -> Result<&str, ProtocolError> {
    if !text.starts_with('/') {
        return Ok(text);
    }
    let (nsp, rest) = match text.find(',') {
        Some(pos) => (&text[..pos], &text[pos + 1..]),
        None => (text, ""),
    };
    if nsp == "/" {
        Ok(rest)
    } else {
        Err(ProtocolError::UnsupportedNamespace(nsp.to_string()))
    }
}

/// Removes a leading numeric ack id.  The client never answers acks.
fn strip_ack_id(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(json: &str) -> Result<Packet, ProtocolError> {
    let mut items: Vec<Value> = serde_json::from_str(json)?;
    if items.is_empty() {
        return Err(ProtocolError::MalformedPayload("empty event array".to_string()));
    }
    let name = match items.remove(0) {
        Value::String(name) => name,
        other => {
            return Err(ProtocolError::MalformedPayload(format!(
                "event name is not a string: {other}"
            )))
        }
    };
    let payload = if items.is_empty() {
        Value::Null
    } else {
        items.remove(0)
    };
    Ok(Packet::Event { name, payload })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::RequestId;
    use serde_json::json;

    #[test]
    fn test_decode_open_packet() {
        let packet =
            decode_packet(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#)
                .unwrap();
        assert_eq!(
            packet,
            Packet::Open(OpenInfo {
                sid: "abc".to_string(),
                upgrades: vec![],
                ping_interval: 25000,
                ping_timeout: 20000,
                max_payload: None,
            })
        );
    }

    #[test]
    fn test_decode_heartbeat_packets() {
        assert_eq!(decode_packet("2").unwrap(), Packet::Ping);
        assert_eq!(decode_packet("3").unwrap(), Packet::Pong);
        assert_eq!(decode_packet("6").unwrap(), Packet::Noop);
        assert_eq!(decode_packet("1").unwrap(), Packet::Close);
    }

    #[test]
    fn test_decode_connect_ack_with_payload() {
        let packet = decode_packet(r#"40{"sid":"xyz"}"#).unwrap();
        assert_eq!(packet, Packet::Connect(Some(json!({"sid": "xyz"}))));
        assert_eq!(decode_packet("40").unwrap(), Packet::Connect(None));
    }

    #[test]
    fn test_decode_event_with_default_namespace_prefix() {
        let packet = decode_packet(r#"42/,["cancel",{"id":3}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "cancel".to_string(),
                payload: json!({"id": 3})
            }
        );
    }

    #[test]
    fn test_decode_event_ignores_ack_id() {
        let packet = decode_packet(r#"4217["command",{"item":"A","command":"ON"}]"#).unwrap();
        assert!(matches!(packet, Packet::Event { ref name, .. } if name == "command"));
    }

    #[test]
    fn test_decode_event_without_payload_yields_null() {
        let packet = decode_packet(r#"42["ping-me"]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "ping-me".to_string(),
                payload: Value::Null
            }
        );
    }

    #[test]
    fn test_decode_rejects_foreign_namespace() {
        assert_eq!(
            decode_packet(r#"42/admin,["x",{}]"#),
            Err(ProtocolError::UnsupportedNamespace("/admin".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode_packet(""), Err(ProtocolError::EmptyFrame));
        assert_eq!(decode_packet("9"), Err(ProtocolError::UnknownPacketType('9')));
        assert!(matches!(decode_packet("42not json"), Err(ProtocolError::MalformedPayload(_))));
        assert!(matches!(decode_packet("42[1,{}]"), Err(ProtocolError::MalformedPayload(_))));
        assert_eq!(
            decode_packet(r#"451-["x",{}]"#),
            Err(ProtocolError::UnsupportedBinaryEvent)
        );
        assert_eq!(decode_packet("431[]"), Err(ProtocolError::UnsupportedMessageType('3')));
    }

    #[test]
    fn test_decode_connect_error() {
        let packet = decode_packet(r#"44{"message":"not authorized"}"#).unwrap();
        assert_eq!(packet, Packet::ConnectError(json!({"message": "not authorized"})));
    }

    #[test]
    fn test_encode_client_packets() {
        assert_eq!(Packet::Pong.encode().unwrap(), "3");
        assert_eq!(Packet::Connect(None).encode().unwrap(), "40");
        assert_eq!(Packet::Disconnect.encode().unwrap(), "41");
    }

    #[test]
    fn test_encode_text_event() {
        let frames = encode_outbound(&OutboundEvent::ResponseFinished { id: RequestId(1) }).unwrap();
        assert_eq!(
            frames,
            vec![Frame::Text(r#"42["responseFinished",{"id":1}]"#.to_string())]
        );
    }

    #[test]
    fn test_encode_binary_event_emits_header_then_attachment() {
        let frames = encode_outbound(&OutboundEvent::ResponseContentBinary {
            id: RequestId(1),
            body: b"ON".to_vec(),
        })
        .unwrap();

        assert_eq!(
            frames,
            vec![
                Frame::Text(
                    r#"451-["responseContentBinary",{"id":1,"body":{"_placeholder":true,"num":0}}]"#
                        .to_string()
                ),
                Frame::Binary(b"ON".to_vec()),
            ]
        );
    }

    #[test]
    fn test_event_packet_encode_decode_preserves_payload_order() {
        let payload = json!({"id": 9, "path": "/", "headers": {"b": "1", "a": "2"}});
        let text = Packet::Event {
            name: "request".to_string(),
            payload: payload.clone(),
        }
        .encode()
        .unwrap();

        assert_eq!(text, r#"42["request",{"id":9,"path":"/","headers":{"b":"1","a":"2"}}]"#);
        assert_eq!(
            decode_packet(&text).unwrap(),
            Packet::Event {
                name: "request".to_string(),
                payload
            }
        );
    }
}
