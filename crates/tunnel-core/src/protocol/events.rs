//! Relay event types.
//!
//! The relay and the client exchange named events, each carrying one JSON
//! object.  On the wire the names are plain strings (`"request"`,
//! `"responseHeader"`, ...).  Inside the client they are modelled as two
//! closed enums so that every event is handled by an exhaustive `match`:
//!
//! ```text
//! Relay  → Client:  InboundEvent   (request, cancel, command)
//! Client → Relay:   OutboundEvent  (responseHeader, responseContentBinary,
//!                                   responseFinished, responseError,
//!                                   notification, lognotification,
//!                                   broadcastnotification, itemupdate)
//! ```
//!
//! # Wire payloads
//!
//! ```json
//! request        {"id":1,"path":"/rest/items","method":"GET","body":"","headers":{},"query":{},"protocol":"https"}
//! cancel         {"id":1}
//! command        {"item":"Kitchen_Light","command":"ON"}
//! responseHeader {"id":1,"headers":{"Content-Type":"text/plain"},"responseStatusCode":200,"responseStatusText":"OK"}
//! responseFinished {"id":1}
//! responseError  {"id":1,"responseStatusText":"timeout"}
//! notification   {"userId":"u@x","message":"Door open","icon":"door","severity":"high"}
//! itemupdate     {"itemName":"Kitchen_Light","itemStatus":"ON"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::notification::NotificationMessage;
use crate::domain::request::{OrderedMap, ProxiedRequest, RequestId};
use crate::protocol::error::ProtocolError;

/// Status text sent with every `responseHeader`.  Only the numeric code is
/// authoritative; the local server's reason phrase is not propagated.
pub const RESPONSE_STATUS_TEXT: &str = "OK";

// ── Inbound wire payloads ─────────────────────────────────────────────────────

/// Raw payload of an inbound `request` event, before validation.
///
/// Every field is optional here so that a missing field produces a precise
/// [`ProtocolError::MissingField`] instead of a generic serde message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestEvent {
    #[serde(default)]
    pub id: Value,
    pub path: Option<String>,
    pub method: Option<String>,
    pub body: Option<String>,
    pub headers: Option<OrderedMap>,
    pub query: Option<OrderedMap>,
    #[serde(default)]
    pub protocol: Option<String>,
}

impl TryFrom<RequestEvent> for ProxiedRequest {
    type Error = ProtocolError;

    fn try_from(event: RequestEvent) -> Result<Self, Self::Error> {
        let id = RequestId::from_json(&event.id)?;
        let method = event
            .method
            .ok_or(ProtocolError::MissingField("method"))?
            .parse()?;
        Ok(ProxiedRequest {
            id,
            method,
            path: event.path.ok_or(ProtocolError::MissingField("path"))?,
            query: event.query.ok_or(ProtocolError::MissingField("query"))?,
            headers: event.headers.ok_or(ProtocolError::MissingField("headers"))?,
            body: event
                .body
                .ok_or(ProtocolError::MissingField("body"))?
                .into_bytes(),
            protocol: event.protocol,
        })
    }
}

/// Raw payload of an inbound `cancel` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelEvent {
    #[serde(default)]
    pub id: Value,
}

/// Payload of an inbound `command` event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandEvent {
    pub item: String,
    pub command: String,
}

// ── InboundEvent ──────────────────────────────────────────────────────────────

/// Every event the relay can send to the client, already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Replay an HTTP request against the local service.
    Request(ProxiedRequest),
    /// Abort the in-flight request with this id.
    Cancel { id: RequestId },
    /// Forward a command to an exposed item.
    Command(CommandEvent),
}

impl InboundEvent {
    /// Decodes an event from its wire name and JSON payload.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::UnknownEvent`] for names the client does not handle.
    /// - [`ProtocolError::MalformedPayload`] if the payload has the wrong shape.
    /// - [`ProtocolError::MissingField`], [`ProtocolError::NonNumericId`],
    ///   [`ProtocolError::UnsupportedMethod`] for invalid `request` events.
    ///
    /// # Example
    ///
    /// ```rust
    /// use serde_json::json;
    /// use tunnel_core::{InboundEvent, RequestId};
    ///
    /// let event = InboundEvent::decode("cancel", json!({"id": 7})).unwrap();
    /// assert_eq!(event, InboundEvent::Cancel { id: RequestId(7) });
    /// ```
    pub fn decode(name: &str, payload: Value) -> Result<Self, ProtocolError> {
        match name {
            "request" => {
                let raw: RequestEvent = serde_json::from_value(payload)?;
                Ok(InboundEvent::Request(ProxiedRequest::try_from(raw)?))
            }
            "cancel" => {
                let raw: CancelEvent = serde_json::from_value(payload)?;
                Ok(InboundEvent::Cancel {
                    id: RequestId::from_json(&raw.id)?,
                })
            }
            "command" => Ok(InboundEvent::Command(serde_json::from_value(payload)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Request(_) => "request",
            InboundEvent::Cancel { .. } => "cancel",
            InboundEvent::Command(_) => "command",
        }
    }
}

// ── OutboundEvent ─────────────────────────────────────────────────────────────

/// Every event the client can send to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Status and headers of a proxied response.  At most once per id.
    ResponseHeader {
        id: RequestId,
        headers: OrderedMap,
        status_code: u16,
    },
    /// One chunk of a proxied response body, sent as a binary attachment.
    ResponseContentBinary { id: RequestId, body: Vec<u8> },
    /// The proxied response is complete.
    ResponseFinished { id: RequestId },
    /// The proxied request failed before any header was sent.
    ResponseError { id: RequestId, reason: String },
    /// Notification addressed to one user.
    Notification(NotificationMessage),
    /// Notification recorded in the relay's log only.
    LogNotification(NotificationMessage),
    /// Notification sent to every user of the instance.
    BroadcastNotification(NotificationMessage),
    /// State change of an exposed item.
    ItemUpdate {
        item_name: String,
        item_status: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseHeaderPayload<'a> {
    id: RequestId,
    headers: &'a OrderedMap,
    response_status_code: u16,
    response_status_text: &'static str,
}

#[derive(Serialize)]
struct IdPayload {
    id: RequestId,
}

#[derive(Serialize)]
struct PlaceholderPayload {
    id: RequestId,
    body: Placeholder,
}

/// Socket.IO marker for the n-th binary attachment of a packet.
#[derive(Serialize)]
struct Placeholder {
    #[serde(rename = "_placeholder")]
    placeholder: bool,
    num: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseErrorPayload<'a> {
    id: RequestId,
    response_status_text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    message: &'a str,
    icon: &'a str,
    severity: &'a str,
}

impl<'a> NotificationPayload<'a> {
    fn new(msg: &'a NotificationMessage, with_user: bool) -> Self {
        Self {
            user_id: if with_user {
                msg.target_user_id.as_deref()
            } else {
                None
            },
            message: &msg.text,
            icon: &msg.icon,
            severity: &msg.severity,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemUpdatePayload<'a> {
    item_name: &'a str,
    item_status: &'a str,
}

impl OutboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::ResponseHeader { .. } => "responseHeader",
            OutboundEvent::ResponseContentBinary { .. } => "responseContentBinary",
            OutboundEvent::ResponseFinished { .. } => "responseFinished",
            OutboundEvent::ResponseError { .. } => "responseError",
            OutboundEvent::Notification(_) => "notification",
            OutboundEvent::LogNotification(_) => "lognotification",
            OutboundEvent::BroadcastNotification(_) => "broadcastnotification",
            OutboundEvent::ItemUpdate { .. } => "itemupdate",
        }
    }

    /// The proxied request this event belongs to, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            OutboundEvent::ResponseHeader { id, .. }
            | OutboundEvent::ResponseContentBinary { id, .. }
            | OutboundEvent::ResponseFinished { id }
            | OutboundEvent::ResponseError { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Whether this event ends the life of its request id.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OutboundEvent::ResponseFinished { .. } | OutboundEvent::ResponseError { .. }
        )
    }

    /// Raw bytes carried as a binary attachment, if the event has one.
    pub fn attachment(&self) -> Option<&[u8]> {
        match self {
            OutboundEvent::ResponseContentBinary { body, .. } => Some(body.as_slice()),
            _ => None,
        }
    }

    /// JSON payload of the event.  Binary bodies are replaced by an
    /// attachment placeholder; see [`OutboundEvent::attachment`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] if serialization fails.
    pub fn payload(&self) -> Result<Value, ProtocolError> {
        let value = match self {
            OutboundEvent::ResponseHeader {
                id,
                headers,
                status_code,
            } => serde_json::to_value(ResponseHeaderPayload {
                id: *id,
                headers,
                response_status_code: *status_code,
                response_status_text: RESPONSE_STATUS_TEXT,
            })?,
            OutboundEvent::ResponseContentBinary { id, .. } => {
                serde_json::to_value(PlaceholderPayload {
                    id: *id,
                    body: Placeholder {
                        placeholder: true,
                        num: 0,
                    },
                })?
            }
            OutboundEvent::ResponseFinished { id } => serde_json::to_value(IdPayload { id: *id })?,
            OutboundEvent::ResponseError { id, reason } => {
                serde_json::to_value(ResponseErrorPayload {
                    id: *id,
                    response_status_text: reason,
                })?
            }
            OutboundEvent::Notification(msg) => {
                serde_json::to_value(NotificationPayload::new(msg, true))?
            }
            OutboundEvent::LogNotification(msg) | OutboundEvent::BroadcastNotification(msg) => {
                serde_json::to_value(NotificationPayload::new(msg, false))?
            }
            OutboundEvent::ItemUpdate {
                item_name,
                item_status,
            } => serde_json::to_value(ItemUpdatePayload {
                item_name,
                item_status,
            })?,
        };
        Ok(value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::HttpMethod;
    use serde_json::json;

    fn request_payload() -> Value {
        json!({
            "id": 1,
            "path": "/items/Kitchen_Light",
            "method": "GET",
            "headers": {"Accept": "text/plain"},
            "query": {},
            "body": ""
        })
    }

    #[test]
    fn test_decode_valid_request() {
        let event = InboundEvent::decode("request", request_payload()).unwrap();

        let InboundEvent::Request(req) = event else {
            panic!("expected a request event");
        };
        assert_eq!(req.id, RequestId(1));
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "/items/Kitchen_Light");
        assert_eq!(req.headers.get("Accept"), Some("text/plain"));
        assert!(req.query.is_empty());
        assert!(req.body.is_empty());
        assert_eq!(req.protocol, None);
    }

    #[test]
    fn test_decode_request_keeps_protocol() {
        let mut payload = request_payload();
        payload["protocol"] = json!("https");
        let InboundEvent::Request(req) = InboundEvent::decode("request", payload).unwrap() else {
            panic!("expected a request event");
        };
        assert_eq!(req.protocol.as_deref(), Some("https"));
    }

    #[test]
    fn test_decode_request_rejects_unsupported_method() {
        let mut payload = request_payload();
        payload["method"] = json!("DELETE");
        assert_eq!(
            InboundEvent::decode("request", payload),
            Err(ProtocolError::UnsupportedMethod("DELETE".to_string()))
        );
    }

    #[test]
    fn test_decode_request_rejects_non_numeric_id() {
        let mut payload = request_payload();
        payload["id"] = json!("seven");
        assert!(matches!(
            InboundEvent::decode("request", payload),
            Err(ProtocolError::NonNumericId(_))
        ));
    }

    #[test]
    fn test_decode_request_requires_every_field() {
        for field in ["path", "method", "headers", "query", "body"] {
            let mut payload = request_payload();
            payload.as_object_mut().unwrap().remove(field);
            assert_eq!(
                InboundEvent::decode("request", payload),
                Err(ProtocolError::MissingField(field)),
                "missing {field} must be reported"
            );
        }
    }

    #[test]
    fn test_decode_request_without_id_is_missing_field() {
        let mut payload = request_payload();
        payload.as_object_mut().unwrap().remove("id");
        assert_eq!(
            InboundEvent::decode("request", payload),
            Err(ProtocolError::MissingField("id"))
        );
    }

    #[test]
    fn test_decode_command() {
        let event =
            InboundEvent::decode("command", json!({"item": "Kitchen_Light", "command": "toggle"}))
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::Command(CommandEvent {
                item: "Kitchen_Light".to_string(),
                command: "toggle".to_string(),
            })
        );
        assert_eq!(event.name(), "command");
    }

    #[test]
    fn test_decode_command_missing_field_is_malformed() {
        assert!(matches!(
            InboundEvent::decode("command", json!({"item": "X"})),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_unknown_event_name() {
        assert_eq!(
            InboundEvent::decode("upgrade", json!({})),
            Err(ProtocolError::UnknownEvent("upgrade".to_string()))
        );
    }

    #[test]
    fn test_response_header_payload_shape() {
        let headers: OrderedMap = [("Content-Type", "text/plain")].into_iter().collect();
        let event = OutboundEvent::ResponseHeader {
            id: RequestId(1),
            headers,
            status_code: 200,
        };

        let json = serde_json::to_string(&event.payload().unwrap()).unwrap();

        assert_eq!(
            json,
            r#"{"id":1,"headers":{"Content-Type":"text/plain"},"responseStatusCode":200,"responseStatusText":"OK"}"#
        );
        assert_eq!(event.name(), "responseHeader");
    }

    #[test]
    fn test_response_error_payload_shape() {
        let event = OutboundEvent::ResponseError {
            id: RequestId(2),
            reason: "timeout".to_string(),
        };
        assert_eq!(
            event.payload().unwrap(),
            json!({"id": 2, "responseStatusText": "timeout"})
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn test_content_payload_uses_placeholder() {
        let event = OutboundEvent::ResponseContentBinary {
            id: RequestId(3),
            body: b"ON".to_vec(),
        };
        assert_eq!(
            event.payload().unwrap(),
            json!({"id": 3, "body": {"_placeholder": true, "num": 0}})
        );
        assert_eq!(event.attachment(), Some(&b"ON"[..]));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_notification_payload_includes_user_only_when_addressed() {
        let msg = NotificationMessage::new("Door open", "door", "high").for_user("alice");

        let personal = OutboundEvent::Notification(msg.clone()).payload().unwrap();
        let broadcast = OutboundEvent::BroadcastNotification(msg).payload().unwrap();

        assert_eq!(
            personal,
            json!({"userId": "alice", "message": "Door open", "icon": "door", "severity": "high"})
        );
        assert_eq!(
            broadcast,
            json!({"message": "Door open", "icon": "door", "severity": "high"})
        );
    }

    #[test]
    fn test_item_update_payload_shape() {
        let event = OutboundEvent::ItemUpdate {
            item_name: "Kitchen_Light".to_string(),
            item_status: "ON".to_string(),
        };
        assert_eq!(
            event.payload().unwrap(),
            json!({"itemName": "Kitchen_Light", "itemStatus": "ON"})
        );
        assert_eq!(event.request_id(), None);
    }
}
