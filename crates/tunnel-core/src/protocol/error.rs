//! Errors raised while decoding relay packets and validating inbound events.

use thiserror::Error;

/// Errors that can occur while decoding a relay frame or validating an event.
///
/// Every variant describes a *malformed input*: the caller logs it and drops
/// the frame.  None of them is fatal to the connection.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame was empty.
    #[error("empty frame")]
    EmptyFrame,

    /// The Engine.IO packet type character is not a recognized value.
    #[error("unknown engine.io packet type: {0:?}")]
    UnknownPacketType(char),

    /// The Socket.IO packet type character is not a recognized value, or is
    /// an acknowledgement (the relay protocol never requests acks).
    #[error("unsupported socket.io packet type: {0:?}")]
    UnsupportedMessageType(char),

    /// The packet addressed a namespace other than the default one.
    #[error("unsupported namespace: {0}")]
    UnsupportedNamespace(String),

    /// Inbound binary events are not part of the relay protocol.
    #[error("inbound binary event is not supported")]
    UnsupportedBinaryEvent,

    /// The packet body could not be parsed as JSON of the expected shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The event name is not one the client handles.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// A required field was absent from an event payload.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The request id was present but not numeric.
    #[error("request id is not numeric: {0}")]
    NonNumericId(String),

    /// The request method is not one of GET, POST or PUT.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::MalformedPayload(e.to_string())
    }
}
