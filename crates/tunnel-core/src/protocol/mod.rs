//! Protocol module containing relay event types and the packet codec.

pub mod error;
pub mod events;
pub mod packet;

pub use error::ProtocolError;
pub use events::{CancelEvent, CommandEvent, InboundEvent, OutboundEvent, RequestEvent};
pub use packet::{decode_packet, encode_outbound, Frame, OpenInfo, Packet};
