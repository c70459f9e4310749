//! Application layer for tunnel-client.
//!
//! This layer is the tunnel protocol state machine.  It knows *what* happens
//! when the relay sends an event or a local call makes progress, but not
//! *how* bytes move: sockets and HTTP live behind the traits in [`ports`].
//!
//! | Module          | Responsibility                                           |
//! |-----------------|----------------------------------------------------------|
//! | `session`       | Connection state shared by everything else               |
//! | `router`        | Entry point for inbound relay events                     |
//! | `dispatcher`    | `request` → local call; `cancel` → abort                 |
//! | `registry`      | One abort handle per in-flight request id                |
//! | `streamer`      | Local response → `responseHeader` / content / terminal   |
//! | `notifier`      | Best-effort notifications and item updates               |
//! | `command_gate`  | Exposure and vocabulary checks for relay commands        |
//! | `emitter`       | Handle onto the live connection's outbound queue         |
//! | `client`        | Wires the pieces together                                |

pub mod client;
pub mod command_gate;
pub mod dispatcher;
pub mod emitter;
pub mod notifier;
pub mod ports;
pub mod registry;
pub mod router;
pub mod session;
pub mod streamer;

pub use client::TunnelClient;
pub use command_gate::{CommandGate, GateError};
pub use dispatcher::{DispatchError, RequestDispatcher};
pub use emitter::RelayEmitter;
pub use notifier::OutboundNotifier;
pub use ports::{
    AutomationBus, BodyStream, ItemLookup, LocalCall, LocalCallError, LocalHttpClient,
    LocalResponse, UpdateSink,
};
pub use registry::{AbortSignal, CancellationRegistry, RegistryError};
pub use router::{InboundRouter, RouteOutcome};
pub use session::Session;
pub use streamer::{run_call, CallState, ResponseStreamer};
