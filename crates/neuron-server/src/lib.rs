//! Protocol server (C8): the WebSocket upgrade route, admission-gated
//! session table, and graceful-stop barrier for the Neuron
//! organization-boundary broker's handshake path.

pub mod observability;
pub mod ws;

pub use observability::{status_snapshot, AxonStatus, StatusSnapshot};
pub use ws::ProtocolServer;
