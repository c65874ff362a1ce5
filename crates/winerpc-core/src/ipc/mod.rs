//! Discord local RPC client.
//!
//! Discord listens on a Unix socket (or a named pipe on Windows) for rich presence
//! updates from local processes. This module speaks that protocol.
//!
//! # Architecture
//!
//! - **Protocol**: Frame codec and the JSON payload types
//! - **Transport**: Locates and opens the local socket behind the [`Connector`] seam
//! - **Presence**: The connection state machine that publishes and clears activities

pub mod presence;
pub mod protocol;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use presence::{PresenceChannel, PresenceState, PublishedPresence};
pub use protocol::{Activity, Opcode};
pub use transport::{BoxedStream, Connector, IpcStream, LocalSocketConnector};
