//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific behavior live in this module rather than
//! being scattered throughout the codebase.
//!
//! # Supported Platforms
//!
//! - **Linux**: Full support (Unix sockets, Flatpak and Snap Discord installs)
//! - **macOS**: Unix sockets under `$TMPDIR`
//! - **Windows**: Named pipes

pub mod paths;

pub use paths::ipc_endpoint_candidates;
