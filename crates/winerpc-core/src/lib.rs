//! winerpc core - Discord rich presence for applications running under Wine.
//!
//! This crate detects which known application is running, publishes it to the
//! local Discord client over its IPC socket, and hosts plugins that share the
//! same runtime context. The `winerpc` binary is a thin CLI over it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use winerpc_core::{
//!     AppRegistry, CancellationToken, Config, LocalSocketConnector, MainLoop, RuntimeContext,
//!     SysinfoLister,
//! };
//!
//! #[tokio::main]
//! async fn main() -> winerpc_core::Result<()> {
//!     let config = Config::load("config.json")?;
//!     let registry = AppRegistry::load_or_empty(&config.app_list_path);
//!
//!     let ctx = Arc::new(RuntimeContext::new(
//!         Arc::new(config),
//!         Arc::new(registry),
//!         Arc::new(LocalSocketConnector::new()),
//!         CancellationToken::new(),
//!     ));
//!
//!     let report = MainLoop::new(ctx, SysinfoLister::new()).run().await;
//!     println!("{} plugins ran", report.len());
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod ipc;
pub mod platform;
pub mod plugins;
pub mod process;
pub mod registry;
pub mod runtime;

// Re-export commonly used types
pub use cancel::{CancellationToken, CancelledError};
pub use config::Config;
pub use error::{Result, WineRpcError};
pub use ipc::{Connector, LocalSocketConnector, PresenceChannel, PresenceState};
pub use plugins::{
    PluginModule, PluginRegistry, PluginSupervisor, PluginTaskHandle, PluginTaskState,
};
pub use process::{find_active_app, ProcessEntry, ProcessLister, ProcessSnapshot, SysinfoLister};
pub use registry::{AppEntry, AppRegistry};
pub use runtime::{MainLoop, PresenceHandle, RuntimeContext};
