//! Process detection for applications running under Wine.
//!
//! # Detection Strategy
//!
//! Each poll tick captures one [`ProcessSnapshot`] from a [`ProcessLister`]:
//! 1. **Guest name resolution** - Wine preloader processes are reported under the
//!    name of the Windows executable they host, so matching never sees
//!    `wine64-preloader` (see [`wine`]).
//! 2. **Registry matching** - [`find_active_app`] walks the app registry in order
//!    and returns the first entry with a running executable.
//!
//! # Example
//!
//! ```rust,no_run
//! use winerpc_core::process::{find_active_app, ProcessLister, SysinfoLister};
//! use winerpc_core::registry::AppRegistry;
//!
//! let registry = AppRegistry::load_or_empty("apps.json");
//! let mut lister = SysinfoLister::new();
//!
//! if let Some(app) = find_active_app(&lister.snapshot(), &registry) {
//!     println!("Playing {}", app.title);
//! }
//! ```

mod matcher;
mod snapshot;
pub mod wine;

pub use matcher::find_active_app;
pub use snapshot::{HostServer, ProcessEntry, ProcessLister, ProcessSnapshot, SysinfoLister};
