//! Plugin system.
//!
//! Plugins are statically linked modules registered under a name. Each one may
//! provide:
//! - An entry capability, run as its own task against the shared
//!   [`RuntimeContext`](crate::runtime::RuntimeContext)
//! - An exit capability, called once with the task's final state
//!
//! The config's `plugins` list selects which registered modules are started.

mod builtin;
mod module;
mod supervisor;

pub use builtin::GREETER_STATUS;
pub use module::{EntryFn, ExitFn, PluginFuture, PluginModule, PluginRegistry};
pub use supervisor::{PluginSupervisor, PluginTaskHandle, PluginTaskState};
