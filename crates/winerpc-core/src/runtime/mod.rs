//! Runtime wiring: the shared context and the main polling loop.

mod context;
mod main_loop;

pub use context::{PresenceHandle, RuntimeContext};
pub use main_loop::MainLoop;

/// Current time in Unix seconds, the unit of presence timestamps.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
