//! Known-application registry.
//!
//! The registry is a JSON array of `{ "title", "exe", "icon" }` objects loaded once
//! at startup. Order matters: when several entries match the running processes,
//! the first one wins.
//!
//! Loading is forgiving. Malformed entries are skipped with a warning, and a
//! missing or unreadable file degrades to an empty registry.

pub mod app_registry;

pub use app_registry::{AppEntry, AppRegistry};
