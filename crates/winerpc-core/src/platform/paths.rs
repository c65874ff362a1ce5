//! Locations of the Discord local IPC endpoint.
//!
//! # Platform Behavior
//! - **Linux/macOS**: Unix sockets `discord-ipc-{0..9}` in the first of
//!   `$XDG_RUNTIME_DIR`, `$TMPDIR`, `$TMP`, `$TEMP`, `/tmp`, plus the Flatpak and
//!   Snap sandbox subdirectories of that directory
//! - **Windows**: Named pipes `\\?\pipe\discord-ipc-{0..9}`

use crate::config::IpcConfig;
use std::path::{Path, PathBuf};

/// Subdirectories of the runtime dir where sandboxed Discord builds put their socket.
#[cfg(unix)]
const SANDBOX_SUBDIRS: &[&str] = &["", "app/com.discordapp.Discord", "snap.discord"];

/// Endpoint names in probe order, without a directory.
pub fn ipc_endpoint_names() -> impl Iterator<Item = String> {
    (0..IpcConfig::MAX_PIPE_INDEX).map(|i| format!("{}{}", IpcConfig::PIPE_NAME_PREFIX, i))
}

/// All candidate endpoints below `base`, in probe order.
#[cfg(unix)]
pub fn ipc_endpoints_in(base: &Path) -> Vec<PathBuf> {
    SANDBOX_SUBDIRS
        .iter()
        .flat_map(|sub| {
            let dir = if sub.is_empty() {
                base.to_path_buf()
            } else {
                base.join(sub)
            };
            ipc_endpoint_names().map(move |name| dir.join(name))
        })
        .collect()
}

/// Directory Discord creates its socket in.
#[cfg(unix)]
pub fn ipc_runtime_dir() -> PathBuf {
    if let Some(dir) = dirs::runtime_dir() {
        return dir;
    }

    ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(std::env::var_os)
        .map(PathBuf::from)
        .find(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Every endpoint the connector should try, in order.
pub fn ipc_endpoint_candidates() -> Vec<PathBuf> {
    #[cfg(unix)]
    {
        ipc_endpoints_in(&ipc_runtime_dir())
    }

    #[cfg(windows)]
    {
        ipc_endpoint_names()
            .map(|name| Path::new(r"\\?\pipe").join(name))
            .collect()
    }

    #[cfg(not(any(unix, windows)))]
    {
        Vec::new()
    }
}
