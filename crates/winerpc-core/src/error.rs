//! Error types for winerpc.
//!
//! Every failure mode of the presence pipeline maps to one variant here. Most of
//! them are recoverable and are handled at the component boundary where they
//! occur; see [`WineRpcError::is_recoverable`].

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the winerpc library.
#[derive(Debug, Error)]
pub enum WineRpcError {
    // App registry errors
    #[error("Failed to load app registry from {path:?}: {message}")]
    Registry { path: PathBuf, message: String },

    // IPC errors
    #[error("IPC transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Not connected to the IPC endpoint")]
    NotConnected,

    #[error("IPC protocol error: {message}")]
    Protocol { message: String },

    #[error("Presence update rejected by endpoint ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    // Plugin errors
    #[error("Plugin not found: {name}")]
    PluginLoad { name: String },

    #[error("Plugin {name} failed: {message}")]
    PluginRuntime { name: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for winerpc operations.
pub type Result<T> = std::result::Result<T, WineRpcError>;

impl From<std::io::Error> for WineRpcError {
    fn from(err: std::io::Error) -> Self {
        WineRpcError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WineRpcError {
    fn from(err: serde_json::Error) -> Self {
        WineRpcError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WineRpcError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WineRpcError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Wrap a socket-level failure.
    pub fn transport(err: std::io::Error) -> Self {
        WineRpcError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a protocol error from any displayable message.
    pub fn protocol(message: impl Into<String>) -> Self {
        WineRpcError::Protocol {
            message: message.into(),
        }
    }

    /// Check if this error should demote the presence channel and trigger a
    /// reconnect.
    ///
    /// Protocol errors are included: a malformed reply usually means the chat
    /// client restarted underneath us.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WineRpcError::Transport { .. }
                | WineRpcError::NotConnected
                | WineRpcError::Protocol { .. }
                | WineRpcError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WineRpcError::PluginLoad {
            name: "missing".into(),
        };
        assert_eq!(err.to_string(), "Plugin not found: missing");
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(WineRpcError::Timeout(std::time::Duration::from_secs(5)).is_recoverable());
        assert!(WineRpcError::protocol("bad ack").is_recoverable());
        assert!(WineRpcError::transport(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe
        ))
        .is_recoverable());
        assert!(!WineRpcError::Rejected {
            code: 4000,
            message: "invalid asset".into()
        }
        .is_recoverable());
        assert!(!WineRpcError::PluginLoad {
            name: "x".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let err: WineRpcError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(matches!(err, WineRpcError::Io { source: Some(_), .. }));
    }
}
