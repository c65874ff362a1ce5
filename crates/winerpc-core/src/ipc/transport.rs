//! Opening the local transport to the chat client.
//!
//! The presence channel only needs a bidirectional byte stream. [`Connector`] is
//! the seam that produces one, so the channel can run against a real socket or an
//! in-memory pipe.

use crate::error::{Result, WineRpcError};
use crate::platform;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// A connected, bidirectional byte stream.
pub trait IpcStream: AsyncRead + AsyncWrite + Unpin + Send + Sync {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync> IpcStream for T {}

pub type BoxedStream = Box<dyn IpcStream>;

/// Opens a new transport to the IPC endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<BoxedStream>;
}

/// Connects to the first listening Discord socket or named pipe.
#[derive(Debug, Clone)]
pub struct LocalSocketConnector {
    candidates: Vec<PathBuf>,
}

impl Default for LocalSocketConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSocketConnector {
    /// Probe the platform's well-known endpoint locations.
    pub fn new() -> Self {
        Self::with_candidates(platform::ipc_endpoint_candidates())
    }

    /// Probe an explicit list of endpoints, in order.
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    #[cfg(unix)]
    async fn open(path: &std::path::Path) -> std::io::Result<BoxedStream> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    async fn open(path: &std::path::Path) -> std::io::Result<BoxedStream> {
        let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
        Ok(Box::new(pipe))
    }

    #[cfg(not(any(unix, windows)))]
    async fn open(_path: &std::path::Path) -> std::io::Result<BoxedStream> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "local IPC is not supported on this platform",
        ))
    }
}

#[async_trait]
impl Connector for LocalSocketConnector {
    async fn connect(&self) -> Result<BoxedStream> {
        let mut last_error = None;

        for path in &self.candidates {
            match Self::open(path).await {
                Ok(stream) => {
                    debug!("Connected to IPC endpoint {}", path.display());
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(WineRpcError::Transport {
            message: format!(
                "no IPC endpoint is listening ({} candidates tried)",
                self.candidates.len()
            ),
            source: last_error,
        })
    }
}
