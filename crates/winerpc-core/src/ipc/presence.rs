//! Presence channel: the connection to the chat client and its state machine.
//!
//! ```text
//!                connect() ok              set_presence() ok
//! Disconnected ───────────────▶ Connected ───────────────────▶ Published
//!      ▲                           ▲  ◀──── clear_presence() ────┘  │
//!      │                           │                                 │ set_presence(other)
//!      └── disconnect() / transport or protocol error (any state) ◀──┘
//! ```
//!
//! The channel is the only owner of the transport. Transport and protocol errors
//! tear the transport down and leave the channel `Disconnected`; reconnecting is
//! the caller's job.

use super::protocol::{
    close_reason, read_frame, write_frame, Activity, ActivityAssets, ActivityTimestamps,
    Command, Handshake, Opcode, Response,
};
use super::transport::{BoxedStream, Connector};
use crate::config::IpcConfig;
use crate::error::{Result, WineRpcError};
use crate::registry::AppEntry;
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// What is currently shown in the chat client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPresence {
    pub app: Arc<AppEntry>,
    /// Elapsed-time anchor, Unix seconds.
    pub start_timestamp: i64,
    /// Optional second line under the title.
    pub state_text: Option<String>,
}

/// Connection and publication state of a [`PresenceChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceState {
    Disconnected,
    Connecting,
    /// Handshake acknowledged, nothing published.
    Connected,
    Published(PublishedPresence),
}

impl PresenceState {
    pub fn is_connected(&self) -> bool {
        matches!(self, PresenceState::Connected | PresenceState::Published(_))
    }

    pub fn published(&self) -> Option<&PublishedPresence> {
        match self {
            PresenceState::Published(presence) => Some(presence),
            _ => None,
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresenceState::Disconnected => write!(f, "disconnected"),
            PresenceState::Connecting => write!(f, "connecting"),
            PresenceState::Connected => write!(f, "connected"),
            PresenceState::Published(p) => write!(f, "published({})", p.app.title),
        }
    }
}

/// Client side of the local rich presence protocol.
pub struct PresenceChannel {
    client_id: String,
    connector: Arc<dyn Connector>,
    stream: Option<BoxedStream>,
    state: PresenceState,
    pid: u32,
    small_image: Option<String>,
    small_text: Option<String>,
}

impl PresenceChannel {
    pub fn new(client_id: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            client_id: client_id.into(),
            connector,
            stream: None,
            state: PresenceState::Disconnected,
            pid: std::process::id(),
            small_image: None,
            small_text: None,
        }
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Set the small image shown next to the app icon, e.g. the Wine logo and
    /// version. Applies from the next published update.
    pub fn set_host_badge(&mut self, image: Option<String>, text: Option<String>) {
        self.small_image = image;
        self.small_text = text;
    }

    fn transition(&mut self, next: PresenceState) {
        if self.state != next {
            debug!("Presence state: {} -> {}", self.state, next);
        }
        self.state = next;
    }

    /// Drop the transport after a failure.
    fn demote(&mut self, err: &WineRpcError) {
        warn!("Presence channel lost: {}", err);
        self.stream = None;
        self.transition(PresenceState::Disconnected);
    }

    /// Open the transport and perform the handshake.
    ///
    /// No-op when already connected. On failure the channel stays
    /// `Disconnected` and the error is returned for the caller to retry.
    pub async fn connect(&mut self) -> Result<()> {
        if self.state.is_connected() {
            return Ok(());
        }

        self.transition(PresenceState::Connecting);

        let connector = Arc::clone(&self.connector);
        let opened = Self::open_and_handshake(connector.as_ref(), &self.client_id).await;
        match opened {
            Ok(stream) => {
                self.stream = Some(stream);
                self.transition(PresenceState::Connected);
                info!("Connected to Discord IPC");
                Ok(())
            }
            Err(e) => {
                self.stream = None;
                self.transition(PresenceState::Disconnected);
                Err(e)
            }
        }
    }

    async fn open_and_handshake(
        connector: &dyn Connector,
        client_id: &str,
    ) -> Result<BoxedStream> {
        let mut stream = tokio::time::timeout(IpcConfig::CONNECT_TIMEOUT, connector.connect())
            .await
            .map_err(|_| WineRpcError::Timeout(IpcConfig::CONNECT_TIMEOUT))??;

        write_frame(&mut stream, Opcode::Handshake, &Handshake::new(client_id)).await?;

        let frame = tokio::time::timeout(IpcConfig::HANDSHAKE_TIMEOUT, read_frame(&mut stream))
            .await
            .map_err(|_| WineRpcError::Timeout(IpcConfig::HANDSHAKE_TIMEOUT))??
            .ok_or_else(|| WineRpcError::protocol("endpoint closed during handshake"))?;

        match frame.opcode {
            Opcode::Frame => {
                let response: Response = serde_json::from_value(frame.payload).map_err(|e| {
                    WineRpcError::protocol(format!("malformed handshake acknowledgement: {}", e))
                })?;
                if response.is_ready() {
                    Ok(stream)
                } else {
                    Err(WineRpcError::protocol(format!(
                        "unexpected handshake acknowledgement: cmd={:?} evt={:?}",
                        response.cmd, response.evt
                    )))
                }
            }
            Opcode::Close => Err(WineRpcError::protocol(format!(
                "handshake refused: {}",
                close_reason(&frame.payload)
            ))),
            other => Err(WineRpcError::protocol(format!(
                "unexpected {:?} frame during handshake",
                other
            ))),
        }
    }

    /// Publish `app` with the given elapsed-time anchor.
    pub async fn set_presence(&mut self, app: Arc<AppEntry>, start_timestamp: i64) -> Result<()> {
        self.set_presence_with_state(app, start_timestamp, None).await
    }

    /// Publish `app` with an optional state line.
    ///
    /// Re-publishing the app and state line already shown sends nothing.
    pub async fn set_presence_with_state(
        &mut self,
        app: Arc<AppEntry>,
        start_timestamp: i64,
        state_text: Option<String>,
    ) -> Result<()> {
        match &self.state {
            PresenceState::Disconnected | PresenceState::Connecting => {
                return Err(WineRpcError::NotConnected)
            }
            PresenceState::Published(current)
                if *current.app == *app && current.state_text == state_text =>
            {
                return Ok(());
            }
            _ => {}
        }

        let activity = self.build_activity(&app, start_timestamp, state_text.as_deref());
        self.send(Command::set_activity(self.pid, Some(&activity)))
            .await?;

        self.transition(PresenceState::Published(PublishedPresence {
            app,
            start_timestamp,
            state_text,
        }));
        Ok(())
    }

    /// Send the published presence again, picking up the current host badge.
    /// No-op when nothing is published.
    pub async fn republish(&mut self) -> Result<()> {
        let current = match &self.state {
            PresenceState::Disconnected | PresenceState::Connecting => {
                return Err(WineRpcError::NotConnected)
            }
            PresenceState::Connected => return Ok(()),
            PresenceState::Published(current) => current.clone(),
        };

        let activity = self.build_activity(
            &current.app,
            current.start_timestamp,
            current.state_text.as_deref(),
        );
        self.send(Command::set_activity(self.pid, Some(&activity)))
            .await?;
        Ok(())
    }

    /// Remove the published presence. No-op when nothing is published.
    pub async fn clear_presence(&mut self) -> Result<()> {
        match self.state {
            PresenceState::Disconnected | PresenceState::Connecting => {
                return Err(WineRpcError::NotConnected)
            }
            PresenceState::Connected => return Ok(()),
            PresenceState::Published(_) => {}
        }

        self.send(Command::set_activity(self.pid, None)).await?;
        self.transition(PresenceState::Connected);
        Ok(())
    }

    /// Close the transport unconditionally.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Best effort: the endpoint may already be gone.
            let _ = write_frame(&mut stream, Opcode::Close, &serde_json::json!({})).await;
            let _ = stream.shutdown().await;
            info!("Disconnected from Discord IPC");
        }
        self.transition(PresenceState::Disconnected);
    }

    fn build_activity(&self, app: &AppEntry, start: i64, state_text: Option<&str>) -> Activity {
        Activity {
            details: Some(format!("Playing {}", app.title)),
            state: state_text.map(str::to_string),
            timestamps: ActivityTimestamps { start },
            assets: ActivityAssets {
                large_image: app.icon_url.clone(),
                large_text: Some(app.title.clone()),
                small_image: self.small_image.clone(),
                small_text: self.small_text.clone(),
            },
        }
    }

    /// Send a command and wait for its reply, demoting on recoverable errors.
    async fn send(&mut self, command: Command) -> Result<Response> {
        let result = self.request(command).await;
        if let Err(e) = &result {
            if e.is_recoverable() {
                self.demote(e);
            }
        }
        result
    }

    async fn request(&mut self, command: Command) -> Result<Response> {
        let stream = self.stream.as_mut().ok_or(WineRpcError::NotConnected)?;
        write_frame(stream, Opcode::Frame, &command).await?;

        let mut skipped = 0;
        loop {
            let frame = tokio::time::timeout(IpcConfig::RESPONSE_TIMEOUT, read_frame(stream))
                .await
                .map_err(|_| WineRpcError::Timeout(IpcConfig::RESPONSE_TIMEOUT))??
                .ok_or_else(|| WineRpcError::Transport {
                    message: "endpoint closed the connection".to_string(),
                    source: None,
                })?;

            match frame.opcode {
                Opcode::Ping => {
                    write_frame(stream, Opcode::Pong, &frame.payload).await?;
                    continue;
                }
                Opcode::Close => {
                    return Err(WineRpcError::protocol(format!(
                        "endpoint closed: {}",
                        close_reason(&frame.payload)
                    )))
                }
                Opcode::Frame => {
                    let response: Response = serde_json::from_value(frame.payload)
                        .map_err(|e| WineRpcError::protocol(format!("malformed reply: {}", e)))?;

                    if response.nonce.as_deref() == Some(command.nonce.as_str()) {
                        if response.is_error() {
                            let (code, message) = response.error_details();
                            return Err(WineRpcError::Rejected { code, message });
                        }
                        return Ok(response);
                    }
                }
                Opcode::Handshake | Opcode::Pong => {}
            }

            skipped += 1;
            if skipped > IpcConfig::MAX_UNRELATED_FRAMES {
                return Err(WineRpcError::protocol(format!(
                    "no reply to {} after {} unrelated frames",
                    command.cmd, skipped
                )));
            }
        }
    }
}
