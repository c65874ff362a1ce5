//! Discord local RPC wire format.
//!
//! Every frame is an opcode and a length, both little-endian `u32`, followed by a
//! UTF-8 JSON payload of that length.
//!
//! ```text
//! [u32 LE: opcode][u32 LE: len][UTF-8 JSON bytes of len]
//! ```
//!
//! Commands are sent as `FRAME` payloads carrying a `nonce`; the endpoint echoes the
//! nonce in its reply.

use crate::config::IpcConfig;
use crate::error::{Result, WineRpcError};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = WineRpcError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(WineRpcError::protocol(format!("unknown opcode {}", other))),
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub opcode: Opcode,
    pub payload: serde_json::Value,
}

/// First frame sent on a new connection.
#[derive(Debug, Clone, Serialize)]
pub struct Handshake<'a> {
    pub v: u32,
    pub client_id: &'a str,
}

impl<'a> Handshake<'a> {
    pub fn new(client_id: &'a str) -> Self {
        Self {
            v: IpcConfig::PROTOCOL_VERSION,
            client_id,
        }
    }
}

/// Start timestamp of an activity (Unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTimestamps {
    pub start: i64,
}

/// Image keys and hover texts of an activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_text: Option<String>,
}

/// Rich presence payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub timestamps: ActivityTimestamps,
    pub assets: ActivityAssets,
}

/// A command sent in a `FRAME`.
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    pub cmd: &'static str,
    pub args: serde_json::Value,
    pub nonce: String,
}

impl Command {
    pub const SET_ACTIVITY: &'static str = "SET_ACTIVITY";

    /// `SET_ACTIVITY` with a payload, or without one to clear the presence.
    pub fn set_activity(pid: u32, activity: Option<&Activity>) -> Self {
        let mut args = serde_json::json!({ "pid": pid });
        if let Some(activity) = activity {
            args["activity"] = serde_json::to_value(activity).unwrap_or(serde_json::Value::Null);
        }

        Self {
            cmd: Self::SET_ACTIVITY,
            args,
            nonce: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Reply or event received in a `FRAME`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub evt: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl Response {
    pub const EVT_READY: &'static str = "READY";
    pub const EVT_ERROR: &'static str = "ERROR";

    pub fn is_ready(&self) -> bool {
        self.cmd.as_deref() == Some("DISPATCH") && self.evt.as_deref() == Some(Self::EVT_READY)
    }

    pub fn is_error(&self) -> bool {
        self.evt.as_deref() == Some(Self::EVT_ERROR)
    }

    /// Error code and message of an `ERROR` event.
    pub fn error_details(&self) -> (i64, String) {
        let data = self.data.as_ref();
        let code = data
            .and_then(|d| d.get("code"))
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        let message = data
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error")
            .to_string();
        (code, message)
    }
}

/// Code and reason carried by a `CLOSE` frame.
pub fn close_reason(payload: &serde_json::Value) -> String {
    let code = payload.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
    let message = payload
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("no reason given");
    format!("{} ({})", message, code)
}

/// Read a frame from an async reader.
///
/// Returns `None` on clean EOF (peer closed connection). Socket failures map to
/// `Transport`, malformed frames to `Protocol`.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Frame>> {
    let mut header = [0u8; 8];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(WineRpcError::transport(e)),
    }

    let opcode = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    if len > IpcConfig::MAX_FRAME_SIZE {
        return Err(WineRpcError::protocol(format!(
            "frame size {} exceeds maximum {}",
            len,
            IpcConfig::MAX_FRAME_SIZE
        )));
    }

    let opcode = Opcode::try_from(opcode)?;

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(WineRpcError::transport)?;

    let payload = serde_json::from_slice(&payload)
        .map_err(|e| WineRpcError::protocol(format!("invalid frame payload: {}", e)))?;

    Ok(Some(Frame { opcode, payload }))
}

/// Write a frame to an async writer.
pub async fn write_frame<W, T>(writer: &mut W, opcode: Opcode, payload: &T) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(payload)?;
    let mut buf = Vec::with_capacity(8 + bytes.len());
    buf.extend_from_slice(&(opcode as u32).to_le_bytes());
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&bytes);

    writer.write_all(&buf).await.map_err(WineRpcError::transport)?;
    writer.flush().await.map_err(WineRpcError::transport)?;
    Ok(())
}
