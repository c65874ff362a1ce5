//! In-memory stand-in for the Discord IPC endpoint, used by unit tests.

use super::protocol::{read_frame, write_frame, Frame, Opcode};
use super::transport::{BoxedStream, Connector};
use crate::cancel::CancellationToken;
use crate::error::{Result, WineRpcError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

#[derive(Default)]
struct Inner {
    frames: Mutex<Vec<Frame>>,
    attempts: AtomicUsize,
    refuse: AtomicBool,
    malformed_ack: AtomicBool,
    reject: AtomicBool,
    ping: AtomicBool,
    sessions: Mutex<Vec<JoinHandle<()>>>,
    kill: Mutex<CancellationToken>,
}

/// Records every frame it receives and answers like a Discord client.
#[derive(Clone, Default)]
pub(crate) struct FakeEndpoint {
    inner: Arc<Inner>,
}

struct FakeConnector {
    inner: Arc<Inner>,
}

impl FakeEndpoint {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            inner: Arc::clone(&self.inner),
        })
    }

    pub(crate) fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn send_malformed_ack(&self, malformed: bool) {
        self.inner.malformed_ack.store(malformed, Ordering::SeqCst);
    }

    pub(crate) fn reject_activity(&self, reject: bool) {
        self.inner.reject.store(reject, Ordering::SeqCst);
    }

    pub(crate) fn ping_before_reply(&self, ping: bool) {
        self.inner.ping.store(ping, Ordering::SeqCst);
    }

    /// Number of connection attempts, refused ones included.
    pub(crate) fn connect_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Payloads of all received frames with the given opcode.
    pub(crate) fn frames_with(&self, opcode: Opcode) -> Vec<Value> {
        self.inner
            .frames
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.opcode == opcode)
            .map(|f| f.payload.clone())
            .collect()
    }

    /// Activities of all `SET_ACTIVITY` commands; `None` for clears.
    pub(crate) fn activity_updates(&self) -> Vec<Option<Value>> {
        self.frames_with(Opcode::Frame)
            .into_iter()
            .filter(|p| p["cmd"] == "SET_ACTIVITY")
            .map(|p| p["args"].get("activity").cloned())
            .collect()
    }

    /// Kill every open session, as if the chat client had exited.
    ///
    /// Returns once the endpoint side of each session is closed.
    pub(crate) async fn drop_sessions(&self) {
        {
            let mut kill = self.inner.kill.lock().unwrap();
            kill.cancel();
            *kill = CancellationToken::new();
        }

        let sessions: Vec<JoinHandle<()>> = self.inner.sessions.lock().unwrap().drain(..).collect();
        for session in sessions {
            let _ = session.await;
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<BoxedStream> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Err(WineRpcError::transport(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let kill = self.inner.kill.lock().unwrap().clone();
        let session = tokio::spawn(serve(Arc::clone(&self.inner), server, kill));
        self.inner.sessions.lock().unwrap().push(session);

        Ok(Box::new(client))
    }
}

async fn next_frame(stream: &mut DuplexStream, kill: &CancellationToken) -> Option<Frame> {
    tokio::select! {
        biased;
        _ = kill.cancelled() => None,
        frame = read_frame(stream) => frame.ok().flatten(),
    }
}

async fn serve(inner: Arc<Inner>, mut stream: DuplexStream, kill: CancellationToken) {
    while let Some(frame) = next_frame(&mut stream, &kill).await {
        inner.frames.lock().unwrap().push(frame.clone());

        let reply = match frame.opcode {
            Opcode::Handshake => {
                if inner.malformed_ack.load(Ordering::SeqCst) {
                    json!({ "garbage": true })
                } else {
                    json!({
                        "cmd": "DISPATCH",
                        "evt": "READY",
                        "data": { "v": 1, "user": { "id": "1", "username": "tester" } }
                    })
                }
            }
            Opcode::Frame => {
                if inner.ping.load(Ordering::SeqCst) {
                    if write_frame(&mut stream, Opcode::Ping, &json!({})).await.is_err() {
                        return;
                    }
                    match next_frame(&mut stream, &kill).await {
                        Some(pong) => inner.frames.lock().unwrap().push(pong),
                        None => return,
                    }
                }

                let payload = &frame.payload;
                if inner.reject.load(Ordering::SeqCst) {
                    json!({
                        "cmd": payload["cmd"],
                        "evt": "ERROR",
                        "nonce": payload["nonce"],
                        "data": { "code": 4000, "message": "rejected by test" }
                    })
                } else {
                    json!({
                        "cmd": payload["cmd"],
                        "evt": null,
                        "nonce": payload["nonce"],
                        "data": payload["args"].get("activity").cloned().unwrap_or(Value::Null)
                    })
                }
            }
            Opcode::Close => return,
            Opcode::Ping | Opcode::Pong => continue,
        };

        if write_frame(&mut stream, Opcode::Frame, &reply).await.is_err() {
            return;
        }
    }
}
