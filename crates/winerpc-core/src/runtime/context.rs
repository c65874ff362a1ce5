//! State shared between the main loop and plugin tasks.
//!
//! | Field         | Writer             | Readers                          |
//! |---------------|--------------------|----------------------------------|
//! | `current_app` | main loop only     | plugins, via watch subscriptions |
//! | `presence`    | current lock owner | current lock owner               |
//! | `config`      | none (immutable)   | everyone                         |
//! | `registry`    | none (immutable)   | everyone                         |
//! | `shutdown`    | supervisor, CLI    | everyone                         |

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::ipc::{Connector, PresenceChannel, PresenceState};
use crate::registry::{AppEntry, AppRegistry};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};

/// Shared handle to the single [`PresenceChannel`].
///
/// Callers that need to read the state and act on it atomically should hold
/// [`lock`](Self::lock) across both steps.
#[derive(Clone)]
pub struct PresenceHandle {
    channel: Arc<Mutex<PresenceChannel>>,
}

impl PresenceHandle {
    pub fn new(channel: PresenceChannel) -> Self {
        Self {
            channel: Arc::new(Mutex::new(channel)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, PresenceChannel> {
        self.channel.lock().await
    }

    pub async fn state(&self) -> PresenceState {
        self.channel.lock().await.state().clone()
    }
}

/// Everything a plugin can see and act on.
pub struct RuntimeContext {
    config: Arc<Config>,
    registry: Arc<AppRegistry>,
    presence: PresenceHandle,
    current_app: watch::Sender<Option<Arc<AppEntry>>>,
    shutdown: CancellationToken,
}

impl RuntimeContext {
    /// Build a context whose presence channel uses `config.app_id` as client id.
    pub fn new(
        config: Arc<Config>,
        registry: Arc<AppRegistry>,
        connector: Arc<dyn Connector>,
        shutdown: CancellationToken,
    ) -> Self {
        let channel = PresenceChannel::new(config.app_id.clone(), connector);
        let (current_app, _) = watch::channel(None);

        Self {
            config,
            registry,
            presence: PresenceHandle::new(channel),
            current_app,
            shutdown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    pub fn presence(&self) -> &PresenceHandle {
        &self.presence
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// App detected by the most recent poll.
    pub fn current_app(&self) -> Option<Arc<AppEntry>> {
        Option::clone(&self.current_app.borrow())
    }

    /// Receiver that observes every change of the detected app.
    pub fn subscribe_app(&self) -> watch::Receiver<Option<Arc<AppEntry>>> {
        self.current_app.subscribe()
    }

    /// Wait until an app is detected. Returns `None` if shutdown comes first.
    pub async fn wait_for_app(&self) -> Option<Arc<AppEntry>> {
        let mut receiver = self.current_app.subscribe();
        loop {
            let app = Option::clone(&receiver.borrow_and_update());
            if app.is_some() {
                return app;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                changed = receiver.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    /// Replace the detected app. Returns whether it changed.
    ///
    /// Only the main loop writes this field.
    pub(crate) fn set_current_app(&self, app: Option<Arc<AppEntry>>) -> bool {
        self.current_app.send_if_modified(|current| {
            if *current == app {
                false
            } else {
                *current = app;
                true
            }
        })
    }
}
