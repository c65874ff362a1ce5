//! Polling loop that turns process snapshots into presence updates.

use super::context::RuntimeContext;
use super::now_timestamp;
use crate::config::IpcConfig;
use crate::ipc::{PresenceChannel, PresenceState};
use crate::plugins::{PluginRegistry, PluginSupervisor, PluginTaskHandle};
use crate::process::{find_active_app, ProcessLister, ProcessSnapshot};
use crate::registry::AppEntry;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Exponential delay between reconnect attempts.
#[derive(Debug)]
struct Backoff {
    initial: Duration,
    max: Duration,
    delay: Duration,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            delay: initial,
            retry_at: None,
        }
    }

    fn ready(&self) -> bool {
        self.retry_at.map_or(true, |at| Instant::now() >= at)
    }

    /// Schedule the next attempt. Returns the delay until then.
    fn failed(&mut self) -> Duration {
        let delay = self.delay;
        self.retry_at = Some(Instant::now() + delay);
        self.delay = (delay * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.delay = self.initial;
        self.retry_at = None;
    }

    /// Connect `channel` unless it is connected already or the backoff has not
    /// elapsed. Returns whether the channel is connected afterwards.
    async fn connect(&mut self, channel: &mut PresenceChannel) -> bool {
        if channel.is_connected() {
            return true;
        }
        if !self.ready() {
            return false;
        }

        match channel.connect().await {
            Ok(()) => {
                self.reset();
                true
            }
            Err(e) => {
                let delay = self.failed();
                warn!("Cannot reach Discord ({}), retrying in {:?}", e, delay);
                false
            }
        }
    }
}

/// Owns the poll cadence, the plugin supervisor and the detected-app field.
pub struct MainLoop<L> {
    ctx: Arc<RuntimeContext>,
    lister: L,
    supervisor: PluginSupervisor,
    backoff: Backoff,
    /// Elapsed-time anchor of the current app.
    started_at: Option<i64>,
    host_version: Option<String>,
}

impl<L: ProcessLister> MainLoop<L> {
    /// A loop that can start the built-in plugins.
    pub fn new(ctx: Arc<RuntimeContext>, lister: L) -> Self {
        Self::with_plugins(ctx, lister, PluginRegistry::with_builtins())
    }

    pub fn with_plugins(ctx: Arc<RuntimeContext>, lister: L, plugins: PluginRegistry) -> Self {
        let config = ctx.config();
        let backoff = Backoff::new(config.reconnect_initial(), config.reconnect_max());
        let supervisor = PluginSupervisor::new(plugins, ctx.shutdown_token().clone());

        Self {
            ctx,
            lister,
            supervisor,
            backoff,
            started_at: None,
            host_version: None,
        }
    }

    /// Run until the shutdown token is cancelled, then shut down.
    ///
    /// Returns the final state of every plugin task.
    pub async fn run(mut self) -> Vec<PluginTaskHandle> {
        let ctx = Arc::clone(&self.ctx);
        let config = ctx.config();

        self.supervisor.start(&config.plugins, Arc::clone(&ctx));

        {
            let mut channel = ctx.presence().lock().await;
            self.backoff.connect(&mut channel).await;
        }

        info!("Polling processes every {:?}", config.poll_interval());
        let mut interval = tokio::time::interval(config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let shutdown = ctx.shutdown_token();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }

        self.shutdown().await
    }

    /// One poll cycle: snapshot, match, and reconcile the presence.
    pub async fn tick(&mut self) {
        let snapshot = self.lister.snapshot();
        let wine_required = self.ctx.config().require_wine_server;
        let detected = if wine_required && snapshot.host_server.is_none() {
            None
        } else {
            find_active_app(&snapshot, self.ctx.registry())
        };

        let ctx = Arc::clone(&self.ctx);
        let mut channel = ctx.presence().lock().await;
        let badge_changed = self.update_host_badge(&snapshot, &mut channel);

        match (ctx.current_app(), &detected) {
            (None, Some(app)) => {
                info!("Detected {}", app.title);
                self.started_at = Some(now_timestamp());
                self.publish(&mut channel, app).await;
            }
            (Some(previous), None) => {
                info!("{} is no longer running", previous.title);
                self.started_at = None;
                if channel.is_connected() {
                    if let Err(e) = channel.clear_presence().await {
                        warn!("Failed to clear presence: {}", e);
                    }
                }
            }
            (Some(previous), Some(app)) if previous != *app => {
                info!("Switched from {} to {}", previous.title, app.title);
                self.started_at = Some(now_timestamp());
                self.publish(&mut channel, app).await;
            }
            (Some(_), Some(app)) => {
                if *channel.state() == PresenceState::Disconnected {
                    debug!("Presence channel is down, republishing {}", app.title);
                    self.publish(&mut channel, app).await;
                } else if badge_changed {
                    if let Err(e) = channel.republish().await {
                        warn!("Failed to refresh presence for {}: {}", app.title, e);
                    }
                }
            }
            (None, None) => {}
        }

        drop(channel);
        ctx.set_current_app(detected);
    }

    async fn publish(&mut self, channel: &mut PresenceChannel, app: &Arc<AppEntry>) {
        if !self.backoff.connect(channel).await {
            return;
        }

        let start = *self.started_at.get_or_insert_with(now_timestamp);
        if let Err(e) = channel.set_presence(Arc::clone(app), start).await {
            warn!("Failed to publish presence for {}: {}", app.title, e);
        }
    }

    /// Keep the Wine badge in sync with the running wineserver. Returns whether
    /// it changed.
    fn update_host_badge(
        &mut self,
        snapshot: &ProcessSnapshot,
        channel: &mut PresenceChannel,
    ) -> bool {
        if !self.ctx.config().show_wine_version {
            return false;
        }

        let version = snapshot
            .host_server
            .as_ref()
            .and_then(|server| server.version.clone());
        if version == self.host_version {
            return false;
        }

        match &version {
            Some(version) => info!("Running under {}", version),
            None => debug!("Wine server no longer running"),
        }
        channel.set_host_badge(
            version.as_ref().map(|_| IpcConfig::WINE_LOGO_URL.to_string()),
            version.clone(),
        );
        self.host_version = version;
        true
    }

    async fn shutdown(mut self) -> Vec<PluginTaskHandle> {
        info!("Shutting down");
        self.ctx.presence().lock().await.disconnect().await;

        let timeout = self.ctx.config().plugin_shutdown_timeout();
        self.supervisor.shutdown(timeout).await
    }
}
