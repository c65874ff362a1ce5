//! Plugins compiled into the crate.

use super::module::PluginModule;
use crate::runtime::{now_timestamp, RuntimeContext};
use std::sync::Arc;
use tracing::{debug, info};

pub const GREETER_STATUS: &str = "greeter_status";

const GREETING: &str = "Hello World!";

pub(super) fn modules() -> Vec<PluginModule> {
    vec![PluginModule::new(GREETER_STATUS)
        .with_entry(greeter_status)
        .with_exit(|task| info!("Plugin {} exited ({})", task.name, task.state))]
}

/// Wait for the first detected app and show a greeting as its state line.
async fn greeter_status(ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
    loop {
        let Some(app) = ctx.wait_for_app().await else {
            return Ok(());
        };

        {
            let mut channel = ctx.presence().lock().await;
            // Keep the elapsed time the main loop already published.
            let start = channel
                .state()
                .published()
                .filter(|p| p.app == app)
                .map(|p| p.start_timestamp)
                .unwrap_or_else(now_timestamp);

            match channel
                .set_presence_with_state(Arc::clone(&app), start, Some(GREETING.to_string()))
                .await
            {
                Ok(()) => {
                    info!("Greeting shown while playing {}", app.title);
                    return Ok(());
                }
                Err(e) if e.is_recoverable() => debug!("Greeting deferred: {}", e),
                Err(e) => return Err(e.into()),
            }
        }

        tokio::select! {
            _ = ctx.shutdown_token().cancelled() => return Ok(()),
            _ = tokio::time::sleep(ctx.config().poll_interval()) => {}
        }
    }
}
