//! Runs plugin entry points as independent tasks and tracks their lifecycle.
//!
//! Every started plugin gets two tasks: the plugin itself and a monitor that
//! awaits it. The monitor records the final state and then calls the exit
//! capability, so the hook always runs after the plugin task has terminated and
//! runs exactly once, whether the plugin returned, failed, panicked or was
//! aborted.

use super::module::{ExitFn, PluginModule, PluginRegistry};
use crate::cancel::CancellationToken;
use crate::config::PluginConfig;
use crate::error::WineRpcError;
use crate::runtime::RuntimeContext;
use futures::future::join_all;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Lifecycle state of a plugin task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginTaskState {
    Running,
    Completed,
    /// Returned an error, panicked or was aborted at shutdown.
    Failed(String),
}

impl PluginTaskState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, PluginTaskState::Running)
    }
}

impl fmt::Display for PluginTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginTaskState::Running => write!(f, "running"),
            PluginTaskState::Completed => write!(f, "completed"),
            PluginTaskState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Snapshot of a plugin task, handed to exit hooks and reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginTaskHandle {
    pub id: usize,
    pub name: String,
    pub state: PluginTaskState,
}

struct TrackedTask {
    id: usize,
    name: String,
    state: Arc<Mutex<PluginTaskState>>,
    abort: AbortHandle,
    monitor: JoinHandle<()>,
}

impl TrackedTask {
    fn handle(&self) -> PluginTaskHandle {
        PluginTaskHandle {
            id: self.id,
            name: self.name.clone(),
            state: lock_state(&self.state).clone(),
        }
    }
}

/// Lock a task state. A poisoned lock still holds a valid state.
fn lock_state(state: &Mutex<PluginTaskState>) -> MutexGuard<'_, PluginTaskState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts plugins once and shuts them down with a bounded wait.
pub struct PluginSupervisor {
    registry: PluginRegistry,
    shutdown: CancellationToken,
    tasks: Vec<TrackedTask>,
    started: bool,
}

impl PluginSupervisor {
    /// `shutdown` is the token plugins observe; [`shutdown`](Self::shutdown) cancels it.
    pub fn new(registry: PluginRegistry, shutdown: CancellationToken) -> Self {
        Self {
            registry,
            shutdown,
            tasks: Vec::new(),
            started: false,
        }
    }

    /// Resolve and spawn the named plugins. Returns how many were started.
    ///
    /// Unknown names and modules without an entry capability are skipped. Only
    /// the first call has any effect.
    pub fn start(&mut self, names: &[String], ctx: Arc<RuntimeContext>) -> usize {
        if self.started {
            warn!("Plugin supervisor already started, ignoring");
            return 0;
        }
        self.started = true;

        for name in names {
            let module = match self.registry.get(name) {
                Ok(module) => module.clone(),
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            self.spawn(module, Arc::clone(&ctx));
        }

        info!("Started {} of {} plugins", self.tasks.len(), names.len());
        self.tasks.len()
    }

    fn spawn(&mut self, module: PluginModule, ctx: Arc<RuntimeContext>) {
        let Some(entry) = module.entry().cloned() else {
            debug!("Plugin {} has no entry point, skipping", module.name());
            return;
        };

        let id = self.tasks.len();
        let name = module.name().to_string();
        let state = Arc::new(Mutex::new(PluginTaskState::Running));

        let task = tokio::spawn(async move { entry(ctx).await });
        let abort = task.abort_handle();
        let monitor = tokio::spawn(monitor(
            id,
            name.clone(),
            task,
            Arc::clone(&state),
            module.exit().cloned(),
        ));

        debug!("Plugin {} started as task {}", name, id);
        self.tasks.push(TrackedTask {
            id,
            name,
            state,
            abort,
            monitor,
        });
    }

    /// Current state of every started plugin, in start order.
    pub fn tasks(&self) -> Vec<PluginTaskHandle> {
        self.tasks.iter().map(TrackedTask::handle).collect()
    }

    /// Cancel the shared token and wait up to `timeout` for plugins to finish.
    ///
    /// Plugins still running afterwards are aborted; their exit hooks are given
    /// [`PluginConfig::ABORT_GRACE`] to run. Returns the final task report.
    pub async fn shutdown(&mut self, timeout: Duration) -> Vec<PluginTaskHandle> {
        self.shutdown.cancel();

        let monitors = join_all(self.pending_monitors());
        if tokio::time::timeout(timeout, monitors).await.is_err() {
            for task in self.tasks.iter().filter(|t| !t.monitor.is_finished()) {
                warn!(
                    "Plugin {} did not stop within {:?}, aborting",
                    task.name, timeout
                );
                task.abort.abort();
            }

            let monitors = join_all(self.pending_monitors());
            if tokio::time::timeout(PluginConfig::ABORT_GRACE, monitors)
                .await
                .is_err()
            {
                warn!("Some plugin exit hooks did not finish in time");
            }
        }

        self.tasks()
    }

    fn pending_monitors(&mut self) -> impl Iterator<Item = &mut JoinHandle<()>> {
        self.tasks
            .iter_mut()
            .filter(|t| !t.monitor.is_finished())
            .map(|t| &mut t.monitor)
    }
}

async fn monitor(
    id: usize,
    name: String,
    task: JoinHandle<anyhow::Result<()>>,
    state: Arc<Mutex<PluginTaskState>>,
    exit: Option<ExitFn>,
) {
    let final_state = match task.await {
        Ok(Ok(())) => {
            info!("Plugin {} completed", name);
            PluginTaskState::Completed
        }
        Ok(Err(e)) => failed(&name, format!("{:#}", e)),
        Err(e) => failed(&name, join_error_message(e)),
    };

    *lock_state(&state) = final_state.clone();

    if let Some(exit) = exit {
        let handle = PluginTaskHandle {
            id,
            name,
            state: final_state,
        };
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| exit(&handle))) {
            warn!(
                "Exit hook of plugin {} panicked: {}",
                handle.name,
                panic_message(panic.as_ref())
            );
        }
    }
}

fn failed(name: &str, message: String) -> PluginTaskState {
    let err = WineRpcError::PluginRuntime {
        name: name.to_string(),
        message: message.clone(),
    };
    warn!("{}", err);
    PluginTaskState::Failed(message)
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        "aborted".to_string()
    } else {
        match err.try_into_panic() {
            Ok(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            Err(err) => err.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ipc::testing::FakeEndpoint;
    use crate::registry::AppRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(shutdown: &CancellationToken) -> Arc<RuntimeContext> {
        let endpoint = FakeEndpoint::new();
        Arc::new(RuntimeContext::new(
            Arc::new(Config::new("client-1")),
            Arc::new(AppRegistry::default()),
            endpoint.connector(),
            shutdown.clone(),
        ))
    }

    /// Records every exit hook call.
    fn recording_exit(
        calls: &Arc<Mutex<Vec<PluginTaskHandle>>>,
    ) -> impl Fn(&PluginTaskHandle) + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |handle| calls.lock().unwrap().push(handle.clone())
    }

    async fn panicking(_ctx: Arc<RuntimeContext>) -> anyhow::Result<()> {
        panic!("plugin bug")
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_failing_entry_calls_exit_once_with_failed_state() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(
            PluginModule::new("broken")
                .with_entry(|_| async { anyhow::bail!("boom") })
                .with_exit(recording_exit(&calls)),
        );

        let token = CancellationToken::new();
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        assert_eq!(supervisor.start(&names(&["broken"]), context(&token)), 1);

        let report = supervisor.shutdown(Duration::from_secs(1)).await;

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "broken");
        assert!(matches!(&calls[0].state, PluginTaskState::Failed(m) if m.contains("boom")));
        assert_eq!(report[0].state, calls[0].state);
    }

    #[tokio::test]
    async fn test_unknown_and_entryless_plugins_are_skipped() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let mut registry = PluginRegistry::new();
        registry.register(PluginModule::new("hooks_only").with_exit(|_| {}));
        registry.register(PluginModule::new("worker").with_entry(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }));

        let token = CancellationToken::new();
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        let count = supervisor.start(&names(&["missing", "hooks_only", "worker"]), context(&token));

        assert_eq!(count, 1);
        let report = supervisor.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "worker");
        assert_eq!(report[0].state, PluginTaskState::Completed);
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated_to_its_task() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginModule::new("panics").with_entry(panicking));
        registry.register(PluginModule::new("waits").with_entry(|ctx| async move {
            ctx.shutdown_token().cancelled().await;
            Ok(())
        }));

        let token = CancellationToken::new();
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        supervisor.start(&names(&["panics", "waits"]), context(&token));

        while !supervisor.tasks()[0].state.is_finished() {
            tokio::task::yield_now().await;
        }
        assert_eq!(supervisor.tasks()[1].state, PluginTaskState::Running);

        let report = supervisor.shutdown(Duration::from_secs(1)).await;
        assert!(matches!(&report[0].state, PluginTaskState::Failed(m) if m.contains("plugin bug")));
        assert_eq!(report[1].state, PluginTaskState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_unresponsive_plugin() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = PluginRegistry::new();
        registry.register(
            PluginModule::new("stubborn")
                .with_entry(|_| async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                })
                .with_exit(recording_exit(&calls)),
        );

        let token = CancellationToken::new();
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        supervisor.start(&names(&["stubborn"]), context(&token));

        let report = supervisor.shutdown(Duration::from_millis(100)).await;

        assert!(token.is_cancelled());
        assert_eq!(report[0].state, PluginTaskState::Failed("aborted".to_string()));
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plugin_can_drive_presence_channel() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginModule::new("connects").with_entry(|ctx| async move {
            let mut channel = ctx.presence().lock().await;
            channel.connect().await?;
            channel.clear_presence().await?;
            anyhow::Ok(())
        }));

        let token = CancellationToken::new();
        let ctx = context(&token);
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        supervisor.start(&names(&["connects"]), Arc::clone(&ctx));

        while !supervisor.tasks()[0].state.is_finished() {
            tokio::task::yield_now().await;
        }

        assert_eq!(supervisor.tasks()[0].state, PluginTaskState::Completed);
        assert!(ctx.presence().state().await.is_connected());
        supervisor.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_start_only_once() {
        let mut registry = PluginRegistry::new();
        registry.register(PluginModule::new("worker").with_entry(|_| async { Ok(()) }));

        let token = CancellationToken::new();
        let mut supervisor = PluginSupervisor::new(registry, token.clone());
        let ctx = context(&token);

        assert_eq!(supervisor.start(&names(&["worker"]), Arc::clone(&ctx)), 1);
        assert_eq!(supervisor.start(&names(&["worker"]), ctx), 0);
        assert_eq!(supervisor.shutdown(Duration::from_secs(1)).await.len(), 1);
    }
}
