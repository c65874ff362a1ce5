//! Statically linked plugin modules and the name-keyed registry they live in.

use super::builtin;
use super::supervisor::PluginTaskHandle;
use crate::error::{Result, WineRpcError};
use crate::runtime::RuntimeContext;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Future returned by a plugin entry point.
pub type PluginFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Entry capability: runs the plugin against the shared context.
pub type EntryFn = Arc<dyn Fn(Arc<RuntimeContext>) -> PluginFuture + Send + Sync>;

/// Exit capability: called once with the final state after the task ends.
pub type ExitFn = Arc<dyn Fn(&PluginTaskHandle) + Send + Sync>;

/// A plugin: a name plus optional entry and exit capabilities.
#[derive(Clone)]
pub struct PluginModule {
    name: String,
    entry: Option<EntryFn>,
    exit: Option<ExitFn>,
}

impl PluginModule {
    /// A module with no capabilities. The supervisor skips it until an entry is set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            exit: None,
        }
    }

    pub fn with_entry<F, Fut>(mut self, entry: F) -> Self
    where
        F: Fn(Arc<RuntimeContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.entry = Some(Arc::new(move |ctx| entry(ctx).boxed()));
        self
    }

    pub fn with_exit<F>(mut self, exit: F) -> Self
    where
        F: Fn(&PluginTaskHandle) + Send + Sync + 'static,
    {
        self.exit = Some(Arc::new(exit));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> Option<&EntryFn> {
        self.entry.as_ref()
    }

    pub fn exit(&self) -> Option<&ExitFn> {
        self.exit.as_ref()
    }
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModule")
            .field("name", &self.name)
            .field("entry", &self.entry.is_some())
            .field("exit", &self.exit.is_some())
            .finish()
    }
}

/// Plugins available to the supervisor, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    modules: BTreeMap<String, PluginModule>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the plugins shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for module in builtin::modules() {
            registry.register(module);
        }
        registry
    }

    /// Add a module, replacing and returning any module of the same name.
    pub fn register(&mut self, module: PluginModule) -> Option<PluginModule> {
        self.modules.insert(module.name.clone(), module)
    }

    /// Resolve a configured plugin name.
    pub fn get(&self, name: &str) -> Result<&PluginModule> {
        self.modules.get(name).ok_or_else(|| WineRpcError::PluginLoad {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}
