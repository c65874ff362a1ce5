//! JSON-backed registry of applications that can be detected.

use crate::error::{Result, WineRpcError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A known application.
///
/// Executable names are stored lowercased and deduplicated, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppEntry {
    pub title: String,
    pub executable_names: Vec<String>,
    pub icon_url: Option<String>,
}

impl AppEntry {
    /// Build an entry, normalising executable names.
    ///
    /// Returns `None` when no usable executable name remains.
    pub fn new<I, S>(
        title: impl Into<String>,
        executable_names: I,
        icon_url: Option<String>,
    ) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        for name in executable_names {
            let name = name.as_ref().trim().to_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }

        if names.is_empty() {
            return None;
        }

        Some(Self {
            title: title.into(),
            executable_names: names,
            icon_url,
        })
    }

    /// Case-insensitive exact comparison against one executable name.
    pub fn matches_executable(&self, executable_name: &str) -> bool {
        let executable_name = executable_name.to_lowercase();
        self.executable_names.iter().any(|name| *name == executable_name)
    }
}

/// `exe` may be a single string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExeField {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawAppEntry {
    title: String,
    exe: Option<ExeField>,
    #[serde(default)]
    icon: Option<String>,
}

/// Ordered list of known applications.
#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    entries: Vec<Arc<AppEntry>>,
}

impl AppRegistry {
    /// Create a registry from already-built entries, keeping their order.
    pub fn from_entries(entries: impl IntoIterator<Item = AppEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(Arc::new).collect(),
        }
    }

    /// Load the registry from a JSON file.
    ///
    /// Fails only if the file cannot be read or is not a JSON array. Individual
    /// entries that are malformed are skipped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| WineRpcError::Registry {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let registry = Self::parse(&content).map_err(|e| WineRpcError::Registry {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        info!("Loaded {} apps from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Load the registry, degrading to an empty one on failure.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(registry) => registry,
            Err(e) => {
                warn!("{}; continuing with an empty app registry", e);
                Self::default()
            }
        }
    }

    /// Parse registry JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        let values: Vec<serde_json::Value> = serde_json::from_str(content)?;
        let mut entries = Vec::with_capacity(values.len());

        for (index, value) in values.into_iter().enumerate() {
            let raw: RawAppEntry = match serde_json::from_value(value) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping app registry entry #{}: {}", index, e);
                    continue;
                }
            };

            let names = match raw.exe {
                Some(ExeField::One(name)) => vec![name],
                Some(ExeField::Many(names)) => names,
                None => {
                    warn!(
                        "Skipping app registry entry #{} ({}): missing \"exe\"",
                        index, raw.title
                    );
                    continue;
                }
            };

            match AppEntry::new(raw.title.clone(), names, raw.icon) {
                Some(entry) => entries.push(Arc::new(entry)),
                None => warn!(
                    "Skipping app registry entry #{} ({}): no executable names",
                    index, raw.title
                ),
            }
        }

        Ok(Self { entries })
    }

    /// Entries in registry order.
    pub fn entries(&self) -> &[Arc<AppEntry>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AppEntry>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
