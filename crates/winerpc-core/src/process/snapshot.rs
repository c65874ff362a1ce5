//! Process table snapshots.

use super::wine;
use std::path::PathBuf;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tracing::debug;

/// One process as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Guest-level executable name, lowercased (e.g. `game.exe`).
    pub executable_name: String,
    /// Process ID.
    pub pid: u32,
    /// Start time in seconds since the Unix epoch (0 if unknown).
    pub start_time: u64,
}

impl ProcessEntry {
    pub fn new(executable_name: impl Into<String>, pid: u32) -> Self {
        Self {
            executable_name: executable_name.into(),
            pid,
            start_time: 0,
        }
    }
}

/// A running Wine server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostServer {
    pub path: PathBuf,
    /// Version string such as `Wine 9.0`, if it could be read.
    pub version: Option<String>,
}

/// Processes captured in one poll tick, newest first.
#[derive(Debug, Clone, Default)]
pub struct ProcessSnapshot {
    pub processes: Vec<ProcessEntry>,
    pub host_server: Option<HostServer>,
}

impl ProcessSnapshot {
    pub fn new(processes: Vec<ProcessEntry>) -> Self {
        Self {
            processes,
            host_server: None,
        }
    }

    pub fn with_host_server(mut self, host_server: HostServer) -> Self {
        self.host_server = Some(host_server);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }
}

/// Source of process snapshots, consulted once per tick.
pub trait ProcessLister: Send {
    fn snapshot(&mut self) -> ProcessSnapshot;
}

/// Process lister backed by `sysinfo`.
///
/// Keeps the `System` between ticks and caches the Wine version per
/// wineserver binary. Executable paths and command lines are re-read on every
/// refresh: Wine rewrites a loader's argv to the guest path after start, and
/// `exec` replaces both under the same pid.
pub struct SysinfoLister {
    system: System,
    version_cache: Option<HostServer>,
}

impl Default for SysinfoLister {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoLister {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            version_cache: None,
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::new()
                .with_exe(UpdateKind::Always)
                .with_cmd(UpdateKind::Always),
        );
    }

    fn host_server(&mut self, path: PathBuf) -> HostServer {
        if let Some(cached) = &self.version_cache {
            if cached.path == path {
                return cached.clone();
            }
        }

        let server = HostServer {
            version: wine::wineserver_version(&path),
            path,
        };
        debug!(
            "Using wineserver {:?} ({})",
            server.path,
            server.version.as_deref().unwrap_or("unknown version")
        );
        self.version_cache = Some(server.clone());
        server
    }
}

impl ProcessLister for SysinfoLister {
    fn snapshot(&mut self) -> ProcessSnapshot {
        self.refresh();

        let mut processes = Vec::with_capacity(self.system.processes().len());
        let mut server_path = None;

        for (pid, process) in self.system.processes() {
            let host_name = match process.exe() {
                Some(exe) => exe
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                None => process.name().to_string_lossy().into_owned(),
            };
            if host_name.is_empty() {
                continue;
            }

            if server_path.is_none() && wine::is_wineserver(&host_name) {
                server_path = process.exe().map(|p| p.to_path_buf());
            }

            let cmdline: Vec<String> = process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect();

            processes.push(ProcessEntry {
                executable_name: wine::guest_executable_name(&host_name, &cmdline),
                pid: pid.as_u32(),
                start_time: process.start_time(),
            });
        }

        processes.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.pid.cmp(&a.pid)));

        let mut snapshot = ProcessSnapshot::new(processes);
        if let Some(path) = server_path {
            snapshot = snapshot.with_host_server(self.host_server(path));
        }
        snapshot
    }
}
