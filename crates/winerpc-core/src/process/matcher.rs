//! Matching a process snapshot against the app registry.

use super::snapshot::ProcessSnapshot;
use crate::registry::{AppEntry, AppRegistry};
use std::collections::HashSet;
use std::sync::Arc;

/// Find the registry entry for the application currently running, if any.
///
/// An entry matches when one of its executable names equals (ignoring case) the
/// executable name of a process in the snapshot. Entries are tried in registry
/// order and the first match wins, regardless of which process matched or when it
/// started.
///
/// No path handling happens here: the snapshot must already carry bare guest
/// executable names.
pub fn find_active_app(
    snapshot: &ProcessSnapshot,
    registry: &AppRegistry,
) -> Option<Arc<AppEntry>> {
    if snapshot.is_empty() {
        return None;
    }

    let running: HashSet<String> = snapshot
        .processes
        .iter()
        .map(|process| process.executable_name.to_lowercase())
        .collect();

    registry
        .iter()
        .find(|app| {
            app.executable_names
                .iter()
                .any(|name| running.contains(name))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessEntry;

    fn snapshot(names: &[&str]) -> ProcessSnapshot {
        ProcessSnapshot::new(
            names
                .iter()
                .enumerate()
                .map(|(i, name)| ProcessEntry::new(*name, 100 + i as u32))
                .collect(),
        )
    }

    fn registry() -> AppRegistry {
        AppRegistry::from_entries([
            AppEntry::new("Game", ["game.exe"], None).unwrap(),
            AppEntry::new("Launcher", ["launcher.exe", "game.exe"], None).unwrap(),
            AppEntry::new("Editor", ["editor.exe"], None).unwrap(),
        ])
    }

    #[test]
    fn test_single_match() {
        let snap = snapshot(&["explorer.exe", "editor.exe"]);
        let app = find_active_app(&snap, &registry()).unwrap();
        assert_eq!(app.title, "Editor");
    }

    #[test]
    fn test_match_ignores_case() {
        let app = find_active_app(&snapshot(&["EDITOR.EXE"]), &registry()).unwrap();
        assert_eq!(app.title, "Editor");
    }

    #[test]
    fn test_first_registry_entry_wins() {
        // Both "Game" and "Launcher" list game.exe; registry order decides.
        let app = find_active_app(&snapshot(&["game.exe"]), &registry()).unwrap();
        assert_eq!(app.title, "Game");

        // Snapshot order does not matter.
        let snap = snapshot(&["editor.exe", "launcher.exe"]);
        let app = find_active_app(&snap, &registry()).unwrap();
        assert_eq!(app.title, "Launcher");
    }

    #[test]
    fn test_empty_snapshot_matches_nothing() {
        assert!(find_active_app(&snapshot(&[]), &registry()).is_none());
    }

    #[test]
    fn test_no_intersection_matches_nothing() {
        assert!(find_active_app(&snapshot(&["explorer.exe", "game"]), &registry()).is_none());
        assert!(find_active_app(&snapshot(&["game.exe"]), &AppRegistry::default()).is_none());
    }

    #[test]
    fn test_result_always_contains_a_running_name() {
        let registry = registry();
        let pool = ["game.exe", "launcher.exe", "editor.exe", "other.exe", "GAME.exe"];

        // Every subset of the pool.
        for mask in 0u32..(1 << pool.len()) {
            let names: Vec<&str> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, name)| *name)
                .collect();
            let snap = snapshot(&names);

            match find_active_app(&snap, &registry) {
                Some(app) => {
                    assert!(names.iter().any(|n| app.matches_executable(n)));
                    // No earlier entry may also match.
                    let position = registry.iter().position(|e| e.title == app.title).unwrap();
                    for earlier in &registry.entries()[..position] {
                        assert!(!names.iter().any(|n| earlier.matches_executable(n)));
                    }
                }
                None => {
                    for entry in registry.iter() {
                        assert!(!names.iter().any(|n| entry.matches_executable(n)));
                    }
                }
            }
        }
    }
}
