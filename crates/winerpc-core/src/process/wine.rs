//! Wine-specific process naming and version probing.
//!
//! Under Wine, the process the host OS sees is usually a loader such as
//! `wine64-preloader`; the Windows executable it runs only shows up as the first
//! command-line argument, often as a `C:\...` path.

use regex::bytes::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Host-side loader binaries whose first argument is the guest executable.
pub const WINE_LOADERS: &[&str] = &["wine-preloader", "wine64-preloader", "wine", "wine64"];

/// Names of the Wine server process.
pub const WINESERVER_NAMES: &[&str] = &["wineserver", "wineserver64"];

/// Last path component, accepting both `/` and `\` as separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Resolve the name the matcher should see for a process.
///
/// `exe_name` is the basename of the host executable; `cmdline` is the full
/// argument vector. Loader processes are renamed after their first argument.
/// The result is lowercased.
pub fn guest_executable_name(exe_name: &str, cmdline: &[String]) -> String {
    let host = basename(exe_name);

    if is_wine_loader(host) {
        if let Some(first) = cmdline.first().map(|arg| basename(arg.trim())) {
            if !first.is_empty() {
                return first.to_lowercase();
            }
        }
    }

    host.to_lowercase()
}

pub fn is_wine_loader(name: &str) -> bool {
    WINE_LOADERS.iter().any(|loader| name.eq_ignore_ascii_case(loader))
}

pub fn is_wineserver(name: &str) -> bool {
    WINESERVER_NAMES
        .iter()
        .any(|server| basename(name).eq_ignore_ascii_case(server))
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Printable run starting with "Wine N.N", like a line of `strings` output.
        Regex::new(r"(?-u)Wine\s\d+\.\d+[\x20-\x7e]*").expect("static regex is valid")
    })
}

fn is_printable(byte: u8) -> bool {
    (0x20..=0x7e).contains(&byte) || byte == b'\t'
}

/// Extract a `Wine N.N...` version string from raw binary contents.
///
/// Only matches that start a printable run count, so `libWine 1.0` inside a
/// longer string is ignored.
pub fn find_version_string(data: &[u8]) -> Option<String> {
    version_regex()
        .find_iter(data)
        .find(|m| m.start() == 0 || !is_printable(data[m.start() - 1]))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).trim().to_string())
}

/// Read the Wine version from a `wineserver` binary.
pub fn wineserver_version(binary: &Path) -> Option<String> {
    match std::fs::read(binary) {
        Ok(data) => find_version_string(&data),
        Err(e) => {
            debug!("Failed to read wineserver binary {:?}: {}", binary, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_basename_handles_both_separators() {
        assert_eq!(basename("/usr/bin/wine64-preloader"), "wine64-preloader");
        assert_eq!(basename(r"C:\Program Files\Game\Game.exe"), "Game.exe");
        assert_eq!(basename("game.exe"), "game.exe");
    }

    #[test]
    fn test_preloader_resolves_to_guest() {
        let name = guest_executable_name(
            "wine64-preloader",
            &args(&[r"C:\Games\Foo\FooGame.exe", "-windowed"]),
        );
        assert_eq!(name, "foogame.exe");
    }

    #[test]
    fn test_preloader_without_args_keeps_host_name() {
        assert_eq!(guest_executable_name("wine-preloader", &[]), "wine-preloader");
    }

    #[test]
    fn test_native_process_keeps_its_name() {
        let name = guest_executable_name("/usr/bin/Firefox", &args(&["firefox", "--new-tab"]));
        assert_eq!(name, "firefox");
    }

    #[test]
    fn test_is_wineserver() {
        assert!(is_wineserver("wineserver"));
        assert!(is_wineserver("/opt/wine/bin/wineserver64"));
        assert!(!is_wineserver("wine"));
    }

    #[test]
    fn test_find_version_string() {
        let mut data = vec![0u8, 1, 2];
        data.extend_from_slice(b"xlibWine 0.1 junk");
        data.push(0);
        data.extend_from_slice(b"Wine 9.0 (Staging)");
        data.extend_from_slice(&[0, 0xff]);

        assert_eq!(find_version_string(&data).as_deref(), Some("Wine 9.0 (Staging)"));
        assert_eq!(find_version_string(b"no version here"), None);
    }

    #[test]
    fn test_wineserver_version_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wineserver");
        std::fs::write(&path, b"\x7fELF\0\0Wine 8.21\0").unwrap();

        assert_eq!(wineserver_version(&path).as_deref(), Some("Wine 8.21"));
        assert_eq!(wineserver_version(&temp_dir.path().join("missing")), None);
    }
}
