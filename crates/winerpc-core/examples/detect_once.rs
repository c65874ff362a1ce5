//! Detect once - print the running known app and the Wine server version

use winerpc_core::process::{find_active_app, ProcessLister, SysinfoLister};
use winerpc_core::AppRegistry;

fn main() {
    // Get registry path from args or use the default next to the binary
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./apps.json".to_string());

    let registry = AppRegistry::load_or_empty(&path);
    println!("Loaded {} apps from {}", registry.len(), path);

    let snapshot = SysinfoLister::new().snapshot();
    println!("Scanned {} processes", snapshot.len());

    match &snapshot.host_server {
        Some(server) => println!(
            "Wine server: {} ({})",
            server.path.display(),
            server.version.as_deref().unwrap_or("unknown version")
        ),
        None => println!("No Wine server running."),
    }

    match find_active_app(&snapshot, &registry) {
        Some(app) => println!("Playing {}", app.title),
        None => println!("No known app is running."),
    }
}
