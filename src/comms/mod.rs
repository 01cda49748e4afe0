//! External I/O channels: the browser UI over HTTP and the console REPL.
//!
//! Each channel implements [`Component`] and captures an
//! `Arc<ModelManager>` at construction. [`start`] spawns the configured
//! channels via [`spawn_components`] and returns immediately; the caller
//! decides when to await the handle.

pub mod console;
pub mod web;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::runtime::{Component, SubsystemHandle, spawn_components};
use crate::session::ModelManager;

pub use console::ConsoleChannel;
pub use web::{WebChannel, WebState, build_router};

/// Spawn the web channel when `server.enabled` is set and the console
/// channel when `interactive` is true.
pub fn start(manager: Arc<ModelManager>, interactive: bool, shutdown: CancellationToken) -> SubsystemHandle {
    let mut components: Vec<Box<dyn Component>> = Vec::new();

    let server = &manager.config().server;
    if server.enabled {
        info!(bind = %server.bind, "loading web channel");
        components.push(Box::new(WebChannel::new("web0", server.bind.clone(), Arc::clone(&manager))));
    }
    if interactive {
        info!("loading console channel");
        components.push(Box::new(ConsoleChannel::new("console0", Arc::clone(&manager))));
    }
    if components.is_empty() {
        info!("no channels enabled; waiting for shutdown");
    }

    spawn_components(components, shutdown)
}
