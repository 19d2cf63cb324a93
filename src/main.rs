//! Tessera - a minimal tiling Wayland display server
//!
//! Binds the compositor socket, spawns the accept loop, and drives the
//! frame loop against the headless sink. A display backend can replace
//! the sink and input source without touching the server.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use log::{info, warn};

use tessera::backend::{HeadlessSink, NullInput};
use tessera::compositor::{DragOverlay, Workspace};
use tessera::server::Server;

const DEFAULT_DISPLAY: &str = "tessera-0";
const OUTPUT_WIDTH: i32 = 1024;
const OUTPUT_HEIGHT: i32 = 1024;

fn socket_path() -> anyhow::Result<PathBuf> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .map_err(|_| anyhow::anyhow!("XDG_RUNTIME_DIR is not set"))?;
    let display =
        std::env::var("WAYLAND_DISPLAY").unwrap_or_else(|_| DEFAULT_DISPLAY.to_string());
    Ok(PathBuf::from(runtime_dir).join(display))
}

/// The spawn chord launches whatever TESSERA_SPAWN names.
fn spawn_hook() -> Option<tessera::compositor::drag::SpawnHook> {
    let program = std::env::var("TESSERA_SPAWN").ok()?;
    Some(Box::new(move || {
        info!("spawning {}", program);
        if let Err(err) = Command::new(&program).spawn() {
            warn!("spawn of {} failed: {}", program, err);
        }
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = socket_path()?;
    let workspace: Arc<dyn Workspace> = Arc::new(DragOverlay::new(spawn_hook()));
    let server = Server::new(workspace, (OUTPUT_WIDTH, OUTPUT_HEIGHT));
    server.listen(&path)?;

    let mut sink = HeadlessSink::new(OUTPUT_WIDTH, OUTPUT_HEIGHT);
    let mut input = NullInput;
    server.run(&mut sink, &mut input)
}
