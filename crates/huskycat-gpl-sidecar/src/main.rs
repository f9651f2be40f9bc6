//! Isolated host process for GPL-licensed validation tools.
//!
//! This binary is GPL because it directly executes GPL tools. The
//! Apache-2.0 core never links it; the two sides share only the JSON-RPC
//! wire protocol over a Unix socket.

mod server;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "huskycat-gpl-sidecar", version)]
#[command(about = "JSON-RPC host for GPL validation tools (shellcheck, hadolint, yamllint)")]
struct Cli {
    /// Unix socket path to listen on.
    #[arg(long, default_value_t = default_socket())]
    socket: String,
}

fn default_socket() -> String {
    let uid = nix::unistd::Uid::current().as_raw();
    format!("/tmp/huskycat-gpl-{uid}.sock")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let socket = PathBuf::from(&cli.socket);

    if let Some(dir) = socket.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create socket dir {}", dir.display()))?;
    }
    // Replace a stale socket from a previous run.
    if socket.exists() {
        fs::remove_file(&socket)
            .with_context(|| format!("failed to remove stale socket {}", socket.display()))?;
    }

    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("failed to bind {}", socket.display()))?;
    fs::set_permissions(&socket, fs::Permissions::from_mode(0o666))
        .with_context(|| format!("failed to set permissions on {}", socket.display()))?;

    tracing::info!(socket = %socket.display(), "sidecar listening");
    tracing::info!("license: GPL-3.0-only");

    let result = server::serve(listener);

    fs::remove_file(&socket).ok();
    result
}
