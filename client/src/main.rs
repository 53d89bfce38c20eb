mod cache;
mod config;
mod fs;
mod fs_error;
mod handles;
mod inode;
mod path;
mod remote;
mod subscriber;

use clap::{Parser, Subcommand};
use fuser::MountOption;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::Config;

/// Mounts a remote HTTP directory tree as a local FUSE filesystem.
#[derive(Parser, Debug)]
#[command(name = "remote-fs", version, about)]
struct Cli {
    /// Remote server address, e.g. http://127.0.0.1:8080
    server: String,

    #[command(subcommand)]
    action: Option<Action>,

    /// Local mount point; overrides config.toml's [mount] section
    #[arg(long)]
    mountpoint: Option<String>,

    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Detach and run as a background daemon
    Daemon,
    /// Signal a running daemon to unmount and exit
    Stop,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("client=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pid_file = pid_file_path();

    let exit_code = match cli.action {
        Some(Action::Stop) => stop_daemon(&pid_file),
        Some(Action::Daemon) => {
            if let Err(err) = daemonize::Daemonize::new().pid_file(&pid_file).start() {
                tracing::error!("failed to daemonize: {err}");
                std::process::exit(1);
            }
            run(cli.server, cli.mountpoint, cli.config)
        }
        None => run(cli.server, cli.mountpoint, cli.config),
    };

    std::process::exit(exit_code);
}

fn run(server: String, mountpoint_override: Option<String>, config_path: Option<PathBuf>) -> i32 {
    let mut config = Config::load(config_path.as_deref());
    config.remote.server_url = server;
    if let Some(mountpoint) = mountpoint_override {
        config.mount.mountpoint = mountpoint;
    }

    let mountpoint = expand_home(&config.mount.mountpoint);
    let remote_fs = fs::RemoteFs::new(config.clone());

    if let Err(err) = remote_fs.runtime.block_on(remote_fs.remote.statfs()) {
        tracing::error!("server unreachable at startup ({}): {err}", config.remote.server_url);
        return 1;
    }

    let adapter = fs::FsAdapter(Arc::new(remote_fs));
    let options = vec![
        MountOption::AutoUnmount,
        MountOption::FSName("remotefs".to_string()),
    ];

    tracing::info!(server = %config.remote.server_url, mountpoint = %mountpoint.display(), "mounting");
    match fuser::mount2(adapter, &mountpoint, &options) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("mount error: {err}");
            1
        }
    }
}

fn stop_daemon(pid_file: &Path) -> i32 {
    let contents = match std::fs::read_to_string(pid_file) {
        Ok(c) => c,
        Err(_) => {
            tracing::error!("no running daemon found at {}", pid_file.display());
            return 1;
        }
    };
    let pid: i32 = match contents.trim().parse() {
        Ok(pid) => pid,
        Err(_) => {
            tracing::error!("corrupt pid file at {}", pid_file.display());
            return 1;
        }
    };

    // SAFETY: `pid` came from our own pid file, written by `daemonize`.
    let signaled = unsafe { libc::kill(pid, libc::SIGTERM) };
    if signaled == 0 {
        let _ = std::fs::remove_file(pid_file);
        0
    } else {
        tracing::error!("failed to signal pid {pid}");
        1
    }
}

fn pid_file_path() -> PathBuf {
    std::env::temp_dir().join("remote-fs.pid")
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return Path::new(&home).join(rest);
        }
    }
    PathBuf::from(raw)
}
