//! tickcast daemon - server-time broadcaster over WebSocket
//!
//! This binary accepts WebSocket clients, registers them with the hub,
//! and broadcasts the server time to every subscriber.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! tickcastd start
//!
//! # Start on another address with a 1 s broadcast period
//! tickcastd start --addr 0.0.0.0:9000 --broadcast-ms 1000
//!
//! # Start the daemon (background/daemonized)
//! tickcastd start -d
//!
//! # Stop the daemon
//! tickcastd stop
//!
//! # Check daemon status
//! tickcastd status
//!
//! # Show the effective configuration
//! tickcastd print-config
//! ```

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tickcastd::config::DaemonConfig;
use tickcastd::hub::build_hub;
use tickcastd::server::DaemonServer;

/// tickcast daemon - server-time broadcaster
#[derive(Parser, Debug)]
#[command(name = "tickcastd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        #[command(flatten)]
        overrides: ConfigArgs,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Print the effective configuration as TOML
    PrintConfig {
        #[command(flatten)]
        overrides: ConfigArgs,
    },
}

/// Flags that feed into the configuration.
#[derive(ClapArgs, Debug, Default)]
struct ConfigArgs {
    /// Config file (default: ~/.config/tickcast/config.toml, then /etc/tickcast/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8080
    #[arg(long)]
    addr: Option<String>,

    /// Broadcast period in milliseconds
    #[arg(long)]
    broadcast_ms: Option<u64>,
}

impl ConfigArgs {
    /// Resolves file and environment settings, then applies the flags.
    fn resolve(&self) -> Result<DaemonConfig> {
        let mut config = DaemonConfig::resolve(self.config.as_deref())
            .context("Failed to load configuration")?;

        if let Some(addr) = &self.addr {
            config.server.listen_addr = addr.clone();
        }
        if let Some(ms) = self.broadcast_ms {
            config.hub.broadcast_period_ms = ms;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("tickcast")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("tickcastd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("tickcastd.log")
}

fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        overrides: ConfigArgs::default(),
    });

    match command {
        Command::Start { daemon, overrides } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'tickcastd stop' to stop it first.");
                process::exit(1);
            }

            // Resolve before forking so relative paths and errors reach the terminal
            let config = overrides.resolve()?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
        Command::PrintConfig { overrides } => {
            let config = overrides.resolve()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let level = &config.logging.level;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("tickcastd={level}").parse()?)
                .add_directive(format!("tickcast_protocol={level}").parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "tickcast daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let (hub, actor) = build_hub(&config.hub);
    let hub_task = tokio::spawn(actor.run(cancel_token.clone()));
    info!(
        broadcast_ms = config.hub.broadcast_period_ms,
        mailbox_capacity = config.hub.mailbox_capacity,
        "Hub started"
    );

    let server = DaemonServer::bind(&config.server, hub, cancel_token.clone())
        .await
        .context("Failed to start server")?;

    info!(url = %server.url(), "Starting server");

    let result = server.run().await;
    // Stop the hub too if the server ended on its own
    cancel_token.cancel();

    if let Err(e) = hub_task.await {
        error!(error = %e, "Hub task failed");
    }

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("tickcast daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
