//! meetcast native messaging host
//!
//! Owns the recording lifecycle for the meetcast browser extension: the
//! extension launches this process, observers and the offscreen capture
//! document talk to it over the native port, and finished recordings are
//! uploaded or kept locally until they can be synced.

mod capture;
mod config;
mod coordinator;
mod crash;
mod data;
mod host;
mod logging;
mod storage;
mod sync;
#[cfg(test)]
mod testing;
mod ui;
mod upload;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use capture::OffscreenCapture;
use config::Config;
use coordinator::{Coordinator, SystemClock};
use data::ApiCredentials;
use host::{create_host_channels, HostCommand, NativeHost, PortSender};
use storage::{JsonFileStore, RecordingLibrary};
use ui::PortNotifier;
use upload::ApiClient;

/// Command line as launched by the browser or by hand
#[derive(Debug, Default, PartialEq, Eq)]
struct CliArgs {
    help: bool,
    config: Option<PathBuf>,
    /// Caller identification the browser appends (extension origin,
    /// manifest path); informational only
    caller: Vec<String>,
}

fn parse_args(args: &[String]) -> CliArgs {
    let mut cli = CliArgs::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => cli.help = true,
            "-c" | "--config" => cli.config = iter.next().map(PathBuf::from),
            other => cli.caller.push(other.to_string()),
        }
    }
    cli
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cli = parse_args(&args);

    if cli.help {
        print_help();
        return Ok(());
    }

    // Stdout is the native port; logs only ever go to file
    let _log_guard = logging::init_logging()?;

    match logging::get_log_dir().and_then(|dir| {
        crash::init_crash_handler(&dir).context("Failed to open crash log")
    }) {
        Ok(path) => info!("Crash log at {:?}", path),
        Err(e) => warn!("Crash handler not installed: {}", e),
    }

    info!("meetcast host starting...");
    if !cli.caller.is_empty() {
        info!("Launched by {}", cli.caller.join(" "));
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!("Configuration loaded from {:?}", config.config_path()?);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(config));

    // The stdin reader may still be parked in a blocking read
    runtime.shutdown_timeout(Duration::from_secs(2));

    match &result {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => error!("Host exited with error: {:#}", e),
    }
    result
}

async fn run(config: Config) -> Result<()> {
    let data_dir = config.data_dir()?;
    let store = JsonFileStore::open(&data_dir)
        .await
        .with_context(|| format!("Failed to open data directory: {:?}", data_dir))?;
    info!("Recordings stored in {:?}", store.dir());

    let library = Arc::new(RecordingLibrary::new(
        Arc::new(store),
        config.storage.max_recordings,
        config.storage.max_local_recordings,
    ));

    let credentials = library.credentials().await.unwrap_or_else(|e| {
        warn!("Stored API credentials unreadable, starting signed out: {}", e);
        ApiCredentials::default()
    });
    let base_url = credentials.base_url.or_else(|| config.api.base_url.clone());
    let api = Arc::new(
        ApiClient::new(base_url, config.request_timeout()).context("Failed to build HTTP client")?,
    );
    if !api.is_configured() {
        warn!("No recordings API configured; recordings will be kept locally");
    }

    let (port, outbound) = PortSender::channel();
    let writer = tokio::spawn(host::run_writer(tokio::io::stdout(), outbound));

    let capture = Arc::new(OffscreenCapture::new(port.clone(), config.ready_timeout()));
    let coordinator = Arc::new(Coordinator::new(
        capture.clone(),
        library,
        api,
        Arc::new(PortNotifier::new(port.clone())),
        Arc::new(SystemClock),
    ));
    if let Err(e) = coordinator.init().await {
        warn!("Could not restore API session: {}", e);
    }

    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let events = tokio::spawn(coordinator.clone().run_capture_events(capture_rx));

    // Set up Ctrl+C handler that sends shutdown command
    let (cmd_tx, cmd_rx) = create_host_channels();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let _ = cmd_tx.try_send(HostCommand::Shutdown);
    })
    .context("Failed to install Ctrl+C handler")?;

    let host = NativeHost::new(
        coordinator,
        capture,
        port,
        capture_tx,
        config.host.max_message_bytes,
    );
    let result = host.run(tokio::io::stdin(), cmd_rx).await;
    drop(host);

    // Let a recording that already arrived finish uploading or saving
    if let Err(e) = events.await {
        error!("Capture event task failed: {}", e);
    }

    if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
        warn!("Port writer did not drain in time");
    }

    result.context("Native port failed")
}

fn print_help() {
    println!("meetcast-host - native messaging host for the meetcast extension");
    println!();
    println!("The browser starts this program; it talks over stdin/stdout.");
    println!();
    println!("USAGE:");
    println!("    meetcast-host [OPTIONS] [CALLER...]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -c, --config <PATH>   Use this config file instead of the default");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG              Set log level (e.g., debug, info, warn)");
    println!("    MEETCAST_LOG_PATH     Override the log directory");
}
