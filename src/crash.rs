//! Crash diagnostics
//!
//! The browser discards whatever the host writes to stderr, so panics are
//! also appended to a dedicated crash log next to the regular logs. The
//! file is written synchronously to survive process termination.

use std::fs::OpenOptions;
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::error;

/// Global crash log file path, set during initialization
static CRASH_LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

const CRASH_LOG_FILENAME: &str = "crash.log";

/// Install the panic hook. Call this early in main().
///
/// Returns the path to the crash log file.
pub fn init_crash_handler(log_dir: &Path) -> std::io::Result<PathBuf> {
    let crash_log_path = log_dir.join(CRASH_LOG_FILENAME);

    // Fail early if the file cannot be created at all
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&crash_log_path)?;

    let _ = CRASH_LOG_PATH.set(crash_log_path.clone());

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        handle_panic(panic_info);
        default_hook(panic_info);
    }));

    Ok(crash_log_path)
}

fn panic_message(panic_info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}

fn format_report(timestamp: &str, location: &str, message: &str, backtrace: &str) -> String {
    let separator = "=".repeat(80);
    format!(
        "\n{sep}\n\
         PANIC at {ts}\n\
         {sep}\n\
         Location: {loc}\n\
         Message: {msg}\n\
         \n\
         Backtrace:\n\
         {bt}\n\
         {sep}\n",
        sep = separator,
        ts = timestamp,
        loc = location,
        msg = message,
        bt = backtrace
    )
}

/// Handle a Rust panic by logging it to the crash log
fn handle_panic(panic_info: &PanicHookInfo<'_>) {
    let timestamp = chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    let message = panic_message(panic_info);

    let location = match panic_info.location() {
        Some(loc) => format!("{}:{}:{}", loc.file(), loc.line(), loc.column()),
        None => "unknown location".to_string(),
    };

    let backtrace = std::backtrace::Backtrace::force_capture().to_string();
    let report = format_report(&timestamp, &location, &message, &backtrace);

    if let Some(path) = CRASH_LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = file.write_all(report.as_bytes());
            let _ = file.flush();
            let _ = file.sync_all();
        }
    }

    // May not be flushed if the process is going down
    error!(
        "PANIC at {}: {} (see crash.log for full backtrace)",
        location, message
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_layout() {
        let report = format_report(
            "2026-10-17T12:00:00.000Z",
            "src/main.rs:1:1",
            "boom",
            "<backtrace>",
        );
        assert!(report.contains("PANIC at 2026-10-17T12:00:00.000Z"));
        assert!(report.contains("Location: src/main.rs:1:1"));
        assert!(report.contains("Message: boom"));
        assert!(report.contains("<backtrace>"));
    }
}
