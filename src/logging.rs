use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing::Subscriber;
use tracing_appender::rolling;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log file prefix
pub const DEFAULT_LOG_PREFIX: &str = "opexec";

/// Setup logging with a daily rotating file appender.
///
/// Engine events (submissions, abort requests, completions, caught panics)
/// are written to `log_dir` with daily rotation.
///
/// # Arguments
/// * `log_dir` - Directory for log files, created if missing
/// * `log_prefix` - Prefix for log files (e.g., [`DEFAULT_LOG_PREFIX`])
/// * `debug_mode` - If true, use debug level; otherwise use info level
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(log_dir: &str, log_prefix: &str, debug_mode: bool) -> Result<WorkerGuard> {
    setup_logging_with_console(log_dir, log_prefix, debug_mode, false)
}

/// Setup logging with optional console output.
///
/// Same file output as [`setup_logging`], plus an ANSI console layer when
/// `console_output` is set. `RUST_LOG` overrides the level when present.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging_with_console(
    log_dir: &str,
    log_prefix: &str,
    debug_mode: bool,
    console_output: bool,
) -> Result<WorkerGuard> {
    ensure_log_dir(Utf8Path::new(log_dir))?;

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Worker threads are named after their run, so thread names go to the console too
    let console_layer = console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .with_thread_names(true)
    });

    tracing_subscriber::registry()
        .with(env_filter(debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}",
        log_dir,
        log_prefix,
        debug_mode,
        console_output
    );

    Ok(guard)
}

/// Setup logging with one JSON object per line in the rotating log file.
///
/// For log shippers that ingest structured records. Levels and `RUST_LOG`
/// behave as in [`setup_logging`].
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_json_logging(log_dir: &str, log_prefix: &str, debug_mode: bool) -> Result<WorkerGuard> {
    ensure_log_dir(Utf8Path::new(log_dir))?;

    let file_appender = rolling::daily(log_dir, log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(debug_mode))
        .with(json_layer(non_blocking))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "JSON logging initialized: dir={}, prefix={}, debug={}",
        log_dir,
        log_prefix,
        debug_mode
    );

    Ok(guard)
}

fn json_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_current_span(false)
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

fn env_filter(debug_mode: bool) -> EnvFilter {
    let default_level = if debug_mode { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_setup_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let log_dir = log_dir.to_str().unwrap();

        // Another test may already own the global subscriber; the directory
        // is created either way
        let _guard = setup_logging(log_dir, DEFAULT_LOG_PREFIX, false);

        assert!(Utf8PathBuf::from(log_dir).exists());
    }

    #[test]
    fn test_setup_json_logging_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = temp_dir.path().join("json-logs");
        let log_dir = log_dir.to_str().unwrap();

        let _guard = setup_json_logging(log_dir, DEFAULT_LOG_PREFIX, true);

        assert!(Utf8PathBuf::from(log_dir).exists());
    }

    #[test]
    fn test_json_layer_writes_structured_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("events.json");
        let file = fs::File::create(&path).unwrap();

        let subscriber =
            tracing_subscriber::registry().with(json_layer(move || file.try_clone().unwrap()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(run = 7, "Submitting run-7");
        });

        let contents = fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().unwrap();
        assert!(line.starts_with('{') && line.ends_with('}'), "{line}");
        assert!(line.contains("\"level\":\"INFO\""), "{line}");
        assert!(line.contains("\"message\":\"Submitting run-7\""), "{line}");
        assert!(line.contains("\"run\":7"), "{line}");
    }

    #[test]
    fn test_ensure_log_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let log_dir = Utf8PathBuf::from_path_buf(temp_dir.path().join("a/b")).unwrap();

        ensure_log_dir(&log_dir).unwrap();
        ensure_log_dir(&log_dir).unwrap();
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_env_filter_levels() {
        // Only meaningful when RUST_LOG is unset, as it is under cargo test by default
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter(true).to_string(), "debug");
            assert_eq!(env_filter(false).to_string(), "info");
        }
    }
}
