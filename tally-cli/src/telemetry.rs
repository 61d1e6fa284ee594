use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tally_config::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine readable; the returned guard flushes the file writer.
pub fn init_tracing(settings: &LogSettings, verbosity: u8) -> Result<Option<WorkerGuard>> {
    let level = match verbosity {
        0 => settings.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    if settings.json {
        layers.push(stderr.json().boxed());
    } else {
        layers.push(stderr.boxed());
    }

    let mut guard = None;
    if let Some(path) = &settings.file {
        let (writer, file_guard) = file_writer(path)?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed(),
        );
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;
    Ok(guard)
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("log path {} has no file name", path.display()))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
