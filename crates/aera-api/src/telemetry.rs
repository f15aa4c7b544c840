//! Tracing subscriber setup for the server binary.
//!
//! Read from the environment:
//! - `LOG_FORMAT`: `json` or `text` (default `text`)
//! - `LOG_FILE`: write to a daily-rotated file instead of stdout
//! - `LOG_ANSI`: force colors on or off
//! - `RUST_LOG`: filter directives

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str =
    "aera_api=debug,aera_search=info,aera_ingest=info,aera_inference=info,aera_db=info,tower_http=debug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub ansi: Option<bool>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(LogFormat::Text),
            file: lookup("LOG_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            ansi: lookup("LOG_ANSI").map(|v| matches!(v.trim(), "1" | "true" | "yes")),
        }
    }

    /// Destination description for the startup log line.
    pub fn destination(&self) -> String {
        self.file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string())
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer and must live until shutdown.
pub fn init(settings: &LogSettings) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match (&settings.file, settings.format) {
        (Some(path), format) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("aera-api.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let layer = tracing_subscriber::fmt::layer().with_writer(writer);
            if format == LogFormat::Json {
                registry.with(layer.json()).init();
            } else {
                registry.with(layer.with_ansi(settings.ansi.unwrap_or(false))).init();
            }
            Some(guard)
        }
        (None, LogFormat::Json) => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
            None
        }
        (None, LogFormat::Text) => {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = settings.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
            None
        }
    }
}
