//! Logging setup
//!
//! Logs go to a daily rolling file so the terminal stays clean. The filter
//! comes from `CODEWRIGHT_LOG`, then `RUST_LOG`, then a default level.
//! `--verbose` additionally mirrors warnings and errors to stderr.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "CODEWRIGHT_LOG";
/// Environment variable selecting the log format (`json` or `text`)
pub const LOG_FORMAT_ENV: &str = "CODEWRIGHT_LOG_FORMAT";

const LOG_FILE_PREFIX: &str = "codewright.log";

/// How to set up logging
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub dir: PathBuf,
    pub json: bool,
    pub verbose: bool,
}

impl LogOptions {
    /// Options from the environment; logs under `$HOME/.codewright/logs`
    pub fn from_env(verbose: bool) -> Self {
        Self {
            dir: default_log_dir(),
            json: std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            verbose,
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(crate::config::PROJECT_DIR)
        .join("logs")
}

/// Filter directive: explicit settings win over the default level
pub fn filter_directive(
    codewright_log: Option<&str>,
    rust_log: Option<&str>,
    verbose: bool,
) -> String {
    let explicit = codewright_log
        .or(rust_log)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    match explicit {
        Some(directive) => directive.to_string(),
        None if verbose => "codewright=debug,info".to_string(),
        None => "codewright=info,warn".to_string(),
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes buffered log lines.
pub fn init_logging(options: &LogOptions) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&options.dir)
        .with_context(|| format!("Failed to create log directory {}", options.dir.display()))?;

    let directive = filter_directive(
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
        options.verbose,
    );
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter '{}'", directive))?;

    let (writer, guard) = tracing_appender::non_blocking(file_appender(&options.dir));
    let file_layer = if options.json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(false)
            .boxed()
    } else {
        fmt::layer().with_writer(writer).with_ansi(false).boxed()
    };

    let stderr_layer = options.verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(tracing_subscriber::filter::LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Logging was already initialized")?;

    tracing::debug!(dir = %options.dir.display(), directive = %directive, "Logging initialized");
    Ok(guard)
}

fn file_appender(dir: &Path) -> tracing_appender::rolling::RollingFileAppender {
    tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        assert_eq!(filter_directive(Some("trace"), Some("warn"), false), "trace");
        assert_eq!(filter_directive(None, Some("warn"), true), "warn");
        assert_eq!(filter_directive(Some("  "), None, false), "codewright=info,warn");
        assert_eq!(filter_directive(None, None, true), "codewright=debug,info");
    }

    #[test]
    fn test_default_directive_parses() {
        for verbose in [false, true] {
            assert!(EnvFilter::try_new(filter_directive(None, None, verbose)).is_ok());
        }
    }
}
