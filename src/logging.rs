//! Tracing setup: stderr for the user, a daily rolling file for the record.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the stderr filter
pub const LOG_ENV: &str = "TFSV_LOG";

const DEFAULT_FILTER: &str = "tfsv=warn";
const VERBOSE_FILTER: &str = "tfsv=debug,info";
const FILE_FILTER: &str = "tfsv=debug,info";

/// Directory holding `tfsv.log.*`.
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .map(|d| d.join("tfsv").join("logs"))
    .unwrap_or_else(|| PathBuf::from("logs"))
}

fn stderr_filter(verbose: bool) -> EnvFilter {
  if verbose {
    return EnvFilter::new(VERBOSE_FILTER);
  }
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init(verbose: bool) -> WorkerGuard {
  let file_appender = tracing_appender::rolling::daily(log_dir(), "tfsv.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(stderr_filter(verbose)),
    )
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new(FILE_FILTER)),
    )
    .init();

  guard
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_log_dir_ends_in_logs() {
    assert!(log_dir().ends_with("logs"));
  }

  #[test]
  fn test_verbose_filter_ignores_env() {
    assert_eq!(
      stderr_filter(true).max_level_hint(),
      Some(tracing_subscriber::filter::LevelFilter::DEBUG)
    );
  }
}
