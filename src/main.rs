mod cache;
mod config;
mod dashboard;
mod logging;
mod retry;
mod template;
mod tfs;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cache::{CacheStore, MemoryStore, SqliteStore};
use config::{CacheBackend, Config};
use dashboard::{Dashboard, Snapshot};
use template::{resolve_parameters, FieldSource};
use tfs::{HttpConnector, SessionManager};

#[derive(Parser, Debug)]
#[command(name = "tfsv")]
#[command(about = "Work items, pull requests and code reviews assigned to you on TFS / Azure DevOps")]
#[command(version)]
struct Args {
  #[command(subcommand)]
  command: Option<Command>,

  /// Path to config file (default: $XDG_CONFIG_HOME/tfsv/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Server URL, overrides tfs.url from the config file
  #[arg(short, long, global = true)]
  server: Option<String>,

  /// Ignore cached results
  #[arg(short, long, global = true)]
  refresh: bool,

  /// Reload every refresh.interval_minutes until Ctrl-C
  #[arg(short, long, global = true)]
  watch: bool,

  /// Debug logging on stderr
  #[arg(short, long, global = true)]
  verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Command {
  /// Everything (default)
  #[default]
  All,
  /// Work items assigned to you
  WorkItems,
  /// Active pull requests you are reviewing
  PullRequests,
  /// Code review responses assigned to you
  Reviews,
  /// Connect and run a one-row query
  Test,
  /// Remove cached results for the server
  ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose);

  let mut config = Config::load(args.config.as_deref())?;
  if let Some(server) = args.server.clone() {
    config.tfs.url = server;
  }

  match config.cache.backend {
    CacheBackend::Memory => run(&args, &config, Arc::new(MemoryStore::new())).await,
    CacheBackend::Sqlite => {
      let store = SqliteStore::open(&config.tfs.url)?;
      run(&args, &config, Arc::new(store)).await
    }
  }
}

async fn run<S: CacheStore + 'static>(args: &Args, config: &Config, cache: Arc<S>) -> Result<()> {
  let command = args.command.unwrap_or_default();

  if command == Command::ClearCache {
    cache.clear()?;
    println!("Cache cleared");
    return Ok(());
  }

  let cancel = CancellationToken::new();
  let on_ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      on_ctrl_c.cancel();
    }
  });

  let mut manager = SessionManager::new(Arc::new(HttpConnector::new()), cache);
  let result = manager.connect(config.credentials()?, &cancel).await;
  if !result.success {
    return Err(eyre!(
      "{}",
      result
        .error_message
        .unwrap_or_else(|| "Connection failed".to_string())
    ));
  }
  tracing::info!(
    server_url = ?manager.server_url(),
    user = ?result.authenticated_user,
    version = ?result.server_version,
    "Connected"
  );

  if command == Command::Test {
    let test = manager.test_connection(&cancel).await;
    return match test.error_message {
      None => {
        println!(
          "Connected to {} as {}",
          test.server_version.unwrap_or_default(),
          test.authenticated_user.unwrap_or_default()
        );
        Ok(())
      }
      Some(message) => Err(eyre!("{}", message)),
    };
  }

  let dashboard = Dashboard::new(manager);

  if !args.watch {
    let snapshot = load(&dashboard, args.refresh, &cancel).await;
    print_snapshot(&snapshot, command, config);
    if snapshot.is_complete() {
      return Ok(());
    }
    return Err(eyre!("{} of 3 collections failed to load", snapshot.errors().len()));
  }

  if !config.refresh.auto_refresh {
    tracing::warn!("refresh.auto_refresh is off; --watch reloads anyway");
  }
  let period = Duration::from_secs(config.refresh.interval_minutes.max(1) * 60);
  let mut ticker = tokio::time::interval(period);
  let mut first = true;

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {
        let snapshot = load(&dashboard, first && args.refresh, &cancel).await;
        first = false;
        if cancel.is_cancelled() {
          break;
        }
        println!("--- {} ---", snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S"));
        print_snapshot(&snapshot, command, config);
      }
    }
  }

  Ok(())
}

async fn load<S: CacheStore>(
  dashboard: &Dashboard<S>,
  refresh: bool,
  cancel: &CancellationToken,
) -> Snapshot {
  if refresh {
    dashboard.refresh(cancel).await
  } else {
    dashboard.load(cancel).await
  }
}

fn print_snapshot(snapshot: &Snapshot, command: Command, config: &Config) {
  let formats = &config.formats;
  if matches!(command, Command::All | Command::WorkItems) {
    print_section("Work items", &snapshot.work_items, &formats.work_item);
  }
  if matches!(command, Command::All | Command::PullRequests) {
    print_section("Pull requests", &snapshot.pull_requests, &formats.pull_request);
  }
  if matches!(command, Command::All | Command::Reviews) {
    print_section("Code reviews", &snapshot.code_reviews, &formats.code_review);
  }
  if command == Command::All {
    println!("{}", snapshot.summary());
  }
}

fn print_section<T: FieldSource>(
  title: &str,
  result: &std::result::Result<Vec<T>, tfs::TfsError>,
  format: &str,
) {
  match result {
    Ok(items) => {
      println!("{} ({})", title, items.len());
      for item in items {
        println!("  {}", resolve_parameters(format, item));
      }
    }
    Err(e) => eprintln!("{}: {}", title, e),
  }
}
