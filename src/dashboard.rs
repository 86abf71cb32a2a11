//! Loads all three collections at once for display.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheStore;
use crate::tfs::{CodeReview, PullRequest, SessionManager, TfsError, WorkItem};

/// One round of loading. Each collection succeeds or fails on its own.
#[derive(Debug)]
pub struct Snapshot {
  pub work_items: Result<Vec<WorkItem>, TfsError>,
  pub pull_requests: Result<Vec<PullRequest>, TfsError>,
  pub code_reviews: Result<Vec<CodeReview>, TfsError>,
  pub loaded_at: DateTime<Utc>,
}

impl Snapshot {
  fn count<T>(result: &Result<Vec<T>, TfsError>) -> usize {
    result.as_ref().map_or(0, Vec::len)
  }

  /// e.g. "Loaded 3 work items, 1 PRs, 0 reviews"
  pub fn summary(&self) -> String {
    format!(
      "Loaded {} work items, {} PRs, {} reviews",
      Self::count(&self.work_items),
      Self::count(&self.pull_requests),
      Self::count(&self.code_reviews)
    )
  }

  /// Failures, in display order.
  pub fn errors(&self) -> Vec<&TfsError> {
    [
      self.work_items.as_ref().err(),
      self.pull_requests.as_ref().err(),
      self.code_reviews.as_ref().err(),
    ]
    .into_iter()
    .flatten()
    .collect()
  }

  pub fn is_complete(&self) -> bool {
    self.errors().is_empty()
  }
}

/// Front for the session manager that loads everything in parallel.
pub struct Dashboard<S: CacheStore> {
  manager: SessionManager<S>,
}

impl<S: CacheStore> Dashboard<S> {
  pub fn new(manager: SessionManager<S>) -> Self {
    Self { manager }
  }

  /// Load all collections. Unexpired cached results are reused.
  pub async fn load(&self, cancel: &CancellationToken) -> Snapshot {
    let (work_items, pull_requests, code_reviews) = tokio::join!(
      self.manager.get_assigned_work_items(cancel),
      self.manager.get_pull_requests(cancel),
      self.manager.get_code_reviews(cancel),
    );

    let snapshot = Snapshot {
      work_items,
      pull_requests,
      code_reviews,
      loaded_at: Utc::now(),
    };

    for error in snapshot.errors() {
      tracing::warn!(operation = error.operation(), error = %error, "Load failed");
    }
    tracing::info!("{}", snapshot.summary());
    snapshot
  }

  /// Drop cached results, then load fresh.
  pub async fn refresh(&self, cancel: &CancellationToken) -> Snapshot {
    if let Err(e) = self.manager.cache().clear() {
      tracing::warn!(error = %e, "Failed to clear cache before refresh");
    }
    self.load(cancel).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::tfs::fake::FakeServer;
  use crate::tfs::error::RemoteError;
  use crate::tfs::Credentials;
  use std::sync::Arc;

  async fn dashboard(server: &FakeServer) -> Dashboard<MemoryStore> {
    let mut manager =
      SessionManager::new(Arc::new(server.clone()), Arc::new(MemoryStore::new()));
    let result = manager
      .connect(
        Credentials {
          server_url: "https://tfs.example.com".to_string(),
          use_windows_authentication: true,
          ..Default::default()
        },
        &CancellationToken::new(),
      )
      .await;
    assert!(result.success);
    Dashboard::new(manager)
  }

  fn populate(server: &FakeServer) {
    server.add_work_item(1, "Fix login", "Bug", "Alice");
    server.add_work_item(2, "Write docs", "Task", "Alice");
    server.add_pull_request("web", "Portal", 3, "PR", &["Alice"]);
    server.add_code_review(4, "Review", "Alice");
  }

  #[tokio::test]
  async fn test_load_collects_everything() {
    let server = FakeServer::new("Alice");
    populate(&server);
    let dashboard = dashboard(&server).await;

    let snapshot = dashboard.load(&CancellationToken::new()).await;

    assert!(snapshot.is_complete());
    assert_eq!(snapshot.summary(), "Loaded 2 work items, 1 PRs, 1 reviews");
  }

  #[tokio::test]
  async fn test_load_reuses_cache_and_refresh_does_not() {
    let server = FakeServer::new("Alice");
    populate(&server);
    let dashboard = dashboard(&server).await;
    let cancel = CancellationToken::new();

    dashboard.load(&cancel).await;
    dashboard.load(&cancel).await;
    assert_eq!(server.counters().repositories(), 1);

    dashboard.refresh(&cancel).await;
    assert_eq!(server.counters().repositories(), 2);
    assert_eq!(server.counters().wiql(), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_one_failure_does_not_hide_the_rest() {
    let server = FakeServer::new("Alice");
    populate(&server);
    server.fail_repositories([RemoteError::status(403, "Forbidden")]);
    let dashboard = dashboard(&server).await;

    let snapshot = dashboard.load(&CancellationToken::new()).await;

    assert!(!snapshot.is_complete());
    assert_eq!(snapshot.errors().len(), 1);
    assert_eq!(snapshot.errors()[0].operation(), "GetPullRequests");
    assert_eq!(snapshot.summary(), "Loaded 2 work items, 0 PRs, 1 reviews");
  }

  #[tokio::test]
  async fn test_disconnected_load_reports_each_failure() {
    let server = FakeServer::new("Alice");
    let manager = SessionManager::new(Arc::new(server.clone()), Arc::new(MemoryStore::new()));
    let dashboard = Dashboard::new(manager);

    let snapshot = dashboard.load(&CancellationToken::new()).await;

    assert_eq!(snapshot.errors().len(), 3);
    assert!(snapshot
      .errors()
      .iter()
      .all(|e| matches!(e, TfsError::NotConnected { .. })));
    assert_eq!(server.counters().total(), 0);
  }
}
