//! Simulated server for tests: scripted data, scripted failures, call counters.

use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::api_types::{ApiProjectRef, ApiPullRequest, ApiRepository, ApiWorkItem, ApiIdentity};
use super::client::{Connector, RemoteConnection, SourceControl, WorkItemTracking};
use super::error::RemoteError;
use super::types::AuthMaterial;

#[derive(Default)]
struct State {
  user: String,
  work_items: Vec<ApiWorkItem>,
  code_reviews: Vec<ApiWorkItem>,
  repositories: Vec<(ApiRepository, Vec<ApiPullRequest>)>,
  connect_error: Option<RemoteError>,
  wiql_failures: VecDeque<RemoteError>,
  repository_failures: VecDeque<RemoteError>,
  last_wiql: Option<String>,
  last_auth: Option<AuthMaterial>,
}

#[derive(Default)]
pub struct Counters {
  pub connects: AtomicU32,
  pub wiql: AtomicU32,
  pub batch: AtomicU32,
  pub repositories: AtomicU32,
  pub pull_requests: AtomicU32,
}

impl Counters {
  pub fn connects(&self) -> u32 {
    self.connects.load(Ordering::SeqCst)
  }

  pub fn wiql(&self) -> u32 {
    self.wiql.load(Ordering::SeqCst)
  }

  pub fn batch(&self) -> u32 {
    self.batch.load(Ordering::SeqCst)
  }

  pub fn repositories(&self) -> u32 {
    self.repositories.load(Ordering::SeqCst)
  }

  /// Every call that reached the "network".
  pub fn total(&self) -> u32 {
    self.connects() + self.wiql() + self.batch() + self.repositories()
      + self.pull_requests.load(Ordering::SeqCst)
  }
}

/// In-process stand-in for a TFS server.
#[derive(Clone)]
pub struct FakeServer {
  state: Arc<Mutex<State>>,
  counters: Arc<Counters>,
  hang: Arc<AtomicBool>,
}

impl FakeServer {
  pub fn new(user: &str) -> Self {
    Self {
      state: Arc::new(Mutex::new(State {
        user: user.to_string(),
        ..Default::default()
      })),
      counters: Arc::new(Counters::default()),
      hang: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn counters(&self) -> &Counters {
    &self.counters
  }

  fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
    f(&mut self.state.lock().unwrap())
  }

  pub fn add_work_item(&self, id: u64, title: &str, work_item_type: &str, assigned_to: &str) {
    let item = work_item(id, title, work_item_type, assigned_to);
    self.with(|s| s.work_items.push(item));
  }

  pub fn add_code_review(&self, id: u64, title: &str, assigned_to: &str) {
    let item = work_item(id, title, "Code Review Response", assigned_to);
    self.with(|s| s.code_reviews.push(item));
  }

  pub fn add_pull_request(&self, repo: &str, project: &str, id: u64, title: &str, reviewers: &[&str]) {
    let pr = ApiPullRequest {
      pull_request_id: id,
      title: Some(title.to_string()),
      created_by: Some(ApiIdentity {
        display_name: Some("Bob".to_string()),
        unique_name: None,
      }),
      source_ref_name: Some("refs/heads/feature".to_string()),
      target_ref_name: Some("refs/heads/main".to_string()),
      status: Some("active".to_string()),
      reviewers: reviewers
        .iter()
        .map(|r| ApiIdentity {
          display_name: Some(r.to_string()),
          unique_name: None,
        })
        .collect(),
      ..Default::default()
    };
    self.with(|s| {
      if let Some((_, prs)) = s.repositories.iter_mut().find(|(r, _)| r.name == repo) {
        prs.push(pr);
      } else {
        let repository = ApiRepository {
          id: format!("repo-{}", repo),
          name: repo.to_string(),
          project: Some(ApiProjectRef {
            name: project.to_string(),
          }),
        };
        s.repositories.push((repository, vec![pr]));
      }
    });
  }

  pub fn fail_connect(&self, error: RemoteError) {
    self.with(|s| s.connect_error = Some(error));
  }

  /// Fail the next WIQL queries with these errors, in order.
  pub fn fail_wiql(&self, errors: impl IntoIterator<Item = RemoteError>) {
    self.with(|s| s.wiql_failures.extend(errors));
  }

  pub fn fail_repositories(&self, errors: impl IntoIterator<Item = RemoteError>) {
    self.with(|s| s.repository_failures.extend(errors));
  }

  /// Make every query hang forever.
  pub fn hang(&self) {
    self.hang.store(true, Ordering::SeqCst);
  }

  pub fn last_wiql(&self) -> Option<String> {
    self.with(|s| s.last_wiql.clone())
  }

  pub fn last_auth(&self) -> Option<AuthMaterial> {
    self.with(|s| s.last_auth.clone())
  }

  async fn maybe_hang(&self) {
    if self.hang.load(Ordering::SeqCst) {
      std::future::pending::<()>().await;
    }
  }
}

fn work_item(id: u64, title: &str, work_item_type: &str, assigned_to: &str) -> ApiWorkItem {
  serde_json::from_value(json!({
    "id": id,
    "fields": {
      "System.Id": id,
      "System.Title": title,
      "System.WorkItemType": work_item_type,
      "System.State": "Active",
      "System.AssignedTo": { "displayName": assigned_to },
      "System.AreaPath": "Project\\Area",
      "System.IterationPath": "Project\\Sprint 1",
      "System.TeamProject": "Project",
      "Microsoft.VSTS.Common.Priority": 2,
      "System.CreatedDate": "2024-03-01T10:00:00Z",
      "System.ChangedDate": "2024-03-02T10:00:00Z"
    }
  }))
  .unwrap()
}

struct FakeConnection {
  server: FakeServer,
}

impl RemoteConnection for FakeConnection {
  fn work_items(&self) -> Arc<dyn WorkItemTracking> {
    Arc::new(self.server.clone())
  }

  fn source_control(&self) -> Arc<dyn SourceControl> {
    Arc::new(self.server.clone())
  }

  fn authorized_identity(&self) -> Option<String> {
    Some(self.server.with(|s| s.user.clone()))
  }

  fn server_version(&self) -> Option<String> {
    None
  }
}

#[async_trait]
impl Connector for FakeServer {
  async fn open(
    &self,
    _server_url: &str,
    auth: &AuthMaterial,
  ) -> Result<Box<dyn RemoteConnection>, RemoteError> {
    self.counters.connects.fetch_add(1, Ordering::SeqCst);
    self.with(|s| s.last_auth = Some(auth.clone()));
    if let Some(e) = self.with(|s| s.connect_error.clone()) {
      return Err(e);
    }
    Ok(Box::new(FakeConnection {
      server: self.clone(),
    }))
  }
}

#[async_trait]
impl WorkItemTracking for FakeServer {
  async fn query_by_wiql(&self, wiql: &str, top: Option<u32>) -> Result<Vec<u64>, RemoteError> {
    self.counters.wiql.fetch_add(1, Ordering::SeqCst);
    self.maybe_hang().await;
    self.with(|s| {
      s.last_wiql = Some(wiql.to_string());
      if let Some(e) = s.wiql_failures.pop_front() {
        return Err(e);
      }
      let source = if wiql.contains("= 'Code Review Response'") {
        &s.code_reviews
      } else {
        &s.work_items
      };
      let ids = source
        .iter()
        .filter(|item| item.text("System.AssignedTo") == s.user)
        .map(|item| item.id);
      Ok(match top {
        Some(n) => ids.take(n as usize).collect(),
        None => ids.collect(),
      })
    })
  }

  async fn get_work_items(
    &self,
    ids: &[u64],
    _fields: &[&str],
  ) -> Result<Vec<ApiWorkItem>, RemoteError> {
    self.counters.batch.fetch_add(1, Ordering::SeqCst);
    self.maybe_hang().await;
    Ok(self.with(|s| {
      s.work_items
        .iter()
        .chain(s.code_reviews.iter())
        .filter(|item| ids.contains(&item.id))
        .cloned()
        .collect()
    }))
  }
}

#[async_trait]
impl SourceControl for FakeServer {
  async fn get_repositories(&self) -> Result<Vec<ApiRepository>, RemoteError> {
    self.counters.repositories.fetch_add(1, Ordering::SeqCst);
    self.maybe_hang().await;
    self.with(|s| {
      if let Some(e) = s.repository_failures.pop_front() {
        return Err(e);
      }
      Ok(s.repositories.iter().map(|(r, _)| r.clone()).collect())
    })
  }

  async fn get_active_pull_requests(
    &self,
    repository_id: &str,
  ) -> Result<Vec<ApiPullRequest>, RemoteError> {
    self.counters.pull_requests.fetch_add(1, Ordering::SeqCst);
    self.maybe_hang().await;
    Ok(self.with(|s| {
      s.repositories
        .iter()
        .find(|(r, _)| r.id == repository_id)
        .map(|(_, prs)| prs.clone())
        .unwrap_or_default()
    }))
  }
}
