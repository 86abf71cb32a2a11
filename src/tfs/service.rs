//! Session manager: connection lifecycle plus the cached, retried, time-boxed
//! queries for work items, pull requests and code reviews.

use futures::future::try_join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheLayer, CacheStore};
use crate::retry::RetryPolicy;

use super::api_types::{fields, ApiWorkItem};
use super::client::{Connector, RemoteApiClient, SourceControl, WorkItemTracking};
use super::error::{RemoteError, TfsError};
use super::types::{
  CodeReview, ConnectionResult, Credentials, PullRequest, WorkItem, DEFAULT_SERVER_VERSION,
  UNKNOWN_USER,
};

/// Cache keys, one per entity bucket
pub const WORK_ITEMS_KEY: &str = "assigned_work_items";
pub const PULL_REQUESTS_KEY: &str = "assigned_pull_requests";
pub const CODE_REVIEWS_KEY: &str = "assigned_code_reviews";

/// Deadline for a single fetch operation, retries included
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const OP_WORK_ITEMS: &str = "GetAssignedWorkItems";
const OP_PULL_REQUESTS: &str = "GetPullRequests";
const OP_CODE_REVIEWS: &str = "GetCodeReviews";

const WORK_ITEMS_WIQL: &str = "\
SELECT [System.Id], [System.Title], [System.WorkItemType], [System.State],
       [System.AssignedTo], [System.CreatedDate], [System.ChangedDate]
FROM WorkItems
WHERE [System.AssignedTo] = @Me
  AND [System.WorkItemType] <> 'DevNotes'
  AND [System.WorkItemType] <> 'Code Review Response'
  AND [System.WorkItemType] <> 'Code Review Request'
ORDER BY [System.ChangedDate] DESC";

const CODE_REVIEWS_WIQL: &str = "\
SELECT [System.Id], [System.Title], [System.WorkItemType], [System.State],
       [System.AssignedTo], [System.CreatedDate], [System.ChangedDate]
FROM WorkItems
WHERE [System.WorkItemType] = 'Code Review Response'
  AND [System.AssignedTo] = @Me
ORDER BY [System.ChangedDate] DESC";

const CONNECTION_TEST_WIQL: &str =
  "SELECT [System.Id] FROM WorkItems WHERE [System.WorkItemType] <> '' ORDER BY [System.Id] DESC";

const WORK_ITEM_FIELDS: &[&str] = &[
  fields::ID,
  fields::TITLE,
  fields::WORK_ITEM_TYPE,
  fields::STATE,
  fields::ASSIGNED_TO,
  fields::CREATED_DATE,
  fields::CHANGED_DATE,
  fields::PRIORITY,
  fields::AREA_PATH,
  fields::ITERATION_PATH,
];

const CODE_REVIEW_FIELDS: &[&str] = &[
  fields::ID,
  fields::TITLE,
  fields::WORK_ITEM_TYPE,
  fields::STATE,
  fields::ASSIGNED_TO,
  fields::CREATED_DATE,
  fields::CHANGED_DATE,
  fields::TEAM_PROJECT,
  fields::AREA_PATH,
];

/// State held while connected.
struct Session {
  client: RemoteApiClient,
  server_url: String,
  current_user: String,
}

/// Owns the connection to one server and serves cached query results.
///
/// `connect`/`disconnect` take `&mut self`; the fetch operations take `&self`
/// and can run concurrently against the shared cache.
pub struct SessionManager<S: CacheStore> {
  connector: Arc<dyn Connector>,
  cache: CacheLayer<S>,
  retry: RetryPolicy,
  session: Option<Session>,
}

impl<S: CacheStore> SessionManager<S> {
  pub fn new(connector: Arc<dyn Connector>, cache: Arc<S>) -> Self {
    Self {
      connector,
      cache: CacheLayer::new(cache),
      retry: RetryPolicy::tfs_default(),
      session: None,
    }
  }

  pub fn is_connected(&self) -> bool {
    self
      .session
      .as_ref()
      .is_some_and(|s| s.client.is_connected())
  }

  /// Display name of the authenticated user while connected.
  pub fn current_user(&self) -> Option<&str> {
    self.session.as_ref().map(|s| s.current_user.as_str())
  }

  pub fn server_url(&self) -> Option<&str> {
    self.session.as_ref().map(|s| s.server_url.as_str())
  }

  /// The cache shared with callers (e.g. for manual refresh).
  pub fn cache(&self) -> &Arc<S> {
    self.cache.storage()
  }

  /// Connect to the server described by `credentials`.
  ///
  /// Never returns an error: every failure ends up in the result, and a
  /// failed attempt leaves the manager disconnected.
  pub async fn connect(
    &mut self,
    credentials: Credentials,
    cancel: &CancellationToken,
  ) -> ConnectionResult {
    let server_url = credentials.server_url.trim().trim_end_matches('/').to_string();
    if server_url.is_empty() {
      return ConnectionResult::failure("Server URL is required");
    }

    // Whatever was cached may belong to another identity
    self.disconnect();

    let Some(auth) = credentials.auth_material() else {
      return ConnectionResult::failure("No valid authentication method provided");
    };

    let mut client = RemoteApiClient::new(Arc::clone(&self.connector));
    if let Err(e) = client.connect(&server_url, &auth, cancel).await {
      client.dispose();
      tracing::error!(server_url = %server_url, error = %e, "Connection failed");
      return ConnectionResult::failure(format!("Connection failed: {}", e));
    }

    let current_user = client
      .authorized_identity()
      .unwrap_or_else(|| UNKNOWN_USER.to_string());
    let server_version = client
      .server_version()
      .unwrap_or_else(|| DEFAULT_SERVER_VERSION.to_string());

    tracing::info!(server_url = %server_url, user = %current_user, "Connected");

    self.session = Some(Session {
      client,
      server_url,
      current_user: current_user.clone(),
    });

    ConnectionResult::success(server_version, current_user)
  }

  /// Check the live connection with a one-row query.
  pub async fn test_connection(&self, cancel: &CancellationToken) -> ConnectionResult {
    let Some(session) = self.session.as_ref().filter(|s| s.client.is_connected()) else {
      return ConnectionResult::failure("Not connected");
    };
    let Some(wit) = session.client.work_item_client() else {
      return ConnectionResult::failure("Work item client not available");
    };

    let outcome = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(RemoteError::Cancelled),
      result = tokio::time::timeout(FETCH_TIMEOUT, wit.query_by_wiql(CONNECTION_TEST_WIQL, Some(1))) => {
        result.unwrap_or_else(|_| Err(RemoteError::Network("request timed out".to_string())))
      }
    };

    match outcome {
      Ok(_) => ConnectionResult::success(
        session
          .client
          .server_version()
          .unwrap_or_else(|| DEFAULT_SERVER_VERSION.to_string()),
        session.current_user.clone(),
      ),
      Err(e) => ConnectionResult::failure(format!("Connection test failed: {}", e)),
    }
  }

  /// Drop the connection and everything fetched through it.
  pub fn disconnect(&mut self) {
    if let Some(mut session) = self.session.take() {
      session.client.dispose();
      tracing::info!(server_url = %session.server_url, "Disconnected");
    }
    if let Err(e) = self.cache().clear() {
      tracing::warn!(error = %e, "Failed to clear cache on disconnect");
    }
  }

  /// Work items assigned to the current user, most recently changed first.
  pub async fn get_assigned_work_items(
    &self,
    cancel: &CancellationToken,
  ) -> Result<Vec<WorkItem>, TfsError> {
    self
      .cache
      .fetch_list(WORK_ITEMS_KEY, || async {
        let session = self.require_session(OP_WORK_ITEMS)?;
        let wit = work_item_client(session, OP_WORK_ITEMS)?;
        self
          .bounded(OP_WORK_ITEMS, session, cancel, async {
            let items = self
              .query_work_items(&wit, WORK_ITEMS_WIQL, WORK_ITEM_FIELDS)
              .await
              .map_err(|e| remote_failure(OP_WORK_ITEMS, session, "work items", e))?;
            Ok(
              items
                .into_iter()
                .map(|item| item.into_work_item(&session.server_url))
                .collect(),
            )
          })
          .await
      })
      .await
  }

  /// Active pull requests where the current user is a reviewer.
  ///
  /// Walks every repository on the server; there is no cap.
  pub async fn get_pull_requests(
    &self,
    cancel: &CancellationToken,
  ) -> Result<Vec<PullRequest>, TfsError> {
    self
      .cache
      .fetch_list(PULL_REQUESTS_KEY, || async {
        let session = self.require_session(OP_PULL_REQUESTS)?;
        let git = session
          .client
          .source_control_client()
          .ok_or(TfsError::ClientUnavailable {
            operation: OP_PULL_REQUESTS,
            client: "Git",
          })?;
        self
          .bounded(OP_PULL_REQUESTS, session, cancel, async {
            self
              .retry
              .execute(|| reviewed_pull_requests(git.as_ref(), session))
              .await
              .map_err(|e| remote_failure(OP_PULL_REQUESTS, session, "pull requests", e))
          })
          .await
      })
      .await
  }

  /// Code review responses assigned to the current user.
  pub async fn get_code_reviews(
    &self,
    cancel: &CancellationToken,
  ) -> Result<Vec<CodeReview>, TfsError> {
    self
      .cache
      .fetch_list(CODE_REVIEWS_KEY, || async {
        let session = self.require_session(OP_CODE_REVIEWS)?;
        let wit = work_item_client(session, OP_CODE_REVIEWS)?;
        self
          .bounded(OP_CODE_REVIEWS, session, cancel, async {
            let items = self
              .query_work_items(&wit, CODE_REVIEWS_WIQL, CODE_REVIEW_FIELDS)
              .await
              .map_err(|e| remote_failure(OP_CODE_REVIEWS, session, "code reviews", e))?;
            Ok(
              items
                .into_iter()
                .map(|item| item.into_code_review(&session.server_url))
                .collect(),
            )
          })
          .await
      })
      .await
  }

  fn require_session(&self, operation: &'static str) -> Result<&Session, TfsError> {
    self
      .session
      .as_ref()
      .filter(|s| s.client.is_connected())
      .ok_or(TfsError::NotConnected { operation })
  }

  /// Run `work` under the fetch deadline, linked with the caller's token.
  async fn bounded<T>(
    &self,
    operation: &'static str,
    session: &Session,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, TfsError>>,
  ) -> Result<T, TfsError> {
    tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(TfsError::Cancelled { operation }),
      result = tokio::time::timeout(FETCH_TIMEOUT, work) => match result {
        Ok(result) => result,
        Err(_) => {
          tracing::warn!(
            operation,
            server_url = %session.server_url,
            timeout_secs = FETCH_TIMEOUT.as_secs(),
            "Request timed out"
          );
          Err(TfsError::Timeout {
            operation,
            server_url: session.server_url.clone(),
            timeout: FETCH_TIMEOUT,
          })
        }
      },
    }
  }

  /// WIQL query, then a batch fetch of `fields` for the matched ids, each
  /// step retried on its own. Results keep the query's order.
  async fn query_work_items(
    &self,
    wit: &Arc<dyn WorkItemTracking>,
    wiql: &str,
    fields: &[&str],
  ) -> Result<Vec<ApiWorkItem>, RemoteError> {
    let ids = self.retry.execute(|| wit.query_by_wiql(wiql, None)).await?;
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let mut fetched = self
      .retry
      .execute(|| wit.get_work_items(&ids, fields))
      .await?;

    let position = |id: u64| ids.iter().position(|&i| i == id).unwrap_or(usize::MAX);
    fetched.sort_by_key(|item| position(item.id));
    Ok(fetched)
  }
}

fn work_item_client(
  session: &Session,
  operation: &'static str,
) -> Result<Arc<dyn WorkItemTracking>, TfsError> {
  session
    .client
    .work_item_client()
    .ok_or(TfsError::ClientUnavailable {
      operation,
      client: "Work item",
    })
}

async fn reviewed_pull_requests(
  git: &dyn SourceControl,
  session: &Session,
) -> Result<Vec<PullRequest>, RemoteError> {
  let repositories = git.get_repositories().await?;
  let per_repository = try_join_all(
    repositories
      .iter()
      .map(|repo| git.get_active_pull_requests(&repo.id)),
  )
  .await?;

  Ok(
    repositories
      .iter()
      .zip(per_repository)
      .flat_map(|(repo, prs)| {
        prs
          .into_iter()
          .filter(|pr| pr.has_reviewer(&session.current_user))
          .map(move |pr| pr.into_pull_request(repo, &session.server_url))
      })
      .collect(),
  )
}

fn remote_failure(
  operation: &'static str,
  session: &Session,
  what: &'static str,
  source: RemoteError,
) -> TfsError {
  tracing::error!(
    operation,
    server_url = %session.server_url,
    error = %source,
    "Failed to retrieve {}",
    what
  );
  TfsError::Remote {
    operation,
    server_url: session.server_url.clone(),
    what,
    source,
  }
}
