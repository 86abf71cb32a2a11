//! Connection holder for the remote server.
//!
//! `RemoteApiClient` owns at most one live connection and the sub-clients
//! derived from it. The network side sits behind the `Connector` trait so the
//! HTTP transport can be swapped for a simulated server.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::api_types::{ApiPullRequest, ApiRepository, ApiWorkItem};
use super::error::RemoteError;
use super::types::AuthMaterial;

/// Work item tracking endpoints.
#[async_trait]
pub trait WorkItemTracking: Send + Sync {
  /// Run a WIQL query and return the matched ids in query order.
  async fn query_by_wiql(&self, wiql: &str, top: Option<u32>) -> Result<Vec<u64>, RemoteError>;

  /// Fetch `fields` of the given work items.
  async fn get_work_items(
    &self,
    ids: &[u64],
    fields: &[&str],
  ) -> Result<Vec<ApiWorkItem>, RemoteError>;
}

/// Git source control endpoints.
#[async_trait]
pub trait SourceControl: Send + Sync {
  async fn get_repositories(&self) -> Result<Vec<ApiRepository>, RemoteError>;

  async fn get_active_pull_requests(
    &self,
    repository_id: &str,
  ) -> Result<Vec<ApiPullRequest>, RemoteError>;
}

/// An established session with the server.
pub trait RemoteConnection: Send + Sync {
  fn work_items(&self) -> Arc<dyn WorkItemTracking>;

  fn source_control(&self) -> Arc<dyn SourceControl>;

  /// Display name of the identity the server authenticated us as.
  fn authorized_identity(&self) -> Option<String>;

  /// Server flavour, e.g. "Azure DevOps Server".
  fn server_version(&self) -> Option<String>;
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn open(
    &self,
    server_url: &str,
    auth: &AuthMaterial,
  ) -> Result<Box<dyn RemoteConnection>, RemoteError>;
}

/// Holds the connection and its sub-clients.
pub struct RemoteApiClient {
  connector: Arc<dyn Connector>,
  connection: Option<Box<dyn RemoteConnection>>,
  work_items: Option<Arc<dyn WorkItemTracking>>,
  source_control: Option<Arc<dyn SourceControl>>,
}

impl RemoteApiClient {
  pub fn new(connector: Arc<dyn Connector>) -> Self {
    Self {
      connector,
      connection: None,
      work_items: None,
      source_control: None,
    }
  }

  /// Establish the session. On failure nothing stays held.
  pub async fn connect(
    &mut self,
    server_url: &str,
    auth: &AuthMaterial,
    cancel: &CancellationToken,
  ) -> Result<(), RemoteError> {
    self.dispose();

    let opened = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(RemoteError::Cancelled),
      result = self.connector.open(server_url, auth) => result,
    };

    match opened {
      Ok(connection) => {
        self.work_items = Some(connection.work_items());
        self.source_control = Some(connection.source_control());
        self.connection = Some(connection);
        Ok(())
      }
      Err(e) => {
        self.dispose();
        Err(e)
      }
    }
  }

  pub fn is_connected(&self) -> bool {
    self.connection.is_some()
  }

  /// Work item sub-client, `None` when not connected.
  pub fn work_item_client(&self) -> Option<Arc<dyn WorkItemTracking>> {
    self.work_items.clone()
  }

  /// Source control sub-client, `None` when not connected.
  pub fn source_control_client(&self) -> Option<Arc<dyn SourceControl>> {
    self.source_control.clone()
  }

  pub fn authorized_identity(&self) -> Option<String> {
    self.connection.as_ref()?.authorized_identity()
  }

  pub fn server_version(&self) -> Option<String> {
    self.connection.as_ref()?.server_version()
  }

  /// Release sub-clients, then the connection. Safe to call repeatedly.
  pub fn dispose(&mut self) {
    self.work_items = None;
    self.source_control = None;
    self.connection = None;
  }
}

impl Drop for RemoteApiClient {
  fn drop(&mut self) {
    self.dispose();
  }
}
