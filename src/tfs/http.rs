//! reqwest-based transport for the Azure DevOps / TFS REST API.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::api_types::{
  ApiConnectionData, ApiList, ApiPullRequest, ApiRepository, ApiWiqlResult, ApiWorkItem,
};
use super::client::{Connector, RemoteConnection, SourceControl, WorkItemTracking};
use super::error::RemoteError;
use super::types::AuthMaterial;

/// REST API version sent with every request
const API_VERSION: &str = "5.0";

/// The batch work item endpoint accepts at most this many ids per call
const MAX_BATCH_IDS: usize = 200;

/// Per-request limit, independent of the session manager's overall deadline
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens HTTP sessions against a TFS / Azure DevOps server.
#[derive(Debug, Clone, Default)]
pub struct HttpConnector;

impl HttpConnector {
  pub fn new() -> Self {
    Self
  }
}

#[async_trait]
impl Connector for HttpConnector {
  async fn open(
    &self,
    server_url: &str,
    auth: &AuthMaterial,
  ) -> Result<Box<dyn RemoteConnection>, RemoteError> {
    let base = parse_server_url(server_url)?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("tfsv/", env!("CARGO_PKG_VERSION")))
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| RemoteError::Network(format!("Failed to create HTTP client: {}", e)))?;

    let inner = Arc::new(HttpInner {
      http,
      base,
      auth: auth.clone(),
    });

    // Validates both reachability and credentials
    let connection_data: ApiConnectionData = inner
      .send(inner.get("_apis/connectionData"))
      .await?;

    tracing::debug!(
      server = %inner.base,
      user = ?connection_data.display_name(),
      "Connected"
    );

    Ok(Box::new(HttpConnection {
      inner,
      identity: connection_data.display_name(),
      server_version: connection_data.server_version(),
    }))
  }
}

fn parse_server_url(server_url: &str) -> Result<Url, RemoteError> {
  let invalid = |reason: String| RemoteError::InvalidUrl {
    url: server_url.to_string(),
    reason,
  };

  let url = Url::parse(server_url.trim()).map_err(|e| invalid(e.to_string()))?;
  match url.scheme() {
    "http" | "https" => Ok(url),
    other => Err(invalid(format!("unsupported scheme '{}'", other))),
  }
}

struct HttpInner {
  http: reqwest::Client,
  base: Url,
  auth: AuthMaterial,
}

impl HttpInner {
  fn endpoint(&self, path: &str) -> String {
    format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
  }

  fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
    match &self.auth {
      AuthMaterial::Token(token) => request.basic_auth("", Some(token)),
      // No NTLM/Negotiate in reqwest; rely on an authenticating proxy or
      // anonymous access
      AuthMaterial::Integrated { .. } => request,
    }
  }

  fn get(&self, path: &str) -> RequestBuilder {
    self.authorize(
      self
        .http
        .get(self.endpoint(path))
        .query(&[("api-version", API_VERSION)]),
    )
  }

  fn post(&self, path: &str, body: serde_json::Value) -> RequestBuilder {
    self.authorize(
      self
        .http
        .post(self.endpoint(path))
        .query(&[("api-version", API_VERSION)])
        .json(&body),
    )
  }

  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, RemoteError> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let response = check_status(response).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| RemoteError::Decode(e.to_string()))
  }
}

fn map_reqwest_error(e: reqwest::Error) -> RemoteError {
  if e.is_decode() {
    RemoteError::Decode(e.to_string())
  } else {
    RemoteError::Network(e.to_string())
  }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  let message = serde_json::from_str::<serde_json::Value>(&body)
    .ok()
    .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
    .unwrap_or_else(|| {
      status
        .canonical_reason()
        .unwrap_or("Unknown error")
        .to_string()
    });
  Err(RemoteError::status(status.as_u16(), message))
}

struct HttpConnection {
  inner: Arc<HttpInner>,
  identity: Option<String>,
  server_version: Option<String>,
}

impl RemoteConnection for HttpConnection {
  fn work_items(&self) -> Arc<dyn WorkItemTracking> {
    Arc::new(HttpWorkItemClient {
      inner: Arc::clone(&self.inner),
    })
  }

  fn source_control(&self) -> Arc<dyn SourceControl> {
    Arc::new(HttpGitClient {
      inner: Arc::clone(&self.inner),
    })
  }

  fn authorized_identity(&self) -> Option<String> {
    self.identity.clone()
  }

  fn server_version(&self) -> Option<String> {
    self.server_version.clone()
  }
}

struct HttpWorkItemClient {
  inner: Arc<HttpInner>,
}

#[async_trait]
impl WorkItemTracking for HttpWorkItemClient {
  async fn query_by_wiql(&self, wiql: &str, top: Option<u32>) -> Result<Vec<u64>, RemoteError> {
    let mut request = self.inner.post("_apis/wit/wiql", json!({ "query": wiql }));
    if let Some(top) = top {
      request = request.query(&[("$top", top)]);
    }

    let result: ApiWiqlResult = self.inner.send(request).await?;
    Ok(result.work_items.into_iter().map(|w| w.id).collect())
  }

  async fn get_work_items(
    &self,
    ids: &[u64],
    fields: &[&str],
  ) -> Result<Vec<ApiWorkItem>, RemoteError> {
    let fields = fields.join(",");
    let mut items = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(MAX_BATCH_IDS) {
      let ids = chunk
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
      let request = self
        .inner
        .get("_apis/wit/workitems")
        .query(&[("ids", ids.as_str()), ("fields", fields.as_str())]);

      let response: ApiList<ApiWorkItem> = self.inner.send(request).await?;
      items.extend(response.value);
    }

    Ok(items)
  }
}

struct HttpGitClient {
  inner: Arc<HttpInner>,
}

#[async_trait]
impl SourceControl for HttpGitClient {
  async fn get_repositories(&self) -> Result<Vec<ApiRepository>, RemoteError> {
    let response: ApiList<ApiRepository> = self
      .inner
      .send(self.inner.get("_apis/git/repositories"))
      .await?;
    Ok(response.value)
  }

  async fn get_active_pull_requests(
    &self,
    repository_id: &str,
  ) -> Result<Vec<ApiPullRequest>, RemoteError> {
    let path = format!("_apis/git/repositories/{}/pullrequests", repository_id);
    let request = self
      .inner
      .get(&path)
      .query(&[("searchCriteria.status", "active")]);

    let response: ApiList<ApiPullRequest> = self.inner.send(request).await?;
    Ok(response.value)
  }
}
