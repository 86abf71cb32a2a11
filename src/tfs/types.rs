use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label used when the server does not say what it is
pub const DEFAULT_SERVER_VERSION: &str = "TFS/Azure DevOps";

/// Display name used when the server does not report the signed-in identity
pub const UNKNOWN_USER: &str = "Unknown";

/// What the caller hands to `connect`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
  pub server_url: String,
  pub use_windows_authentication: bool,
  pub personal_access_token: Option<String>,
  pub domain: Option<String>,
  pub username: Option<String>,
}

/// Authentication material selected from `Credentials`
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMaterial {
  /// Integrated (Windows) authentication
  Integrated {
    domain: Option<String>,
    username: Option<String>,
  },
  /// Personal access token sent as HTTP basic auth
  Token(String),
}

impl std::fmt::Debug for AuthMaterial {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AuthMaterial::Integrated { domain, username } => f
        .debug_struct("Integrated")
        .field("domain", domain)
        .field("username", username)
        .finish(),
      AuthMaterial::Token(_) => f.write_str("Token(***)"),
    }
  }
}

impl Credentials {
  /// Pick the authentication to use: integrated if requested, else a token if
  /// one is present. `None` means nothing usable was supplied.
  pub fn auth_material(&self) -> Option<AuthMaterial> {
    if self.use_windows_authentication {
      return Some(AuthMaterial::Integrated {
        domain: self.domain.clone(),
        username: self.username.clone(),
      });
    }

    self
      .personal_access_token
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty())
      .map(|t| AuthMaterial::Token(t.to_string()))
  }
}

/// Outcome of a connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
  pub success: bool,
  pub authenticated_user: Option<String>,
  pub server_version: Option<String>,
  pub error_message: Option<String>,
  pub timestamp: DateTime<Utc>,
}

impl ConnectionResult {
  pub fn success(server_version: impl Into<String>, authenticated_user: impl Into<String>) -> Self {
    Self {
      success: true,
      authenticated_user: Some(authenticated_user.into()),
      server_version: Some(server_version.into()),
      error_message: None,
      timestamp: Utc::now(),
    }
  }

  pub fn failure(error_message: impl Into<String>) -> Self {
    Self {
      success: false,
      authenticated_user: None,
      server_version: None,
      error_message: Some(error_message.into()),
      timestamp: Utc::now(),
    }
  }
}

/// Work item assigned to the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
  pub id: u64,
  pub title: String,
  pub work_item_type: String,
  pub state: String,
  pub assigned_to: String,
  pub priority: String,
  pub area_path: String,
  pub iteration_path: String,
  pub created_date: Option<DateTime<Utc>>,
  pub changed_date: Option<DateTime<Utc>>,
  /// Link into the web UI
  pub url: String,
}

/// Active pull request the current user is reviewing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
  pub id: u64,
  pub title: String,
  pub repository: String,
  pub source_branch: String,
  pub target_branch: String,
  pub created_by: String,
  pub created_date: Option<DateTime<Utc>>,
  pub status: String,
  pub is_draft: bool,
  /// Link into the web UI
  pub url: String,
}

/// Code review response assigned to the current user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeReview {
  pub id: u64,
  pub title: String,
  pub requested_by: String,
  pub status: String,
  pub project_name: String,
  pub area_path: String,
  pub created_date: Option<DateTime<Utc>>,
  pub changed_date: Option<DateTime<Utc>>,
  /// Link into the web UI
  pub url: String,
}
