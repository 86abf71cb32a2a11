//! Serde-deserializable types matching the TFS / Azure DevOps REST responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on what callers display.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use super::types::{CodeReview, PullRequest, WorkItem};

// ============================================================================
// Common nested types
// ============================================================================

/// `{ "count": n, "value": [...] }` envelope used by list endpoints
#[derive(Debug, Deserialize)]
pub struct ApiList<T> {
  #[serde(default = "Vec::new")]
  pub value: Vec<T>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiIdentity {
  pub display_name: Option<String>,
  pub unique_name: Option<String>,
}

// ============================================================================
// Connection data
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConnectionUser {
  pub provider_display_name: Option<String>,
  pub custom_display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConnectionData {
  pub authenticated_user: Option<ApiConnectionUser>,
  pub deployment_type: Option<String>,
}

impl ApiConnectionData {
  pub fn display_name(&self) -> Option<String> {
    let user = self.authenticated_user.as_ref()?;
    user
      .custom_display_name
      .as_deref()
      .or(user.provider_display_name.as_deref())
      .filter(|s| !s.trim().is_empty())
      .map(String::from)
  }

  pub fn server_version(&self) -> Option<String> {
    match self.deployment_type.as_deref()? {
      "hosted" => Some("Azure DevOps Services".to_string()),
      "onPremises" => Some("Azure DevOps Server".to_string()),
      _ => None,
    }
  }
}

// ============================================================================
// Work item tracking
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiWorkItemRef {
  pub id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiWiqlResult {
  #[serde(default)]
  pub work_items: Vec<ApiWorkItemRef>,
}

/// A work item as returned by the batch fields endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiWorkItem {
  pub id: u64,
  #[serde(default)]
  pub fields: HashMap<String, Value>,
}

pub mod fields {
  pub const ID: &str = "System.Id";
  pub const TITLE: &str = "System.Title";
  pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
  pub const STATE: &str = "System.State";
  pub const ASSIGNED_TO: &str = "System.AssignedTo";
  pub const CREATED_DATE: &str = "System.CreatedDate";
  pub const CHANGED_DATE: &str = "System.ChangedDate";
  pub const AREA_PATH: &str = "System.AreaPath";
  pub const ITERATION_PATH: &str = "System.IterationPath";
  pub const TEAM_PROJECT: &str = "System.TeamProject";
  pub const PRIORITY: &str = "Microsoft.VSTS.Common.Priority";
}

impl ApiWorkItem {
  /// Text value of a field. Identity fields render as their display name.
  pub fn text(&self, name: &str) -> String {
    self.fields.get(name).and_then(value_text).unwrap_or_default()
  }

  pub fn date(&self, name: &str) -> Option<DateTime<Utc>> {
    self.fields.get(name).and_then(value_date)
  }

  pub fn into_work_item(self, server_url: &str) -> WorkItem {
    WorkItem {
      id: self.id,
      title: self.text(fields::TITLE),
      work_item_type: self.text(fields::WORK_ITEM_TYPE),
      state: self.text(fields::STATE),
      assigned_to: self.text(fields::ASSIGNED_TO),
      priority: self.text(fields::PRIORITY),
      area_path: self.text(fields::AREA_PATH),
      iteration_path: self.text(fields::ITERATION_PATH),
      created_date: self.date(fields::CREATED_DATE),
      changed_date: self.date(fields::CHANGED_DATE),
      url: work_item_url(server_url, self.id),
    }
  }

  pub fn into_code_review(self, server_url: &str) -> CodeReview {
    CodeReview {
      id: self.id,
      title: self.text(fields::TITLE),
      requested_by: self.text(fields::ASSIGNED_TO),
      status: self.text(fields::STATE),
      project_name: self.text(fields::TEAM_PROJECT),
      area_path: self.text(fields::AREA_PATH),
      created_date: self.date(fields::CREATED_DATE),
      changed_date: self.date(fields::CHANGED_DATE),
      url: work_item_url(server_url, self.id),
    }
  }
}

// ============================================================================
// Git
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProjectRef {
  #[serde(default)]
  pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRepository {
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub project: Option<ApiProjectRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPullRequest {
  pub pull_request_id: u64,
  pub title: Option<String>,
  pub created_by: Option<ApiIdentity>,
  pub source_ref_name: Option<String>,
  pub target_ref_name: Option<String>,
  pub creation_date: Option<DateTime<Utc>>,
  pub status: Option<String>,
  pub is_draft: Option<bool>,
  #[serde(default)]
  pub reviewers: Vec<ApiIdentity>,
}

/// Project segment used in pull request links when the repository has none
pub const DEFAULT_PROJECT: &str = "DefaultCollection";

impl ApiPullRequest {
  /// Whether `user` is among the reviewers, ignoring case.
  pub fn has_reviewer(&self, user: &str) -> bool {
    let user = user.to_lowercase();
    self.reviewers.iter().any(|r| {
      r.display_name
        .as_deref()
        .is_some_and(|name| name.to_lowercase() == user)
    })
  }

  pub fn into_pull_request(self, repo: &ApiRepository, server_url: &str) -> PullRequest {
    let project = repo
      .project
      .as_ref()
      .map(|p| p.name.as_str())
      .filter(|name| !name.is_empty())
      .unwrap_or(DEFAULT_PROJECT);

    PullRequest {
      id: self.pull_request_id,
      title: self.title.unwrap_or_default(),
      repository: repo.name.clone(),
      source_branch: self.source_ref_name.unwrap_or_default(),
      target_branch: self.target_ref_name.unwrap_or_default(),
      created_by: self
        .created_by
        .and_then(|u| u.display_name)
        .unwrap_or_default(),
      created_date: self.creation_date,
      status: self.status.unwrap_or_default(),
      is_draft: self.is_draft.unwrap_or(false),
      url: pull_request_url(server_url, project, &repo.name, self.pull_request_id),
    }
  }
}

// ============================================================================
// Web UI links
// ============================================================================

pub fn work_item_url(server_url: &str, id: u64) -> String {
  format!("{}/_workitems/edit/{}", server_url.trim_end_matches('/'), id)
}

pub fn pull_request_url(server_url: &str, project: &str, repository: &str, id: u64) -> String {
  format!(
    "{}/{}/_git/{}/pullrequest/{}",
    server_url.trim_end_matches('/'),
    project,
    repository,
    id
  )
}

// ============================================================================
// Helpers
// ============================================================================

/// Render a field value as text.
/// Values can be:
/// - A string
/// - A number or bool (priority, ids)
/// - An identity object with "displayName" (newer servers for System.AssignedTo)
/// - null
fn value_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Object(obj) => obj
      .get("displayName")
      .or_else(|| obj.get("uniqueName"))
      .and_then(|v| v.as_str())
      .map(String::from),
    _ => None,
  }
}

fn value_date(value: &Value) -> Option<DateTime<Utc>> {
  value
    .as_str()
    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    .map(|dt| dt.with_timezone(&Utc))
}
