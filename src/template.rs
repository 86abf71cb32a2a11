//! `%Field%` placeholder templates for formatting work items, pull requests
//! and code reviews.

use chrono::{DateTime, Utc};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::tfs::{CodeReview, PullRequest, WorkItem};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"%([A-Za-z_][A-Za-z0-9_]*)%").expect("placeholder pattern is valid")
});

/// Timestamp format used when a date field is substituted
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A named field readable from `T`.
pub struct Field<T> {
  pub name: &'static str,
  pub get: fn(&T) -> String,
}

/// Types whose fields can be referenced from a template.
pub trait FieldSource: Sized + 'static {
  const FIELDS: &'static [Field<Self>];

  /// Value of the field called `name`, ignoring case.
  fn field(&self, name: &str) -> Option<String> {
    Self::FIELDS
      .iter()
      .find(|f| f.name.eq_ignore_ascii_case(name))
      .map(|f| (f.get)(self))
  }
}

/// Replace every `%Name%` in `template` with the matching field of `source`.
///
/// Unknown names are left as written.
pub fn resolve_parameters<T: FieldSource>(template: &str, source: &T) -> String {
  PLACEHOLDER
    .replace_all(template, |caps: &Captures| {
      source
        .field(&caps[1])
        .unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

fn date(value: &Option<DateTime<Utc>>) -> String {
  value
    .map(|d| d.format(DATE_FORMAT).to_string())
    .unwrap_or_default()
}

impl FieldSource for WorkItem {
  const FIELDS: &'static [Field<Self>] = &[
    Field { name: "Id", get: |w| w.id.to_string() },
    Field { name: "Title", get: |w| w.title.clone() },
    Field { name: "WorkItemType", get: |w| w.work_item_type.clone() },
    Field { name: "State", get: |w| w.state.clone() },
    Field { name: "AssignedTo", get: |w| w.assigned_to.clone() },
    Field { name: "Priority", get: |w| w.priority.clone() },
    Field { name: "AreaPath", get: |w| w.area_path.clone() },
    Field { name: "IterationPath", get: |w| w.iteration_path.clone() },
    Field { name: "CreatedDate", get: |w| date(&w.created_date) },
    Field { name: "ChangedDate", get: |w| date(&w.changed_date) },
    Field { name: "Url", get: |w| w.url.clone() },
  ];
}

impl FieldSource for PullRequest {
  const FIELDS: &'static [Field<Self>] = &[
    Field { name: "Id", get: |p| p.id.to_string() },
    Field { name: "Title", get: |p| p.title.clone() },
    Field { name: "Repository", get: |p| p.repository.clone() },
    Field { name: "SourceBranch", get: |p| p.source_branch.clone() },
    Field { name: "TargetBranch", get: |p| p.target_branch.clone() },
    Field { name: "CreatedBy", get: |p| p.created_by.clone() },
    Field { name: "CreatedDate", get: |p| date(&p.created_date) },
    Field { name: "Status", get: |p| p.status.clone() },
    Field { name: "IsDraft", get: |p| p.is_draft.to_string() },
    Field { name: "Url", get: |p| p.url.clone() },
  ];
}

impl FieldSource for CodeReview {
  const FIELDS: &'static [Field<Self>] = &[
    Field { name: "Id", get: |c| c.id.to_string() },
    Field { name: "Title", get: |c| c.title.clone() },
    Field { name: "RequestedBy", get: |c| c.requested_by.clone() },
    Field { name: "Status", get: |c| c.status.clone() },
    Field { name: "ProjectName", get: |c| c.project_name.clone() },
    Field { name: "AreaPath", get: |c| c.area_path.clone() },
    Field { name: "CreatedDate", get: |c| date(&c.created_date) },
    Field { name: "ChangedDate", get: |c| date(&c.changed_date) },
    Field { name: "Url", get: |c| c.url.clone() },
  ];
}
