//! TFS / Azure DevOps access.
//!
//! - `client`: connection holder and the traits the transport implements
//! - `http`: reqwest transport against the REST API
//! - `service`: session manager with caching, retry and timeouts

pub mod api_types;
pub mod client;
pub mod error;
pub mod http;
pub mod service;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use error::TfsError;
pub use http::HttpConnector;
pub use service::SessionManager;
pub use types::{CodeReview, Credentials, PullRequest, WorkItem};
