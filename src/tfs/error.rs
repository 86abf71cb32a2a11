//! Error types for the remote transport and the session manager.

use std::time::Duration;
use thiserror::Error;

use crate::retry::Transient;

/// Failure talking to the remote server.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
  /// Connection refused/reset, DNS, request timeout and similar I/O trouble.
  #[error("Network error: {0}")]
  Network(String),

  /// Server answered with a non-success status.
  #[error("Server returned {status}: {message}")]
  Status { status: u16, message: String },

  /// Response body did not have the expected shape.
  #[error("Failed to parse response: {0}")]
  Decode(String),

  #[error("Invalid server URL '{url}': {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("Operation cancelled")]
  Cancelled,
}

impl RemoteError {
  pub fn status(status: u16, message: impl Into<String>) -> Self {
    RemoteError::Status {
      status,
      message: message.into(),
    }
  }
}

impl Transient for RemoteError {
  /// Network I/O failures and 5xx responses are transient. Everything else,
  /// including 4xx, is fatal.
  fn is_transient(&self) -> bool {
    match self {
      RemoteError::Network(_) => true,
      RemoteError::Status { status, .. } => (500..600).contains(status),
      _ => false,
    }
  }
}

/// Failure surfaced by the session manager's fetch operations.
#[derive(Debug, Error)]
pub enum TfsError {
  #[error("Not connected to TFS server")]
  NotConnected { operation: &'static str },

  #[error("{client} client not available")]
  ClientUnavailable {
    operation: &'static str,
    client: &'static str,
  },

  #[error("Request timed out after {} seconds", .timeout.as_secs())]
  Timeout {
    operation: &'static str,
    server_url: String,
    timeout: Duration,
  },

  #[error("{operation} was cancelled")]
  Cancelled { operation: &'static str },

  #[error("Failed to retrieve {what}: {source}")]
  Remote {
    operation: &'static str,
    server_url: String,
    what: &'static str,
    #[source]
    source: RemoteError,
  },
}

impl TfsError {
  /// Name of the operation that failed.
  pub fn operation(&self) -> &'static str {
    match self {
      TfsError::NotConnected { operation }
      | TfsError::ClientUnavailable { operation, .. }
      | TfsError::Timeout { operation, .. }
      | TfsError::Cancelled { operation }
      | TfsError::Remote { operation, .. } => operation,
    }
  }

  /// Server the operation was talking to, when it got that far.
  pub fn server_url(&self) -> Option<&str> {
    match self {
      TfsError::Timeout { server_url, .. } | TfsError::Remote { server_url, .. } => {
        Some(server_url)
      }
      _ => None,
    }
  }

  /// Whether trying again later might succeed.
  pub fn is_transient(&self) -> bool {
    match self {
      TfsError::Timeout { .. } => true,
      TfsError::Remote { source, .. } => source.is_transient(),
      _ => false,
    }
  }
}
