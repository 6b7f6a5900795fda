use thiserror::Error;

use crate::remote::RemoteError;

/// Error surfaced by data and mutation hooks.
///
/// Cloneable so one failed fetch can be handed to every caller sharing it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
  #[error("{0}")]
  Fetch(String),
  /// The backend refused the request; asking again gives the same answer.
  #[error("{0}")]
  Rejected(String),
  #[error("cached value for {key} has a different type")]
  TypeMismatch { key: String },
}

impl QueryError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, QueryError::Fetch(_))
  }
}

impl From<RemoteError> for QueryError {
  fn from(err: RemoteError) -> Self {
    if err.is_retryable() {
      QueryError::Fetch(err.to_string())
    } else {
      QueryError::Rejected(err.to_string())
    }
  }
}

impl From<String> for QueryError {
  fn from(msg: String) -> Self {
    QueryError::Fetch(msg)
  }
}

impl From<&str> for QueryError {
  fn from(msg: &str) -> Self {
    QueryError::Fetch(msg.to_string())
  }
}
