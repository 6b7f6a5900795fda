use thiserror::Error;

use super::api_types::ApiErrorBody;

/// Failure talking to the hosted backend.
#[derive(Debug, Error)]
pub enum RemoteError {
  #[error("request to {endpoint} failed: {source}")]
  Transport {
    endpoint: String,
    source: reqwest::Error,
  },
  #[error("{endpoint} returned {status}: {message}")]
  Api {
    endpoint: String,
    status: u16,
    code: Option<String>,
    message: String,
    details: Option<String>,
    hint: Option<String>,
  },
  #[error("failed to decode response from {endpoint}: {source}")]
  Decode {
    endpoint: String,
    source: serde_json::Error,
  },
  #[error("{what} not found")]
  NotFound { what: String },
  #[error("invalid backend url: {0}")]
  InvalidUrl(#[from] url::ParseError),
}

impl RemoteError {
  /// Build an API error from a non-success response body.
  pub fn from_response(endpoint: &str, status: u16, body: &[u8]) -> Self {
    let parsed: ApiErrorBody = serde_json::from_slice(body).unwrap_or_default();
    let message = parsed.message.unwrap_or_else(|| {
      let text = String::from_utf8_lossy(body).trim().to_string();
      if text.is_empty() {
        reqwest::StatusCode::from_u16(status)
          .ok()
          .and_then(|s| s.canonical_reason())
          .unwrap_or("request failed")
          .to_string()
      } else {
        text
      }
    });

    RemoteError::Api {
      endpoint: endpoint.to_string(),
      status,
      code: parsed.code,
      message,
      details: parsed.details,
      hint: parsed.hint,
    }
  }

  /// Whether the same request could succeed if sent again. Timeouts, rate
  /// limits and server errors qualify; missing rows and other 4xx do not.
  pub fn is_retryable(&self) -> bool {
    match self {
      RemoteError::Transport { .. } => true,
      RemoteError::Api { status, .. } => matches!(*status, 408 | 429 | 500..=599),
      RemoteError::Decode { .. } | RemoteError::NotFound { .. } | RemoteError::InvalidUrl(_) => false,
    }
  }

  pub fn status(&self) -> Option<u16> {
    match self {
      RemoteError::Api { status, .. } => Some(*status),
      _ => None,
    }
  }
}
