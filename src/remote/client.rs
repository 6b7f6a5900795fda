use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::Config;

use super::error::RemoteError;
use super::filter::{Filter, Select};

const REST_PATH: &str = "rest/v1/";
const FUNCTIONS_PATH: &str = "functions/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the hosted database API
#[derive(Clone)]
pub struct RemoteClient {
  http: reqwest::Client,
  base: Url,
}

impl RemoteClient {
  pub fn new(config: &Config) -> Result<Self> {
    let api_key = Config::get_api_key()?;
    let access_token = Config::get_access_token();

    Self::with_credentials(&config.backend.url, &api_key, access_token.as_deref())
      .map_err(|e| eyre!("Failed to create backend client: {}", e))
  }

  /// Build a client for `base_url` using the project's API key and, when
  /// signed in, the user's access token for row-level policies.
  pub fn with_credentials(
    base_url: &str,
    api_key: &str,
    access_token: Option<&str>,
  ) -> std::result::Result<Self, RemoteError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let bearer = access_token.unwrap_or(api_key);
    let mut headers = HeaderMap::new();
    headers.insert("apikey", header_value(api_key)?);
    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|source| RemoteError::Transport {
        endpoint: base.to_string(),
        source,
      })?;

    Ok(Self { http, base })
  }

  /// Read rows matching `query`.
  pub async fn select<T: DeserializeOwned>(
    &self,
    query: &Select,
  ) -> std::result::Result<Vec<T>, RemoteError> {
    let endpoint = format!("{}{}", REST_PATH, query.table());
    let url = self.base.join(&endpoint)?;
    debug!(table = query.table(), "select");

    let request = self.http.get(url).query(&query.query_pairs());
    self.send(&endpoint, request).await
  }

  /// Read exactly one row, failing with `NotFound` when nothing matches.
  pub async fn select_one<T: DeserializeOwned>(
    &self,
    query: &Select,
  ) -> std::result::Result<T, RemoteError> {
    let query = query.clone().limit(1);
    self
      .select(&query)
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| RemoteError::NotFound {
        what: format!("{} row", query.table()),
      })
  }

  /// Insert one row and return it as stored.
  pub async fn insert<B, T>(&self, table: &str, body: &B) -> std::result::Result<T, RemoteError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let endpoint = format!("{}{}", REST_PATH, table);
    let url = self.base.join(&endpoint)?;
    debug!(table, "insert");

    let request = self
      .http
      .post(url)
      .header("Prefer", "return=representation")
      .json(body);
    let rows: Vec<T> = self.send(&endpoint, request).await?;
    rows.into_iter().next().ok_or_else(|| RemoteError::NotFound {
      what: format!("inserted {} row", table),
    })
  }

  /// Patch every row matching `filters` and return the updated rows.
  pub async fn update<B, T>(
    &self,
    table: &str,
    filters: &[Filter],
    body: &B,
  ) -> std::result::Result<Vec<T>, RemoteError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let endpoint = format!("{}{}", REST_PATH, table);
    let url = self.base.join(&endpoint)?;
    debug!(table, "update");

    let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_pair).collect();
    let request = self
      .http
      .request(Method::PATCH, url)
      .query(&pairs)
      .header("Prefer", "return=representation")
      .json(body);
    self.send(&endpoint, request).await
  }

  /// Patch the row with the given id.
  pub async fn update_by_id<B, T>(
    &self,
    table: &str,
    id: &str,
    body: &B,
  ) -> std::result::Result<T, RemoteError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let rows: Vec<T> = self.update(table, &[Filter::eq("id", id)], body).await?;
    rows.into_iter().next().ok_or_else(|| RemoteError::NotFound {
      what: format!("{} {}", table, id),
    })
  }

  /// Delete every row matching `filters`.
  pub async fn delete(&self, table: &str, filters: &[Filter]) -> std::result::Result<(), RemoteError> {
    let endpoint = format!("{}{}", REST_PATH, table);
    let url = self.base.join(&endpoint)?;
    debug!(table, "delete");

    let pairs: Vec<(String, String)> = filters.iter().map(Filter::to_pair).collect();
    let request = self.http.delete(url).query(&pairs);
    self.send::<serde_json::Value>(&endpoint, request).await?;
    Ok(())
  }

  /// Call a database function.
  pub async fn rpc<A, T>(&self, function: &str, args: &A) -> std::result::Result<T, RemoteError>
  where
    A: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let endpoint = format!("{}rpc/{}", REST_PATH, function);
    let url = self.base.join(&endpoint)?;
    debug!(function, "rpc");

    let request = self.http.post(url).json(args);
    self.send(&endpoint, request).await
  }

  /// Invoke an edge function with a JSON payload.
  pub async fn invoke<P, T>(&self, function: &str, payload: &P) -> std::result::Result<T, RemoteError>
  where
    P: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let endpoint = format!("{}{}", FUNCTIONS_PATH, function);
    let url = self.base.join(&endpoint)?;
    debug!(function, "invoke edge function");

    let request = self.http.post(url).json(payload);
    self.send(&endpoint, request).await
  }

  async fn send<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    request: RequestBuilder,
  ) -> std::result::Result<T, RemoteError> {
    let transport = |source| RemoteError::Transport {
      endpoint: endpoint.to_string(),
      source,
    };

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.bytes().await.map_err(transport)?;

    if !status.is_success() {
      return Err(RemoteError::from_response(endpoint, status.as_u16(), &body));
    }

    decode(endpoint, &body)
  }
}

fn header_value(value: &str) -> std::result::Result<HeaderValue, RemoteError> {
  HeaderValue::from_str(value).map_err(|_| RemoteError::Api {
    endpoint: String::new(),
    status: 0,
    code: None,
    message: "credential contains characters not allowed in a header".to_string(),
    details: None,
    hint: Some("check RENTDESK_API_KEY".to_string()),
  })
}

/// Decode a success body; an empty body reads as JSON `null`.
fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> std::result::Result<T, RemoteError> {
  let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
    b"null"
  } else {
    body
  };
  serde_json::from_slice(body).map_err(|source| RemoteError::Decode {
    endpoint: endpoint.to_string(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let client = RemoteClient::with_credentials("https://fleet.example.co", "anon", None).unwrap();
    assert_eq!(
      client.base.join("rest/v1/leads").unwrap().as_str(),
      "https://fleet.example.co/rest/v1/leads"
    );

    let nested =
      RemoteClient::with_credentials("https://example.co/project", "anon", Some("jwt")).unwrap();
    assert_eq!(
      nested.base.join("functions/v1/create-user").unwrap().as_str(),
      "https://example.co/project/functions/v1/create-user"
    );
  }

  #[test]
  fn test_invalid_url() {
    assert!(matches!(
      RemoteClient::with_credentials("not a url", "anon", None),
      Err(RemoteError::InvalidUrl(_))
    ));
  }

  #[test]
  fn test_decode_empty_body_as_unit() {
    let unit: () = decode("rest/v1/maintenance_records", b"").unwrap();
    assert_eq!(unit, ());
  }

  #[test]
  fn test_decode_error() {
    let err = decode::<Vec<u32>>("rest/v1/payments", b"{not json").unwrap_err();
    assert!(matches!(err, RemoteError::Decode { .. }));
  }
}
