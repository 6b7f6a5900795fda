//! Serde-deserializable types matching the backend's error and RPC responses.
//!
//! These types are separate from row types so error bodies from the REST
//! layer, RPC functions and edge functions can all be decoded the same way.

use serde::{Deserialize, Serialize};

/// Error body returned by the REST layer (`{code, message, details, hint}`)
/// or by edge functions (`{error}`).
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub code: Option<String>,
  #[serde(alias = "error", alias = "msg")]
  pub message: Option<String>,
  pub details: Option<String>,
  pub hint: Option<String>,
}

/// Arguments for the `award_loyalty_points` RPC.
#[derive(Debug, Serialize)]
pub struct AwardPointsArgs<'a> {
  pub p_customer_id: &'a str,
  pub p_points: i64,
  pub p_reason: &'a str,
}

/// Payload for the `generate-legal-document` edge function.
#[derive(Debug, Serialize)]
pub struct GenerateDocumentRequest<'a> {
  pub agreement_id: &'a str,
  pub document_type: &'a str,
}

/// Payload for the `create-user` edge function.
#[derive(Debug, Serialize)]
pub struct ProvisionUserRequest<'a> {
  pub email: &'a str,
  pub full_name: &'a str,
  pub role: &'a str,
}

/// Response of the `create-user` edge function.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionUserResponse {
  pub user_id: String,
  #[serde(default)]
  pub invited: bool,
}
