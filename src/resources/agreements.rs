//! Rental agreements and the legal documents generated for them.

use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::api_types::GenerateDocumentRequest;
use crate::remote::types::{Agreement, AgreementStatus, LegalDocument, StatusPatch};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{dashboard_filter, search_filter, Api};

const TABLE: &str = "agreements";
const DOCUMENTS_TABLE: &str = "legal_documents";
const GENERATE_DOCUMENT_FUNCTION: &str = "generate-legal-document";

pub mod keys {
  use super::AgreementFilters;
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("agreements")
  }

  pub fn list(filters: &AgreementFilters) -> QueryKey {
    all()
      .with("list")
      .with(filters.status.map(|s| s.as_str()))
      .with(filters.customer_id.as_ref())
      .with(filters.vehicle_id.as_ref())
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }

  pub fn documents(agreement_id: &str) -> QueryKey {
    QueryKey::new("legal_documents").with(agreement_id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgreementFilters {
  pub status: Option<AgreementStatus>,
  pub customer_id: Option<String>,
  pub vehicle_id: Option<String>,
}

impl AgreementFilters {
  pub fn select(&self) -> Select {
    Select::from(TABLE)
      .filter_opt(self.status, |s| Filter::eq("status", s))
      .filter_opt(self.customer_id.as_deref(), |c| Filter::eq("customer_id", c))
      .filter_opt(self.vehicle_id.as_deref(), |v| Filter::eq("vehicle_id", v))
      .order_by("start_date", Order::Desc)
  }
}

pub async fn fetch_agreements(
  remote: &RemoteClient,
  filters: &AgreementFilters,
) -> Result<Vec<Agreement>, RemoteError> {
  remote.select(&filters.select()).await
}

pub async fn fetch_agreement(remote: &RemoteClient, id: &str) -> Result<Agreement, RemoteError> {
  remote
    .select_one(&Select::from(TABLE).filter(Filter::eq("id", id)))
    .await
}

pub async fn fetch_documents(
  remote: &RemoteClient,
  agreement_id: &str,
) -> Result<Vec<LegalDocument>, RemoteError> {
  let select = Select::from(DOCUMENTS_TABLE)
    .filter(Filter::eq("agreement_id", agreement_id))
    .order_by("created_at", Order::Desc);
  remote.select(&select).await
}

pub fn list_query(api: &Api, filters: AgreementFilters) -> Query<Vec<Agreement>> {
  api.query(keys::list(&filters), move |remote| {
    let filters = filters.clone();
    async move { fetch_agreements(&remote, &filters).await }
  })
}

pub fn detail_query(api: &Api, id: &str) -> Query<Agreement> {
  let id = id.to_string();
  api.query(keys::detail(&id), move |remote| {
    let id = id.clone();
    async move { fetch_agreement(&remote, &id).await }
  })
}

pub fn documents_query(api: &Api, agreement_id: &str) -> Query<Vec<LegalDocument>> {
  let agreement_id = agreement_id.to_string();
  api.query(keys::documents(&agreement_id), move |remote| {
    let agreement_id = agreement_id.clone();
    async move { fetch_documents(&remote, &agreement_id).await }
  })
}

pub fn status_invalidations() -> Vec<KeyFilter> {
  vec![
    KeyFilter::prefix(keys::all()),
    dashboard_filter(),
    search_filter(),
  ]
}

pub fn update_status(api: &Api) -> Mutation<(String, AgreementStatus), Agreement> {
  api
    .mutation(
      "Agreement status updated",
      |remote, (id, status): (String, AgreementStatus)| async move {
        remote
          .update_by_id(TABLE, &id, &StatusPatch { status })
          .await
      },
    )
    .invalidates_all(status_invalidations())
}

/// Which document to generate for an agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
  pub agreement_id: String,
  pub document_type: String,
}

pub fn document_invalidations(document: &LegalDocument) -> Vec<KeyFilter> {
  vec![KeyFilter::exact(keys::documents(&document.agreement_id))]
}

/// Ask the `generate-legal-document` edge function for a new document.
pub fn generate_document(api: &Api) -> Mutation<DocumentRequest, LegalDocument> {
  api
    .mutation("Document generated", |remote, request: DocumentRequest| async move {
      let payload = GenerateDocumentRequest {
        agreement_id: &request.agreement_id,
        document_type: &request.document_type,
      };
      remote.invoke(GENERATE_DOCUMENT_FUNCTION, &payload).await
    })
    .invalidates_with(document_invalidations)
}

/// Amount still owed on an agreement after `paid` has been collected.
pub fn outstanding(agreement: &Agreement, paid: f64) -> f64 {
  let total = agreement.total_amount.unwrap_or(agreement.rent_amount);
  (total - paid).max(0.0)
}
