use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::types::{NewPayment, Payment, PaymentStatus};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{agreements, dashboard_filter, Api};

const TABLE: &str = "payments";

pub mod keys {
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("payments")
  }

  pub fn for_agreement(agreement_id: &str) -> QueryKey {
    all().with(agreement_id)
  }
}

pub async fn fetch_payments(
  remote: &RemoteClient,
  agreement_id: &str,
) -> Result<Vec<Payment>, RemoteError> {
  let select = Select::from(TABLE)
    .filter(Filter::eq("agreement_id", agreement_id))
    .order_by("due_date", Order::Asc);
  remote.select(&select).await
}

pub fn list_query(api: &Api, agreement_id: &str) -> Query<Vec<Payment>> {
  let agreement_id = agreement_id.to_string();
  api.query(keys::for_agreement(&agreement_id), move |remote| {
    let agreement_id = agreement_id.clone();
    async move { fetch_payments(&remote, &agreement_id).await }
  })
}

pub fn payment_invalidations(payment: &Payment) -> Vec<KeyFilter> {
  vec![
    KeyFilter::exact(keys::for_agreement(&payment.agreement_id)),
    KeyFilter::exact(agreements::keys::detail(&payment.agreement_id)),
    dashboard_filter(),
  ]
}

/// Record a payment received against an agreement.
pub fn record(api: &Api) -> Mutation<NewPayment, Payment> {
  api
    .mutation("Payment recorded", |remote, payment: NewPayment| async move {
      remote.insert(TABLE, &payment).await
    })
    .invalidates_with(payment_invalidations)
}

/// Build a completed payment, rejecting non-positive amounts before they
/// reach the backend.
pub fn new_payment(
  agreement_id: &str,
  amount: f64,
  payment_method: Option<String>,
) -> Result<NewPayment, String> {
  if !amount.is_finite() || amount <= 0.0 {
    return Err(format!("payment amount must be positive, got {}", amount));
  }
  Ok(NewPayment {
    agreement_id: agreement_id.to_string(),
    amount,
    payment_method,
    status: PaymentStatus::Completed,
  })
}

/// Sum of completed payments.
pub fn total_paid(payments: &[Payment]) -> f64 {
  payments
    .iter()
    .filter(|p| p.status == PaymentStatus::Completed)
    .map(|p| p.amount)
    .sum()
}
