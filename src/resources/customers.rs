use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::api_types::{ProvisionUserRequest, ProvisionUserResponse};
use crate::remote::types::{Customer, CustomerStatus, StatusPatch};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{search_filter, Api};

const TABLE: &str = "profiles";
const PROVISION_FUNCTION: &str = "create-user";

pub mod keys {
  use super::CustomerFilters;
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("customers")
  }

  pub fn list(filters: &CustomerFilters) -> QueryKey {
    all()
      .with("list")
      .with(filters.status.map(|s| s.as_str()))
      .with(filters.name.as_deref().map(str::to_lowercase))
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFilters {
  pub status: Option<CustomerStatus>,
  /// Substring of the customer's name
  pub name: Option<String>,
}

impl CustomerFilters {
  pub fn select(&self) -> Select {
    Select::from(TABLE)
      .filter(Filter::eq("role", "customer"))
      .filter_opt(self.status, |s| Filter::eq("status", s))
      .filter_opt(self.name.as_deref(), |n| Filter::contains("full_name", n))
      .order_by("full_name", Order::Asc)
  }
}

pub async fn fetch_customers(
  remote: &RemoteClient,
  filters: &CustomerFilters,
) -> Result<Vec<Customer>, RemoteError> {
  remote.select(&filters.select()).await
}

pub async fn fetch_customer(remote: &RemoteClient, id: &str) -> Result<Customer, RemoteError> {
  remote
    .select_one(&Select::from(TABLE).filter(Filter::eq("id", id)))
    .await
}

pub fn list_query(api: &Api, filters: CustomerFilters) -> Query<Vec<Customer>> {
  api.query(keys::list(&filters), move |remote| {
    let filters = filters.clone();
    async move { fetch_customers(&remote, &filters).await }
  })
}

pub fn detail_query(api: &Api, id: &str) -> Query<Customer> {
  let id = id.to_string();
  api.query(keys::detail(&id), move |remote| {
    let id = id.clone();
    async move { fetch_customer(&remote, &id).await }
  })
}

/// Customer names and statuses show up in search results.
pub fn status_invalidations() -> Vec<KeyFilter> {
  vec![KeyFilter::prefix(keys::all()), search_filter()]
}

pub fn update_status(api: &Api) -> Mutation<(String, CustomerStatus), Customer> {
  api
    .mutation(
      "Customer status updated",
      |remote, (id, status): (String, CustomerStatus)| async move {
        remote
          .update_by_id(TABLE, &id, &StatusPatch { status })
          .await
      },
    )
    .invalidates_all(status_invalidations())
}

/// Details for a customer account created by staff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
  pub email: String,
  pub full_name: String,
}

/// Create a customer login through the `create-user` edge function.
pub fn provision(api: &Api) -> Mutation<NewCustomer, ProvisionUserResponse> {
  api
    .mutation("Customer created", |remote, customer: NewCustomer| async move {
      let request = ProvisionUserRequest {
        email: customer.email.trim(),
        full_name: customer.full_name.trim(),
        role: "customer",
      };
      remote.invoke(PROVISION_FUNCTION, &request).await
    })
    .invalidates(KeyFilter::prefix(keys::all()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::testing::{api, seed, staleness};
  use crate::search;

  #[test]
  fn test_name_filter_is_case_insensitive_key() {
    let upper = keys::list(&CustomerFilters {
      status: None,
      name: Some("ADA".to_string()),
    });
    let lower = keys::list(&CustomerFilters {
      status: None,
      name: Some("ada".to_string()),
    });
    assert_eq!(upper, lower);
  }

  #[test]
  fn test_select_scopes_to_customers() {
    let pairs = CustomerFilters {
      status: Some(CustomerStatus::Blacklisted),
      name: Some("Lovelace".to_string()),
    }
    .select()
    .query_pairs();

    assert!(pairs.contains(&("role".to_string(), "eq.customer".to_string())));
    assert!(pairs.contains(&("status".to_string(), "eq.blacklisted".to_string())));
    assert!(pairs.contains(&("full_name".to_string(), "ilike.*Lovelace*".to_string())));
  }

  #[tokio::test]
  async fn test_status_update_clears_search_results() {
    let (api, _notifications) = api();
    let keys = [
      keys::list(&CustomerFilters::default()),
      keys::detail("c-1"),
      search::keys::results("ada", 5),
      crate::resources::vehicles::keys::all(),
    ];
    seed(&api.cache, &keys);

    for filter in status_invalidations() {
      api.cache.invalidate(&filter);
    }
    assert_eq!(staleness(&api.cache, &keys), vec![true, true, true, false]);
  }
}
