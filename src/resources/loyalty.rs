use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::api_types::AwardPointsArgs;
use crate::remote::types::LoyaltyAccount;
use crate::remote::{Filter, RemoteClient, RemoteError, Select};

use super::Api;

const TABLE: &str = "loyalty_accounts";
const AWARD_FUNCTION: &str = "award_loyalty_points";

pub mod keys {
  use crate::cache::QueryKey;

  pub fn account(customer_id: &str) -> QueryKey {
    QueryKey::new("loyalty").with(customer_id)
  }
}

/// Fetch a customer's loyalty account; customers who never earned points
/// get an empty account.
pub async fn fetch_account(
  remote: &RemoteClient,
  customer_id: &str,
) -> Result<LoyaltyAccount, RemoteError> {
  let select = Select::from(TABLE).filter(Filter::eq("customer_id", customer_id));
  match remote.select_one(&select).await {
    Err(RemoteError::NotFound { .. }) => Ok(LoyaltyAccount {
      customer_id: customer_id.to_string(),
      points: 0,
      tier: None,
    }),
    other => other,
  }
}

pub fn account_query(api: &Api, customer_id: &str) -> Query<LoyaltyAccount> {
  let customer_id = customer_id.to_string();
  api.query(keys::account(&customer_id), move |remote| {
    let customer_id = customer_id.clone();
    async move { fetch_account(&remote, &customer_id).await }
  })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
  pub customer_id: String,
  pub points: i64,
  pub reason: String,
}

/// Award points through the `award_loyalty_points` database function. The
/// function returns the new balance.
pub fn award_points(api: &Api) -> Mutation<Award, Award> {
  api
    .mutation("Loyalty points awarded", |remote, award: Award| async move {
      let args = AwardPointsArgs {
        p_customer_id: &award.customer_id,
        p_points: award.points,
        p_reason: &award.reason,
      };
      let _balance: serde_json::Value = remote.rpc(AWARD_FUNCTION, &args).await?;
      Ok::<_, RemoteError>(award)
    })
    .invalidates_with(|award: &Award| vec![KeyFilter::exact(keys::account(&award.customer_id))])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resources::testing::{api, seed, staleness};

  #[tokio::test]
  async fn test_award_invalidates_only_that_customer() {
    let (api, _notifications) = api();
    let keys = [keys::account("c-1"), keys::account("c-2")];
    seed(&api.cache, &keys);

    let mutation = award_points(&api);
    let award = Award {
      customer_id: "c-1".to_string(),
      points: 250,
      reason: "Long rental".to_string(),
    };
    for filter in mutation.dependent_filters(&award) {
      api.cache.invalidate(&filter);
    }
    assert_eq!(staleness(&api.cache, &keys), vec![true, false]);
  }

  #[test]
  fn test_award_args_body() {
    let args = AwardPointsArgs {
      p_customer_id: "c-1",
      p_points: 100,
      p_reason: "Referral",
    };
    assert_eq!(
      serde_json::to_value(args).unwrap(),
      serde_json::json!({ "p_customer_id": "c-1", "p_points": 100, "p_reason": "Referral" })
    );
  }
}
