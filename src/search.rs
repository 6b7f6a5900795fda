//! Global search across vehicles, customers and agreements.
//!
//! One query fans out to three concurrent lookups. A lookup that fails does
//! not sink the others: its category is reported in
//! [`SearchResults::failures`] and the user gets a single error notice.

use futures::future::BoxFuture;
use futures::{join, FutureExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{QueryClient, QueryError};
use crate::config::SearchConfig;
use crate::notify::Notifier;
use crate::remote::filter::sanitize_term;
use crate::remote::types::{Agreement, Customer, Vehicle};
use crate::remote::{Filter, RemoteClient, Select};

pub mod keys {
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("search")
  }

  pub fn results(normalized: &str, limit: usize) -> QueryKey {
    all().with(normalized).with(limit)
  }
}

/// Backend for the three lookups.
pub trait SearchSource: Send + Sync {
  fn vehicles<'a>(&'a self, term: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Vehicle>, QueryError>>;

  fn customers<'a>(&'a self, term: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Customer>, QueryError>>;

  fn agreements<'a>(
    &'a self,
    term: &'a str,
    limit: usize,
  ) -> BoxFuture<'a, Result<Vec<Agreement>, QueryError>>;
}

impl SearchSource for RemoteClient {
  fn vehicles<'a>(&'a self, term: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Vehicle>, QueryError>> {
    let select = Select::from("vehicles")
      .filter(Filter::or(vec![
        Filter::contains("make", term),
        Filter::contains("model", term),
        Filter::contains("license_plate", term),
      ]))
      .limit(limit);
    async move { self.select(&select).await.map_err(QueryError::from) }.boxed()
  }

  fn customers<'a>(&'a self, term: &'a str, limit: usize) -> BoxFuture<'a, Result<Vec<Customer>, QueryError>> {
    let select = Select::from("profiles")
      .filter(Filter::eq("role", "customer"))
      .filter(Filter::or(vec![
        Filter::contains("full_name", term),
        Filter::contains("email", term),
        Filter::contains("phone", term),
      ]))
      .limit(limit);
    async move { self.select(&select).await.map_err(QueryError::from) }.boxed()
  }

  fn agreements<'a>(
    &'a self,
    term: &'a str,
    limit: usize,
  ) -> BoxFuture<'a, Result<Vec<Agreement>, QueryError>> {
    let select = Select::from("agreements")
      .filter(Filter::contains("agreement_number", term))
      .limit(limit);
    async move { self.select(&select).await.map_err(QueryError::from) }.boxed()
  }
}

/// A lookup that failed during a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFailure {
  pub category: &'static str,
  pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
  pub vehicles: Vec<Vehicle>,
  pub customers: Vec<Customer>,
  pub agreements: Vec<Agreement>,
  pub failures: Vec<SearchFailure>,
}

impl SearchResults {
  pub fn is_empty(&self) -> bool {
    self.vehicles.is_empty() && self.customers.is_empty() && self.agreements.is_empty()
  }

  /// Every lookup failed.
  pub fn is_total_failure(&self) -> bool {
    self.failures.len() == 3
  }
}

/// Runs searches and caches complete result sets.
pub struct SearchAggregator {
  source: Arc<dyn SearchSource>,
  cache: QueryClient,
  notifier: Notifier,
  min_query_len: usize,
  limit: usize,
}

impl SearchAggregator {
  pub fn new(
    source: Arc<dyn SearchSource>,
    cache: &QueryClient,
    notifier: &Notifier,
    config: &SearchConfig,
  ) -> Self {
    Self {
      source,
      cache: cache.clone(),
      notifier: notifier.clone(),
      min_query_len: config.min_query_len,
      limit: config.limit,
    }
  }

  /// Search all three categories for `query`.
  ///
  /// Queries shorter than the minimum length return empty results without
  /// touching the backend.
  pub async fn search(&self, query: &str) -> SearchResults {
    let term = sanitize_term(query);
    if term.chars().count() < self.min_query_len {
      return SearchResults::default();
    }

    let key = keys::results(&term.to_lowercase(), self.limit);
    let source = Arc::clone(&self.source);
    let limit = self.limit;
    let fetched = self
      .cache
      .fetch_query(&key, move || {
        let source = Arc::clone(&source);
        let term = term.clone();
        async move { Ok::<_, QueryError>(fan_out(source.as_ref(), &term, limit).await) }
      })
      .await;

    let results = match fetched {
      Ok(results) => (*results).clone(),
      Err(err) => {
        warn!(key = %key, error = %err, "search cache read failed");
        return SearchResults::default();
      }
    };

    if !results.failures.is_empty() {
      // Only complete result sets stay cached
      self.cache.remove(&key);
      let summary: Vec<String> = results
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.category, f.message))
        .collect();
      warn!(key = %key, failed = results.failures.len(), "search lookups failed");
      self.notifier.error("Search failed", summary.join("; "));
    }

    results
  }
}

/// Run the three lookups concurrently and merge them.
async fn fan_out(source: &dyn SearchSource, term: &str, limit: usize) -> SearchResults {
  let (vehicles, customers, agreements) = join!(
    source.vehicles(term, limit),
    source.customers(term, limit),
    source.agreements(term, limit),
  );
  debug!(term, "search fan-out finished");

  let mut results = SearchResults::default();
  results.vehicles = collect("vehicles", vehicles, limit, &mut results.failures);
  results.customers = collect("customers", customers, limit, &mut results.failures);
  results.agreements = collect("agreements", agreements, limit, &mut results.failures);
  results
}

fn collect<T>(
  category: &'static str,
  result: Result<Vec<T>, QueryError>,
  limit: usize,
  failures: &mut Vec<SearchFailure>,
) -> Vec<T> {
  match result {
    Ok(mut rows) => {
      rows.truncate(limit);
      rows
    }
    Err(err) => {
      failures.push(SearchFailure {
        category,
        message: err.to_string(),
      });
      Vec::new()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheOptions, KeyFilter};
  use crate::notify::Level;
  use crate::remote::types::{AgreementStatus, CustomerStatus, VehicleStatus};
  use chrono::NaiveDate;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  /// Returns `rows` results per category and counts every lookup.
  #[derive(Default)]
  struct FakeSource {
    rows: usize,
    failing: Vec<&'static str>,
    delay: Duration,
    calls: AtomicUsize,
  }

  impl FakeSource {
    fn lookup<T>(&self, category: &'static str, make: impl Fn(usize) -> T) -> Result<Vec<T>, QueryError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.failing.contains(&category) {
        return Err(QueryError::Fetch(format!("{} timed out", category)));
      }
      Ok((0..self.rows).map(make).collect())
    }
  }

  impl SearchSource for FakeSource {
    fn vehicles<'a>(&'a self, _: &'a str, _: usize) -> BoxFuture<'a, Result<Vec<Vehicle>, QueryError>> {
      let result = self.lookup("vehicles", |i| Vehicle {
        id: format!("v-{}", i),
        make: "Toyota".to_string(),
        model: "Corolla".to_string(),
        year: None,
        license_plate: format!("CO-{}", i),
        vehicle_type_id: None,
        daily_rate: None,
        status: VehicleStatus::Available,
      });
      let delay = self.delay;
      async move {
        tokio::time::sleep(delay).await;
        result
      }
      .boxed()
    }

    fn customers<'a>(&'a self, _: &'a str, _: usize) -> BoxFuture<'a, Result<Vec<Customer>, QueryError>> {
      let result = self.lookup("customers", |i| Customer {
        id: format!("c-{}", i),
        full_name: "Corey Hale".to_string(),
        email: None,
        phone: None,
        status: CustomerStatus::Active,
        role: Some("customer".to_string()),
        created_at: None,
      });
      let delay = self.delay;
      async move {
        tokio::time::sleep(delay).await;
        result
      }
      .boxed()
    }

    fn agreements<'a>(&'a self, _: &'a str, _: usize) -> BoxFuture<'a, Result<Vec<Agreement>, QueryError>> {
      let result = self.lookup("agreements", |i| Agreement {
        id: format!("a-{}", i),
        agreement_number: Some(format!("CO-{}", i)),
        customer_id: "c-1".to_string(),
        vehicle_id: "v-1".to_string(),
        status: AgreementStatus::Active,
        rent_amount: 100.0,
        total_amount: None,
        start_date: NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
        end_date: None,
        created_at: None,
      });
      let delay = self.delay;
      async move {
        tokio::time::sleep(delay).await;
        result
      }
      .boxed()
    }
  }

  fn aggregator(source: Arc<FakeSource>) -> (SearchAggregator, crate::notify::Notifications, QueryClient) {
    let cache = QueryClient::new(CacheOptions::default());
    let (notifier, notifications) = Notifier::channel();
    let aggregator = SearchAggregator::new(source, &cache, &notifier, &SearchConfig::default());
    (aggregator, notifications, cache)
  }

  #[tokio::test]
  async fn test_short_query_makes_no_calls() {
    let source = Arc::new(FakeSource {
      rows: 3,
      ..FakeSource::default()
    });
    let (aggregator, _notifications, _cache) = aggregator(source.clone());

    for query in ["", "c", "  c  ", "*(", "c*"] {
      let results = aggregator.search(query).await;
      assert!(results.is_empty());
      assert!(results.failures.is_empty());
    }
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_results_capped_per_category() {
    let source = Arc::new(FakeSource {
      rows: 12,
      ..FakeSource::default()
    });
    let (aggregator, _notifications, _cache) = aggregator(source.clone());

    let results = aggregator.search("co").await;
    assert_eq!(results.vehicles.len(), 5);
    assert_eq!(results.customers.len(), 5);
    assert_eq!(results.agreements.len(), 5);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_partial_failure_keeps_other_categories() {
    let source = Arc::new(FakeSource {
      rows: 2,
      failing: vec!["customers"],
      ..FakeSource::default()
    });
    let (aggregator, mut notifications, cache) = aggregator(source);

    let results = aggregator.search("Corolla").await;
    assert_eq!(results.vehicles.len(), 2);
    assert!(results.customers.is_empty());
    assert_eq!(results.agreements.len(), 2);
    assert_eq!(
      results.failures,
      vec![SearchFailure {
        category: "customers",
        message: "customers timed out".to_string(),
      }]
    );
    assert!(!results.is_total_failure());

    let drained = notifications.drain();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].level, Level::Error);

    // Partial results are not cached
    assert!(cache
      .get::<SearchResults>(&keys::results("corolla", 5))
      .unwrap()
      .is_none());
  }

  #[tokio::test]
  async fn test_total_failure() {
    let source = Arc::new(FakeSource {
      rows: 2,
      failing: vec!["vehicles", "customers", "agreements"],
      ..FakeSource::default()
    });
    let (aggregator, mut notifications, _cache) = aggregator(source);

    let results = aggregator.search("corolla").await;
    assert!(results.is_empty());
    assert!(results.is_total_failure());
    assert_eq!(notifications.drain().len(), 1);
  }

  #[tokio::test]
  async fn test_repeat_query_served_from_cache_until_invalidated() {
    let source = Arc::new(FakeSource {
      rows: 1,
      ..FakeSource::default()
    });
    let (aggregator, _notifications, cache) = aggregator(source.clone());

    aggregator.search("Corolla").await;
    aggregator.search("  corolla ").await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    cache.invalidate(&KeyFilter::prefix(keys::all()));
    aggregator.search("corolla").await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 6);
  }

  #[tokio::test]
  async fn test_concurrent_identical_searches_share_lookups() {
    let source = Arc::new(FakeSource {
      rows: 2,
      delay: Duration::from_millis(20),
      ..FakeSource::default()
    });
    let (aggregator, _notifications, _cache) = aggregator(source.clone());

    let (first, second) = tokio::join!(aggregator.search("corolla"), aggregator.search("Corolla"));
    assert_eq!(first.vehicles.len(), 2);
    assert_eq!(second.vehicles.len(), 2);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);
  }
}
