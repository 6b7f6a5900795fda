//! Per-resource key builders, fetchers, data hooks and mutations.
//!
//! Every resource module follows the same layout:
//! - a `keys` module building the cache keys for its data
//! - a typed filter struct compiled into a [`Select`](crate::remote::Select)
//! - `fetch_*` functions over [`RemoteClient`]
//! - `*_query` constructors returning data hooks
//! - mutation constructors with the keys each write makes stale

use std::future::Future;

use crate::cache::{KeyFilter, QueryClient, QueryKey};
use crate::mutation::Mutation;
use crate::notify::Notifier;
use crate::query::Query;
use crate::remote::{RemoteClient, RemoteError};

pub mod agreements;
pub mod customers;
pub mod dashboard;
pub mod leads;
pub mod loyalty;
pub mod maintenance;
pub mod payments;
pub mod vehicles;

/// Everything a hook needs: the backend, the shared cache and the
/// notification channel.
#[derive(Clone)]
pub struct Api {
  pub remote: RemoteClient,
  pub cache: QueryClient,
  pub notifier: Notifier,
}

impl Api {
  pub fn new(remote: RemoteClient, cache: QueryClient, notifier: Notifier) -> Self {
    Self {
      remote,
      cache,
      notifier,
    }
  }

  /// Data hook for `key` whose fetcher gets its own handle to the backend.
  pub fn query<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Query<T>
  where
    T: Send + Sync + 'static,
    F: Fn(RemoteClient) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
  {
    let remote = self.remote.clone();
    Query::new(&self.cache, key, move || fetch(remote.clone()))
  }

  /// Mutation hook whose write gets its own handle to the backend.
  pub fn mutation<I, O, F, Fut>(&self, label: &str, write: F) -> Mutation<I, O>
  where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(RemoteClient, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, RemoteError>> + Send + 'static,
  {
    let remote = self.remote.clone();
    Mutation::new(&self.cache, &self.notifier, label, move |input| {
      write(remote.clone(), input)
    })
  }
}

/// Filter for every key under `["dashboard"]`.
pub(crate) fn dashboard_filter() -> KeyFilter {
  KeyFilter::prefix(dashboard::keys::all())
}

/// Filter for every cached search result.
pub(crate) fn search_filter() -> KeyFilter {
  KeyFilter::prefix(crate::search::keys::all())
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::cache::CacheOptions;
  use crate::notify::Notifications;

  /// An `Api` pointed at an unroutable backend; tests only exercise the cache.
  pub fn api() -> (Api, Notifications) {
    let remote = RemoteClient::with_credentials("http://127.0.0.1:9", "test-key", None).unwrap();
    let cache = QueryClient::new(CacheOptions {
      retry: 0,
      ..CacheOptions::default()
    });
    let (notifier, notifications) = Notifier::channel();
    (Api::new(remote, cache, notifier), notifications)
  }

  /// Seed `keys` with a value and return whether each one is stale afterwards.
  pub fn staleness(cache: &QueryClient, keys: &[QueryKey]) -> Vec<bool> {
    keys
      .iter()
      .map(|k| {
        cache
          .get::<u32>(k)
          .ok()
          .flatten()
          .map(|s| s.is_stale)
          .unwrap_or(true)
      })
      .collect()
  }

  pub fn seed(cache: &QueryClient, keys: &[QueryKey]) {
    for key in keys {
      cache.set(key, 0u32);
    }
  }
}
