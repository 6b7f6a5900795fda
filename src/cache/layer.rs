//! Query client that orchestrates caching, de-duplication and invalidation.

use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entry::{
  downcast, CacheEvent, CacheSnapshot, Entry, ErasedValue, FetchStatus, InFlight,
};
use super::error::QueryError;
use super::key::{KeyFilter, QueryKey};

/// Capacity of the event channel; slow observers resync on lag.
const EVENT_CAPACITY: usize = 256;

/// Tuning knobs for the query client.
#[derive(Debug, Clone)]
pub struct CacheOptions {
  /// How long a value is served without re-fetching
  pub stale_time: Duration,
  /// How many times a failed fetch is retried before giving up
  pub retry: u32,
  /// Delay before the first retry; doubles on each attempt
  pub retry_delay: Duration,
  /// Upper bound for the retry delay
  pub max_retry_delay: Duration,
}

impl Default for CacheOptions {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(30),
      retry: 3,
      retry_delay: Duration::from_secs(1),
      max_retry_delay: Duration::from_secs(30),
    }
  }
}

impl CacheOptions {
  fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    self
      .retry_delay
      .saturating_mul(factor)
      .min(self.max_retry_delay)
  }
}

struct Inner {
  entries: Mutex<HashMap<QueryKey, Entry>>,
  events: broadcast::Sender<CacheEvent>,
  options: CacheOptions,
  next_fetch_id: AtomicU64,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
    // Entries are only ever swapped whole, so a poisoned map is still consistent.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, event: CacheEvent) {
    // No receivers is fine: nobody is observing.
    let _ = self.events.send(event);
  }

  /// Record the outcome of a fetch. The last value to land wins. A failure
  /// from a detached fetch is dropped once a newer fetch has started or landed.
  fn complete(&self, key: &QueryKey, fetch_id: u64, result: &Result<ErasedValue, QueryError>) {
    let updated = {
      let mut entries = self.lock();
      let entry = entries.entry(key.clone()).or_default();

      let current = entry.in_flight.as_ref().map(|f| f.id) == Some(fetch_id);
      if current {
        entry.in_flight = None;
      }
      let superseded =
        !current && (entry.in_flight.is_some() || entry.status != FetchStatus::Fetching);

      match result {
        Ok(value) => {
          entry.value = Some(Arc::clone(value));
          entry.updated_at = Some(Instant::now());
          entry.error = None;
          if entry.in_flight.is_none() {
            entry.status = FetchStatus::Success;
          }
          // A fetch detached by invalidation may carry pre-invalidation data.
          entry.invalidated = !current;
          true
        }
        Err(err) if superseded => {
          debug!(key = %key, fetch_id, error = %err, "dropping failure from detached fetch");
          false
        }
        Err(err) => {
          entry.error = Some(err.clone());
          entry.status = FetchStatus::Error;
          false
        }
      }
    };

    if updated {
      self.emit(CacheEvent::Updated(key.clone()));
    }
  }
}

/// Process-wide query cache.
///
/// Cheap to clone; every clone shares the same entries. Construct one at
/// start-up and hand clones to whatever needs to read or invalidate data.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  pub fn new(options: CacheOptions) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      inner: Arc::new(Inner {
        entries: Mutex::new(HashMap::new()),
        events,
        options,
        next_fetch_id: AtomicU64::new(1),
      }),
    }
  }

  pub fn options(&self) -> &CacheOptions {
    &self.inner.options
  }

  /// Subscribe to cache change events.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.inner.events.subscribe()
  }

  /// Read the current entry for a key without triggering a fetch.
  pub fn get<T: Send + Sync + 'static>(
    &self,
    key: &QueryKey,
  ) -> Result<Option<CacheSnapshot<T>>, QueryError> {
    let entries = self.inner.lock();
    let Some(entry) = entries.get(key) else {
      return Ok(None);
    };

    let data = match &entry.value {
      Some(value) => Some(downcast::<T>(key, Arc::clone(value))?),
      None => None,
    };

    Ok(Some(CacheSnapshot {
      data,
      status: entry.status,
      error: entry.error.clone(),
      updated_at: entry.updated_at,
      is_stale: entry.is_stale(self.inner.options.stale_time),
    }))
  }

  /// Store a value directly, marking the entry fresh.
  pub fn set<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T) {
    {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();
      entry.value = Some(Arc::new(value));
      entry.updated_at = Some(Instant::now());
      entry.error = None;
      entry.invalidated = false;
      if entry.in_flight.is_none() {
        entry.status = FetchStatus::Success;
      }
    }
    debug!(key = %key, "cache set");
    self.inner.emit(CacheEvent::Updated(key.clone()));
  }

  /// Mark every matching entry stale and notify observers.
  ///
  /// In-flight requests for matching keys are detached rather than cancelled:
  /// they still complete and write their value, but that value stays stale so
  /// the next read goes back to the network. Returns how many entries matched.
  pub fn invalidate(&self, filter: &KeyFilter) -> usize {
    let keys: Vec<QueryKey> = {
      let mut entries = self.inner.lock();
      entries
        .iter_mut()
        .filter(|(key, _)| filter.matches(key))
        .map(|(key, entry)| {
          entry.invalidated = true;
          entry.in_flight = None;
          key.clone()
        })
        .collect()
    };

    debug!(filter = %filter, matched = keys.len(), "cache invalidate");
    let matched = keys.len();
    for key in keys {
      self.inner.emit(CacheEvent::Invalidated(key));
    }
    matched
  }

  /// Drop a single entry.
  pub fn remove(&self, key: &QueryKey) -> bool {
    let removed = self.inner.lock().remove(key).is_some();
    if removed {
      self.inner.emit(CacheEvent::Removed(key.clone()));
    }
    removed
  }

  /// Drop every entry.
  pub fn clear(&self) {
    self.inner.lock().clear();
    self.inner.emit(CacheEvent::Cleared);
  }

  /// Number of entries currently held.
  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Fetch a key with a cache-first strategy.
  ///
  /// 1. Fresh cached value: return it without calling `fetcher`
  /// 2. A fetch for this key already in flight: wait on that one
  /// 3. Otherwise start a fetch (with retries) and store its result
  ///
  /// On failure the previously cached value is left in place.
  pub async fn fetch_query<T, F, Fut, E>(&self, key: &QueryKey, fetcher: F) -> Result<Arc<T>, QueryError>
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<QueryError> + Send + 'static,
  {
    let shared = {
      let mut entries = self.inner.lock();
      let entry = entries.entry(key.clone()).or_default();

      if let Some(value) = entry.fresh_value(self.inner.options.stale_time) {
        debug!(key = %key, "cache hit");
        return downcast(key, value);
      }

      match &entry.in_flight {
        Some(in_flight) => {
          debug!(key = %key, fetch_id = in_flight.id, "joining in-flight fetch");
          in_flight.future.clone()
        }
        None => {
          let in_flight = self.start_fetch(key.clone(), fetcher);
          debug!(key = %key, fetch_id = in_flight.id, "cache miss, fetching");
          let future = in_flight.future.clone();
          entry.in_flight = Some(in_flight);
          entry.status = FetchStatus::Fetching;
          future
        }
      }
    };

    let value = shared.await?;
    downcast(key, value)
  }

  /// Spawn the fetch so it runs to completion even if every caller goes away.
  fn start_fetch<T, F, Fut, E>(&self, key: QueryKey, fetcher: F) -> InFlight
  where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<QueryError> + Send + 'static,
  {
    let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
    let inner = Arc::clone(&self.inner);

    let future = async move {
      let result = fetch_with_retry(&inner.options, &key, &fetcher)
        .await
        .map(|value| Arc::new(value) as ErasedValue);
      inner.complete(&key, id, &result);
      result
    }
    .boxed()
    .shared();

    tokio::spawn(future.clone());
    InFlight { id, future }
  }
}

impl Default for QueryClient {
  fn default() -> Self {
    Self::new(CacheOptions::default())
  }
}

async fn fetch_with_retry<T, F, Fut, E>(
  options: &CacheOptions,
  key: &QueryKey,
  fetcher: &F,
) -> Result<T, QueryError>
where
  F: Fn() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: Into<QueryError>,
{
  let mut attempt = 0;
  loop {
    match fetcher().await {
      Ok(value) => return Ok(value),
      Err(err) => {
        let err: QueryError = err.into();
        if attempt >= options.retry || !err.is_retryable() {
          warn!(key = %key, attempts = attempt + 1, error = %err, "fetch failed");
          return Err(err);
        }
        let delay = options.backoff(attempt);
        warn!(key = %key, attempt = attempt + 1, ?delay, error = %err, "fetch failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicU32;

  fn no_retry() -> CacheOptions {
    CacheOptions {
      retry: 0,
      ..CacheOptions::default()
    }
  }

  fn counting_fetcher(
    counter: Arc<AtomicU32>,
    delay: Duration,
  ) -> impl Fn() -> BoxedFetch<u32> + Send + Sync + 'static {
    move || {
      let counter = counter.clone();
      Box::pin(async move {
        tokio::time::sleep(delay).await;
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
      })
    }
  }

  type BoxedFetch<T> = futures::future::BoxFuture<'static, Result<T, QueryError>>;

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let client = QueryClient::new(no_retry());
    let counter = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("vehicles").with("list");

    let (a, b, c) = tokio::join!(
      client.fetch_query(&key, counting_fetcher(counter.clone(), Duration::from_millis(20))),
      client.fetch_query(&key, counting_fetcher(counter.clone(), Duration::from_millis(20))),
      client.fetch_query(&key, counting_fetcher(counter.clone(), Duration::from_millis(20))),
    );

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(*a.unwrap(), 1);
    assert_eq!(*b.unwrap(), 1);
    assert_eq!(*c.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_fresh_value_served_without_fetch() {
    let client = QueryClient::new(no_retry());
    let counter = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("customers");

    let first = client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();
    let second = client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(*first, 1);
    assert_eq!(*second, 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_refetch_after_stale_time() {
    let client = QueryClient::new(CacheOptions {
      stale_time: Duration::from_secs(30),
      ..no_retry()
    });
    let counter = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("customers");

    client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();

    tokio::time::advance(Duration::from_secs(10)).await;
    let inside = client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(*inside, 1);

    tokio::time::advance(Duration::from_secs(25)).await;
    let after = client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(*after, 2);
  }

  #[tokio::test]
  async fn test_invalidate_forces_refetch() {
    let client = QueryClient::new(no_retry());
    let counter = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("leads").with("detail").with("l-1");

    client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(client.invalidate(&KeyFilter::exact(key.clone())), 1);
    let snapshot = client.get::<u32>(&key).unwrap().unwrap();
    assert!(snapshot.is_stale);
    assert_eq!(snapshot.data.as_deref(), Some(&1));

    let value = client
      .fetch_query(&key, counting_fetcher(counter.clone(), Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(*value, 2);
  }

  #[tokio::test]
  async fn test_prefix_invalidation_only_touches_prefix() {
    let client = QueryClient::new(no_retry());
    let list = QueryKey::new("leads").with("list").with("new");
    let detail = QueryKey::new("leads").with("detail").with("l-1");
    let other = QueryKey::new("customers").with("list");

    client.set(&list, 1u32);
    client.set(&detail, 2u32);
    client.set(&other, 3u32);

    let matched = client.invalidate(&KeyFilter::prefix(QueryKey::new("leads")));
    assert_eq!(matched, 2);

    assert!(client.get::<u32>(&list).unwrap().unwrap().is_stale);
    assert!(client.get::<u32>(&detail).unwrap().unwrap().is_stale);
    assert!(!client.get::<u32>(&other).unwrap().unwrap().is_stale);
  }

  #[tokio::test]
  async fn test_failed_fetch_keeps_last_good_value() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("payments").with("a-1");

    client.set(&key, vec![10u32, 20]);
    client.invalidate(&KeyFilter::exact(key.clone()));

    let result = client
      .fetch_query(&key, || async { Err::<Vec<u32>, _>("backend unavailable") })
      .await;
    assert_eq!(result, Err(QueryError::Fetch("backend unavailable".to_string())));

    let snapshot = client.get::<Vec<u32>>(&key).unwrap().unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&vec![10, 20]));
    assert_eq!(snapshot.status, FetchStatus::Error);
    assert!(snapshot.error.is_some());
  }

  #[tokio::test(start_paused = true)]
  async fn test_retries_fixed_number_of_times() {
    let client = QueryClient::new(CacheOptions {
      retry: 2,
      ..CacheOptions::default()
    });
    let attempts = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("vehicle_types");

    let counter = attempts.clone();
    let result = client
      .fetch_query(&key, move || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err::<u32, _>("timeout")
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_recovers() {
    let client = QueryClient::new(CacheOptions::default());
    let attempts = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("vehicle_types");

    let counter = attempts.clone();
    let result = client
      .fetch_query(&key, move || {
        let counter = counter.clone();
        async move {
          if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err("flaky")
          } else {
            Ok(7u32)
          }
        }
      })
      .await;

    assert_eq!(*result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejected_fetch_not_retried() {
    let client = QueryClient::new(CacheOptions::default());
    let attempts = Arc::new(AtomicU32::new(0));
    let key = QueryKey::new("leads").with("detail").with("missing");

    let counter = attempts.clone();
    let result = client
      .fetch_query(&key, move || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Err::<u32, _>(QueryError::Rejected("leads row not found".to_string()))
        }
      })
      .await;

    assert_eq!(result, Err(QueryError::Rejected("leads row not found".to_string())));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_type_mismatch() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("dashboard");
    client.set(&key, 1u32);

    let err = client.get::<String>(&key).unwrap_err();
    assert!(matches!(err, QueryError::TypeMismatch { .. }));
  }

  #[tokio::test]
  async fn test_detached_fetch_lands_stale() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("leads").with("list");
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));
    let started = Arc::new(tokio::sync::Notify::new());

    let slow_client = client.clone();
    let slow_key = key.clone();
    let slow_started = started.clone();
    let slow = tokio::spawn(async move {
      slow_client
        .fetch_query(&slow_key, move || {
          let rx = release_rx.lock().unwrap().take();
          let started = slow_started.clone();
          async move {
            started.notify_one();
            if let Some(rx) = rx {
              let _ = rx.await;
            }
            Ok::<_, QueryError>("before write")
          }
        })
        .await
    });

    started.notified().await;
    client.invalidate(&KeyFilter::prefix(QueryKey::new("leads")));
    release_tx.send(()).unwrap();
    assert_eq!(*slow.await.unwrap().unwrap(), "before write");

    let snapshot = client.get::<&str>(&key).unwrap().unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&"before write"));
    assert!(snapshot.is_stale);

    let value = client
      .fetch_query(&key, || async { Ok::<_, QueryError>("after write") })
      .await
      .unwrap();
    assert_eq!(*value, "after write");
  }

  #[tokio::test]
  async fn test_last_landing_fetch_wins() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("agreements").with("detail").with("a-1");

    let slow_client = client.clone();
    let slow_key = key.clone();
    let slow = tokio::spawn(async move {
      slow_client
        .fetch_query(&slow_key, || async {
          tokio::time::sleep(Duration::from_millis(60)).await;
          Ok::<_, QueryError>(1u32)
        })
        .await
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    client.invalidate(&KeyFilter::exact(key.clone()));
    let fast = client
      .fetch_query(&key, || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<_, QueryError>(2u32)
      })
      .await
      .unwrap();
    assert_eq!(*fast, 2);

    slow.await.unwrap().unwrap();
    let snapshot = client.get::<u32>(&key).unwrap().unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&1));
    assert_eq!(snapshot.status, FetchStatus::Success);
    // The older request landed last, so it is kept but not trusted.
    assert!(snapshot.is_stale);
  }

  #[tokio::test]
  async fn test_detached_failure_leaves_newer_value_alone() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("vehicles").with("detail").with("v-1");

    let slow_client = client.clone();
    let slow_key = key.clone();
    let slow = tokio::spawn(async move {
      slow_client
        .fetch_query(&slow_key, || async {
          tokio::time::sleep(Duration::from_millis(60)).await;
          Err::<u32, _>("old request timed out")
        })
        .await
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    client.invalidate(&KeyFilter::exact(key.clone()));
    let fast = client
      .fetch_query(&key, || async { Ok::<_, QueryError>(2u32) })
      .await
      .unwrap();
    assert_eq!(*fast, 2);

    assert!(slow.await.unwrap().is_err());
    let snapshot = client.get::<u32>(&key).unwrap().unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&2));
    assert_eq!(snapshot.status, FetchStatus::Success);
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.is_stale);
  }

  #[tokio::test]
  async fn test_detached_success_keeps_newer_fetch_pending() {
    let client = QueryClient::new(no_retry());
    let key = QueryKey::new("maintenance").with("list");

    let slow_client = client.clone();
    let slow_key = key.clone();
    let slow = tokio::spawn(async move {
      slow_client
        .fetch_query(&slow_key, || async {
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok::<_, QueryError>(1u32)
        })
        .await
    });

    tokio::time::sleep(Duration::from_millis(5)).await;
    client.invalidate(&KeyFilter::exact(key.clone()));
    let newer_client = client.clone();
    let newer_key = key.clone();
    let newer = tokio::spawn(async move {
      newer_client
        .fetch_query(&newer_key, || async {
          tokio::time::sleep(Duration::from_millis(80)).await;
          Ok::<_, QueryError>(2u32)
        })
        .await
    });

    slow.await.unwrap().unwrap();
    let snapshot = client.get::<u32>(&key).unwrap().unwrap();
    assert_eq!(snapshot.data.as_deref(), Some(&1));
    assert_eq!(snapshot.status, FetchStatus::Fetching);
    assert!(snapshot.is_stale);

    assert_eq!(*newer.await.unwrap().unwrap(), 2);
    let snapshot = client.get::<u32>(&key).unwrap().unwrap();
    assert_eq!(snapshot.status, FetchStatus::Success);
    assert!(!snapshot.is_stale);
  }

  #[tokio::test]
  async fn test_events_are_broadcast() {
    let client = QueryClient::new(no_retry());
    let mut events = client.subscribe();
    let key = QueryKey::new("loyalty").with("c-1");

    client.set(&key, 10i64);
    client.invalidate(&KeyFilter::exact(key.clone()));
    client.remove(&key);
    client.clear();

    assert_eq!(events.recv().await.unwrap(), CacheEvent::Updated(key.clone()));
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Invalidated(key.clone()));
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Removed(key));
    assert_eq!(events.recv().await.unwrap(), CacheEvent::Cleared);
    assert!(client.is_empty());
  }

  #[test]
  fn test_backoff_caps() {
    let options = CacheOptions::default();
    assert_eq!(options.backoff(0), Duration::from_secs(1));
    assert_eq!(options.backoff(1), Duration::from_secs(2));
    assert_eq!(options.backoff(2), Duration::from_secs(4));
    assert_eq!(options.backoff(10), Duration::from_secs(30));
  }
}
