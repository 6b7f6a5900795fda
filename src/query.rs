//! Data hooks: observe one cache key and keep its latest value at hand.
//!
//! A `Query<T>` pairs a cache key with the function that loads it and
//! remembers whether the last load is running, done or failed.
//! Reads go through the shared [`QueryClient`], so a fresh cached value is
//! served without a network call and concurrent readers share one request.
//!
//! # Example
//!
//! ```ignore
//! let remote = remote.clone();
//! let mut query = Query::new(&cache, leads::keys::detail(&id), move || {
//!     let remote = remote.clone();
//!     let id = id.clone();
//!     async move { leads::fetch_lead(&remote, &id).await }
//! });
//!
//! query.fetch();
//! loop {
//!     if query.poll() {
//!         redraw(&query);
//!     }
//! }
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::cache::{CacheEvent, KeyFilter, QueryClient, QueryError, QueryKey};

/// Status of a data hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing requested yet
  Idle,
  /// A fetch is pending
  Loading,
  /// Last fetch succeeded
  Success,
  /// Last fetch failed
  Error,
}

/// Builds a fresh fetch future each time the key needs loading
type FetcherFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, QueryError>> + Send + Sync>;

type FetchResult<T> = Result<Arc<T>, QueryError>;

/// Async query for one cache key.
///
/// Holds the last good value, which survives a failed re-fetch, and
/// re-fetches on its own when the key is invalidated elsewhere.
///
/// Dropping a query only drops interest: a request it started still runs to
/// completion and lands in the cache.
pub struct Query<T> {
  client: QueryClient,
  key: QueryKey,
  fetcher: FetcherFn<T>,
  status: QueryStatus,
  data: Option<Arc<T>>,
  error: Option<QueryError>,
  receiver: Option<mpsc::UnboundedReceiver<FetchResult<T>>>,
  events: broadcast::Receiver<CacheEvent>,
  /// Key was invalidated while a fetch was pending
  invalidated_while_loading: bool,
}

impl<T: Send + Sync + 'static> Query<T> {
  /// Create a new query for `key`.
  ///
  /// Any value already cached for the key is picked up immediately so a
  /// re-created view renders without waiting.
  pub fn new<F, Fut, E>(client: &QueryClient, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<QueryError> + Send + 'static,
  {
    let events = client.subscribe();
    let data = client.get::<T>(&key).ok().flatten().and_then(|s| s.data);

    Self {
      client: client.clone(),
      key,
      fetcher: Arc::new(move || {
        fetcher()
          .map(|r| r.map_err(Into::<QueryError>::into))
          .boxed()
      }),
      status: if data.is_some() {
        QueryStatus::Success
      } else {
        QueryStatus::Idle
      },
      data,
      error: None,
      receiver: None,
      events,
      invalidated_while_loading: false,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn status(&self) -> QueryStatus {
    self.status
  }

  /// Latest good value, if any fetch has ever succeeded.
  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  /// Give up the hook, keeping its latest value.
  pub fn into_data(self) -> Option<Arc<T>> {
    self.data
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Error from the most recent fetch, if it failed.
  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  /// Whether the cached value is outside its staleness window or invalidated.
  pub fn is_stale(&self) -> bool {
    match self.client.get::<T>(&self.key) {
      Ok(Some(snapshot)) => snapshot.is_stale,
      _ => true,
    }
  }

  /// Start fetching if not already loading.
  ///
  /// Goes through the cache, so a fresh value costs no network call.
  pub fn fetch(&mut self) {
    if self.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Force a network fetch, bypassing the staleness window.
  pub fn refetch(&mut self) {
    self.client.invalidate(&KeyFilter::exact(self.key.clone()));
    self.receiver = None;
    self.invalidated_while_loading = false;
    self.start_fetch();
  }

  /// Poll for results and cache events.
  ///
  /// Returns `true` if observable state changed. Call this in the event
  /// loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.poll_events();

    let Some(receiver) = &mut self.receiver else {
      return changed;
    };

    // Non-blocking; the fetch task may still be running
    match receiver.try_recv() {
      Ok(result) => {
        self.apply(result);
        changed = true;
      }
      Err(mpsc::error::TryRecvError::Empty) => {}
      Err(mpsc::error::TryRecvError::Disconnected) => {
        // Sender dropped without sending
        self.apply(Err(QueryError::Fetch("Query was cancelled".to_string())));
        changed = true;
      }
    }
    changed
  }

  /// Wait until no fetch is pending.
  pub async fn settle(&mut self) {
    while let Some(receiver) = &mut self.receiver {
      let result = receiver
        .recv()
        .await
        .unwrap_or_else(|| Err(QueryError::Fetch("Query was cancelled".to_string())));
      self.apply(result);
    }
  }

  fn poll_events(&mut self) -> bool {
    let mut changed = false;
    loop {
      match self.events.try_recv() {
        Ok(CacheEvent::Invalidated(key)) if key == self.key => {
          if self.is_loading() {
            self.invalidated_while_loading = true;
          } else if self.status != QueryStatus::Idle {
            self.start_fetch();
            changed = true;
          }
        }
        Ok(CacheEvent::Updated(key))
          if key == self.key && !self.is_loading() && self.status != QueryStatus::Idle =>
        {
          if let Ok(Some(snapshot)) = self.client.get::<T>(&self.key) {
            if let Some(data) = snapshot.data {
              self.data = Some(data);
              self.status = QueryStatus::Success;
              self.error = None;
              changed = true;
            }
          }
        }
        Ok(_) => {}
        Err(broadcast::error::TryRecvError::Lagged(_)) => {
          // Missed events; the cache decides whether a request is needed.
          if self.status != QueryStatus::Idle && !self.is_loading() {
            self.start_fetch();
            changed = true;
          }
        }
        Err(broadcast::error::TryRecvError::Empty)
        | Err(broadcast::error::TryRecvError::Closed) => break,
      }
    }
    changed
  }

  fn apply(&mut self, result: FetchResult<T>) {
    self.receiver = None;
    match result {
      Ok(data) => {
        self.data = Some(data);
        self.error = None;
        self.status = QueryStatus::Success;
      }
      Err(err) => {
        // Keep the last good value
        self.error = Some(err);
        self.status = QueryStatus::Error;
      }
    }

    if self.invalidated_while_loading {
      self.invalidated_while_loading = false;
      self.start_fetch();
    }
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.status = QueryStatus::Loading;

    let client = self.client.clone();
    let key = self.key.clone();
    let fetcher = Arc::clone(&self.fetcher);
    tokio::spawn(async move {
      let result = client.fetch_query(&key, move || fetcher()).await;
      // Receiver is gone if the query was dropped
      let _ = tx.send(result);
    });
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", &self.key)
      .field("status", &self.status)
      .field("data", &self.data)
      .field("error", &self.error)
      .finish_non_exhaustive()
  }
}
