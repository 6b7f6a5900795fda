//! Cache entry bookkeeping and the views handed out to readers.

use futures::future::{BoxFuture, Shared};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::error::QueryError;
use super::key::QueryKey;

/// Type-erased cached value. Each resource stores its own concrete type.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Future shared by every caller waiting on the same fetch.
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<ErasedValue, QueryError>>>;

/// Fetch status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
  /// Entry exists but nothing has been fetched yet
  Idle,
  /// A request for this key is in flight
  Fetching,
  /// Last fetch succeeded
  Success,
  /// Last fetch failed; any previous value is retained
  Error,
}

/// Change notifications broadcast by the cache to observing hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// A new value was stored for the key
  Updated(QueryKey),
  /// The key was marked stale and should be re-fetched by observers
  Invalidated(QueryKey),
  /// The key was dropped from the cache
  Removed(QueryKey),
  /// Every entry was dropped
  Cleared,
}

pub(crate) struct InFlight {
  pub id: u64,
  pub future: SharedFetch,
}

pub(crate) struct Entry {
  pub value: Option<ErasedValue>,
  pub status: FetchStatus,
  pub error: Option<QueryError>,
  pub updated_at: Option<Instant>,
  pub invalidated: bool,
  pub in_flight: Option<InFlight>,
}

impl Default for Entry {
  fn default() -> Self {
    Self {
      value: None,
      status: FetchStatus::Idle,
      error: None,
      updated_at: None,
      invalidated: false,
      in_flight: None,
    }
  }
}

impl Entry {
  pub fn is_stale(&self, stale_time: Duration) -> bool {
    if self.invalidated {
      return true;
    }
    match self.updated_at {
      Some(at) => at.elapsed() >= stale_time,
      None => true,
    }
  }

  /// The cached value, if present and still inside the staleness window.
  pub fn fresh_value(&self, stale_time: Duration) -> Option<ErasedValue> {
    if self.is_stale(stale_time) {
      return None;
    }
    self.value.clone()
  }
}

/// Point-in-time view of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
  /// Last good value, kept across failed fetches
  pub data: Option<Arc<T>>,
  pub status: FetchStatus,
  /// Error from the most recent fetch, if it failed
  pub error: Option<QueryError>,
  /// When the value was last written
  pub updated_at: Option<Instant>,
  pub is_stale: bool,
}

/// Downcast an erased value to the type the caller expects.
pub(crate) fn downcast<T: Send + Sync + 'static>(
  key: &QueryKey,
  value: ErasedValue,
) -> Result<Arc<T>, QueryError> {
  value
    .downcast::<T>()
    .map_err(|_| QueryError::TypeMismatch {
      key: key.to_string(),
    })
}
