//! Mutation hooks: run a write, then invalidate what depends on it.
//!
//! Invalidation happens strictly after the backend acknowledges the write;
//! there are no optimistic updates. A failed write invalidates nothing.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

use crate::cache::{KeyFilter, QueryClient, QueryError};
use crate::notify::Notifier;

/// Status of a mutation hook
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationStatus {
  #[default]
  Idle,
  Pending,
  Success,
  Error(QueryError),
}

type MutateFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + Sync>;
type DependentsFn<O> = Arc<dyn Fn(&O) -> Vec<KeyFilter> + Send + Sync>;

/// A write operation bound to the cache keys it makes stale.
///
/// Clones share status, so a clone handed to a view reports the same
/// `is_pending`/`is_error` flags as the one that triggered the write.
pub struct Mutation<I, O> {
  label: String,
  client: QueryClient,
  notifier: Notifier,
  mutate_fn: MutateFn<I, O>,
  invalidates: Vec<KeyFilter>,
  dependents: Option<DependentsFn<O>>,
  status: Arc<Mutex<MutationStatus>>,
}

impl<I, O> Clone for Mutation<I, O> {
  fn clone(&self) -> Self {
    Self {
      label: self.label.clone(),
      client: self.client.clone(),
      notifier: self.notifier.clone(),
      mutate_fn: Arc::clone(&self.mutate_fn),
      invalidates: self.invalidates.clone(),
      dependents: self.dependents.clone(),
      status: Arc::clone(&self.status),
    }
  }
}

impl<I: Send + 'static, O: Send + 'static> Mutation<I, O> {
  /// Create a mutation; `label` titles the notifications it raises.
  pub fn new<F, Fut, E>(
    client: &QueryClient,
    notifier: &Notifier,
    label: impl Into<String>,
    mutate_fn: F,
  ) -> Self
  where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, E>> + Send + 'static,
    E: Into<QueryError> + Send + 'static,
  {
    Self {
      label: label.into(),
      client: client.clone(),
      notifier: notifier.clone(),
      mutate_fn: Arc::new(move |input| {
        mutate_fn(input)
          .map(|r| r.map_err(Into::<QueryError>::into))
          .boxed()
      }),
      invalidates: Vec::new(),
      dependents: None,
      status: Arc::new(Mutex::new(MutationStatus::Idle)),
    }
  }

  /// Invalidate `filter` after every successful write.
  pub fn invalidates(mut self, filter: KeyFilter) -> Self {
    self.invalidates.push(filter);
    self
  }

  /// Invalidate every filter in `filters` after every successful write.
  pub fn invalidates_all(mut self, filters: impl IntoIterator<Item = KeyFilter>) -> Self {
    self.invalidates.extend(filters);
    self
  }

  /// Invalidate keys derived from the write's result (e.g. the detail key of
  /// the row that changed).
  pub fn invalidates_with<D>(mut self, dependents: D) -> Self
  where
    D: Fn(&O) -> Vec<KeyFilter> + Send + Sync + 'static,
  {
    self.dependents = Some(Arc::new(dependents));
    self
  }

  /// Every filter a successful write with `output` would invalidate.
  pub fn dependent_filters(&self, output: &O) -> Vec<KeyFilter> {
    let mut filters = self.invalidates.clone();
    if let Some(dependents) = &self.dependents {
      filters.extend(dependents(output));
    }
    filters
  }

  /// Run the write. On success invalidate dependents then notify; on failure
  /// notify only. The caller decides whether to retry.
  pub async fn mutate(&self, input: I) -> Result<O, QueryError> {
    self.set_status(MutationStatus::Pending);

    match (self.mutate_fn)(input).await {
      Ok(output) => {
        let filters = self.dependent_filters(&output);
        let invalidated: usize = filters.iter().map(|f| self.client.invalidate(f)).sum();
        info!(mutation = %self.label, filters = filters.len(), invalidated, "mutation succeeded");

        self.set_status(MutationStatus::Success);
        self.notifier.success(self.label.clone(), "");
        Ok(output)
      }
      Err(err) => {
        warn!(mutation = %self.label, error = %err, "mutation failed");
        self.set_status(MutationStatus::Error(err.clone()));
        self.notifier.error(self.label.clone(), err.to_string());
        Err(err)
      }
    }
  }

  pub fn status(&self) -> MutationStatus {
    self.lock().clone()
  }

  pub fn is_pending(&self) -> bool {
    *self.lock() == MutationStatus::Pending
  }

  pub fn is_error(&self) -> bool {
    matches!(*self.lock(), MutationStatus::Error(_))
  }

  pub fn is_success(&self) -> bool {
    *self.lock() == MutationStatus::Success
  }

  pub fn error(&self) -> Option<QueryError> {
    match &*self.lock() {
      MutationStatus::Error(err) => Some(err.clone()),
      _ => None,
    }
  }

  /// Back to idle, clearing any error.
  pub fn reset(&self) {
    self.set_status(MutationStatus::Idle);
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, MutationStatus> {
    self.status.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_status(&self, status: MutationStatus) {
    *self.lock() = status;
  }
}
