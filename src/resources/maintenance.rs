use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::types::{MaintenanceRecord, MaintenanceStatus, NewMaintenance};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{dashboard_filter, vehicles, Api};

const TABLE: &str = "maintenance_records";

pub mod keys {
  use super::MaintenanceFilters;
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("maintenance")
  }

  pub fn list(filters: &MaintenanceFilters) -> QueryKey {
    all()
      .with("list")
      .with(filters.status.map(|s| s.as_str()))
      .with(filters.vehicle_id.as_ref())
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceFilters {
  pub status: Option<MaintenanceStatus>,
  pub vehicle_id: Option<String>,
}

impl MaintenanceFilters {
  pub fn select(&self) -> Select {
    Select::from(TABLE)
      .filter_opt(self.status, |s| Filter::eq("status", s))
      .filter_opt(self.vehicle_id.as_deref(), |v| Filter::eq("vehicle_id", v))
      .order_by("scheduled_date", Order::Asc)
  }
}

pub async fn fetch_records(
  remote: &RemoteClient,
  filters: &MaintenanceFilters,
) -> Result<Vec<MaintenanceRecord>, RemoteError> {
  remote.select(&filters.select()).await
}

pub async fn fetch_record(remote: &RemoteClient, id: &str) -> Result<MaintenanceRecord, RemoteError> {
  remote
    .select_one(&Select::from(TABLE).filter(Filter::eq("id", id)))
    .await
}

pub fn list_query(api: &Api, filters: MaintenanceFilters) -> Query<Vec<MaintenanceRecord>> {
  api.query(keys::list(&filters), move |remote| {
    let filters = filters.clone();
    async move { fetch_records(&remote, &filters).await }
  })
}

pub fn detail_query(api: &Api, id: &str) -> Query<MaintenanceRecord> {
  let id = id.to_string();
  api.query(keys::detail(&id), move |remote| {
    let id = id.clone();
    async move { fetch_record(&remote, &id).await }
  })
}

/// A maintenance record and the vehicle it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
  pub id: String,
  pub vehicle_id: String,
}

impl From<&MaintenanceRecord> for RecordRef {
  fn from(record: &MaintenanceRecord) -> Self {
    Self {
      id: record.id.clone(),
      vehicle_id: record.vehicle_id.clone(),
    }
  }
}

/// Every maintenance write: all maintenance lists, the affected vehicle's
/// detail and the dashboard's maintenance figures.
pub fn vehicle_invalidations(vehicle_id: &str) -> Vec<KeyFilter> {
  vec![
    KeyFilter::prefix(keys::all()),
    KeyFilter::exact(vehicles::keys::detail(vehicle_id)),
    dashboard_filter(),
  ]
}

pub fn schedule(api: &Api) -> Mutation<NewMaintenance, MaintenanceRecord> {
  api
    .mutation("Maintenance scheduled", |remote, record: NewMaintenance| async move {
      remote.insert(TABLE, &record).await
    })
    .invalidates_with(|record: &MaintenanceRecord| vehicle_invalidations(&record.vehicle_id))
}

#[derive(Debug, Serialize)]
struct StatusPatch {
  status: MaintenanceStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  completed_date: Option<NaiveDate>,
}

impl StatusPatch {
  /// Completing a record stamps today's date.
  fn new(status: MaintenanceStatus, today: NaiveDate) -> Self {
    Self {
      status,
      completed_date: (status == MaintenanceStatus::Completed).then_some(today),
    }
  }
}

pub fn set_status(api: &Api) -> Mutation<(String, MaintenanceStatus), MaintenanceRecord> {
  api
    .mutation(
      "Maintenance updated",
      |remote, (id, status): (String, MaintenanceStatus)| async move {
        let patch = StatusPatch::new(status, Utc::now().date_naive());
        remote.update_by_id(TABLE, &id, &patch).await
      },
    )
    .invalidates_with(|record: &MaintenanceRecord| vehicle_invalidations(&record.vehicle_id))
}

pub fn delete(api: &Api) -> Mutation<RecordRef, RecordRef> {
  api
    .mutation("Maintenance deleted", |remote, record: RecordRef| async move {
      remote
        .delete(TABLE, &[Filter::eq("id", &record.id)])
        .await?;
      Ok::<_, RemoteError>(record)
    })
    .invalidates_with(|record: &RecordRef| vehicle_invalidations(&record.vehicle_id))
}

/// Build a scheduling payload.
pub fn new_record(
  vehicle_id: &str,
  description: &str,
  scheduled_date: NaiveDate,
  cost: Option<f64>,
) -> NewMaintenance {
  NewMaintenance {
    vehicle_id: vehicle_id.to_string(),
    description: description.trim().to_string(),
    scheduled_date,
    cost,
    status: MaintenanceStatus::Scheduled,
  }
}
