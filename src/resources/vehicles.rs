//! Fleet vehicles and the vehicle types that set their rates.

use crate::cache::KeyFilter;
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::types::{StatusPatch, Vehicle, VehicleStatus, VehicleType};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{dashboard_filter, search_filter, Api};

const TABLE: &str = "vehicles";
const TYPES_TABLE: &str = "vehicle_types";

pub mod keys {
  use super::VehicleFilters;
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("vehicles")
  }

  pub fn list(filters: &VehicleFilters) -> QueryKey {
    all()
      .with("list")
      .with(filters.status.map(|s| s.as_str()))
      .with(filters.vehicle_type_id.as_ref())
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }

  pub fn types() -> QueryKey {
    QueryKey::new("vehicle_types")
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleFilters {
  pub status: Option<VehicleStatus>,
  pub vehicle_type_id: Option<String>,
}

impl VehicleFilters {
  pub fn select(&self) -> Select {
    Select::from(TABLE)
      .filter_opt(self.status, |s| Filter::eq("status", s))
      .filter_opt(self.vehicle_type_id.as_deref(), |t| Filter::eq("vehicle_type_id", t))
      .order_by("make", Order::Asc)
      .order_by("model", Order::Asc)
  }
}

pub async fn fetch_vehicles(
  remote: &RemoteClient,
  filters: &VehicleFilters,
) -> Result<Vec<Vehicle>, RemoteError> {
  remote.select(&filters.select()).await
}

pub async fn fetch_vehicle(remote: &RemoteClient, id: &str) -> Result<Vehicle, RemoteError> {
  remote
    .select_one(&Select::from(TABLE).filter(Filter::eq("id", id)))
    .await
}

pub async fn fetch_vehicle_types(remote: &RemoteClient) -> Result<Vec<VehicleType>, RemoteError> {
  remote
    .select(&Select::from(TYPES_TABLE).order_by("daily_rate", Order::Asc))
    .await
}

pub fn list_query(api: &Api, filters: VehicleFilters) -> Query<Vec<Vehicle>> {
  api.query(keys::list(&filters), move |remote| {
    let filters = filters.clone();
    async move { fetch_vehicles(&remote, &filters).await }
  })
}

pub fn detail_query(api: &Api, id: &str) -> Query<Vehicle> {
  let id = id.to_string();
  api.query(keys::detail(&id), move |remote| {
    let id = id.clone();
    async move { fetch_vehicle(&remote, &id).await }
  })
}

pub fn types_query(api: &Api) -> Query<Vec<VehicleType>> {
  api.query(keys::types(), |remote| async move {
    fetch_vehicle_types(&remote).await
  })
}

/// Vehicle status drives fleet utilization and appears in search results.
pub fn status_invalidations() -> Vec<KeyFilter> {
  vec![
    KeyFilter::prefix(keys::all()),
    dashboard_filter(),
    search_filter(),
  ]
}

pub fn update_status(api: &Api) -> Mutation<(String, VehicleStatus), Vehicle> {
  api
    .mutation(
      "Vehicle status updated",
      |remote, (id, status): (String, VehicleStatus)| async move {
        remote
          .update_by_id(TABLE, &id, &StatusPatch { status })
          .await
      },
    )
    .invalidates_all(status_invalidations())
}

/// Look up a vehicle's type name for display.
pub fn type_name<'a>(vehicle: &Vehicle, types: &'a [VehicleType]) -> Option<&'a str> {
  let type_id = vehicle.vehicle_type_id.as_deref()?;
  types
    .iter()
    .find(|t| t.id == type_id)
    .map(|t| t.name.as_str())
}

/// The vehicle's own daily rate, or its type's when it has none.
pub fn effective_daily_rate(vehicle: &Vehicle, types: &[VehicleType]) -> Option<f64> {
  vehicle.daily_rate.or_else(|| {
    let type_id = vehicle.vehicle_type_id.as_deref()?;
    types.iter().find(|t| t.id == type_id).map(|t| t.daily_rate)
  })
}
