//! Fleet and revenue figures, aggregated client-side from the other tables.

use futures::try_join;
use tracing::debug;

use crate::query::Query;
use crate::remote::types::{
  Agreement, AgreementStatus, MaintenanceRecord, MaintenanceStatus, Payment, PaymentStatus, Vehicle,
  VehicleStatus,
};
use crate::remote::{Filter, RemoteClient, RemoteError, Select};

use super::Api;

pub mod keys {
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("dashboard")
  }

  pub fn stats() -> QueryKey {
    all().with("stats")
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStats {
  pub total_vehicles: usize,
  pub available_vehicles: usize,
  pub rented_vehicles: usize,
  pub vehicles_in_maintenance: usize,
  /// Share of the active fleet currently rented, 0-100
  pub utilization: f64,
  pub active_agreements: usize,
  pub overdue_agreements: usize,
  pub open_maintenance: usize,
  pub scheduled_maintenance_cost: f64,
  pub revenue_collected: f64,
  pub payments_pending: f64,
}

impl DashboardStats {
  pub fn compute(
    vehicles: &[Vehicle],
    agreements: &[Agreement],
    maintenance: &[MaintenanceRecord],
    payments: &[Payment],
  ) -> Self {
    let count_vehicles = |status: VehicleStatus| vehicles.iter().filter(|v| v.status == status).count();
    let count_agreements = |status: AgreementStatus| agreements.iter().filter(|a| a.status == status).count();
    let sum_payments = |status: PaymentStatus| {
      payments
        .iter()
        .filter(|p| p.status == status)
        .map(|p| p.amount)
        .sum::<f64>()
    };

    let rented = count_vehicles(VehicleStatus::Rented);
    let in_service = vehicles.len() - count_vehicles(VehicleStatus::Retired);
    let utilization = if in_service == 0 {
      0.0
    } else {
      rented as f64 * 100.0 / in_service as f64
    };

    let open: Vec<&MaintenanceRecord> = maintenance
      .iter()
      .filter(|m| matches!(m.status, MaintenanceStatus::Scheduled | MaintenanceStatus::InProgress))
      .collect();

    Self {
      total_vehicles: vehicles.len(),
      available_vehicles: count_vehicles(VehicleStatus::Available),
      rented_vehicles: rented,
      vehicles_in_maintenance: count_vehicles(VehicleStatus::Maintenance),
      utilization,
      active_agreements: count_agreements(AgreementStatus::Active),
      overdue_agreements: count_agreements(AgreementStatus::Overdue),
      open_maintenance: open.len(),
      scheduled_maintenance_cost: open.iter().filter_map(|m| m.cost).sum(),
      revenue_collected: sum_payments(PaymentStatus::Completed),
      payments_pending: sum_payments(PaymentStatus::Pending),
    }
  }
}

/// Load the four source tables concurrently and aggregate them. Only open
/// agreements and maintenance are fetched.
pub async fn fetch_stats(remote: &RemoteClient) -> Result<DashboardStats, RemoteError> {
  let vehicles_q = Select::from("vehicles");
  let agreements_q = Select::from("agreements").filter(Filter::in_list(
    "status",
    [AgreementStatus::Active, AgreementStatus::Overdue],
  ));
  let maintenance_q = Select::from("maintenance_records").filter(Filter::in_list(
    "status",
    [MaintenanceStatus::Scheduled, MaintenanceStatus::InProgress],
  ));
  let payments_q = Select::from("payments");

  let (vehicles, agreements, maintenance, payments) = try_join!(
    remote.select::<Vehicle>(&vehicles_q),
    remote.select::<Agreement>(&agreements_q),
    remote.select::<MaintenanceRecord>(&maintenance_q),
    remote.select::<Payment>(&payments_q),
  )?;
  debug!(
    vehicles = vehicles.len(),
    agreements = agreements.len(),
    "aggregating dashboard"
  );

  Ok(DashboardStats::compute(
    &vehicles,
    &agreements,
    &maintenance,
    &payments,
  ))
}

pub fn stats_query(api: &Api) -> Query<DashboardStats> {
  api.query(keys::stats(), |remote| async move { fetch_stats(&remote).await })
}
