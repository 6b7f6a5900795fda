//! Row types mirrored from the hosted database.
//!
//! Column names match the tables exactly. Status columns are closed enums
//! with an `Unknown` fallback so a new server-side value does not break reads.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declare a snake_case status enum with `Display`, `FromStr` and an
/// `Unknown` catch-all.
macro_rules! status_enum {
  ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum $name {
      $($variant,)+
      #[serde(other)]
      Unknown,
    }

    impl $name {
      pub const ALL: &'static [$name] = &[$($name::$variant),+];

      pub fn as_str(&self) -> &'static str {
        match self {
          $($name::$variant => $text,)+
          $name::Unknown => "unknown",
        }
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl FromStr for $name {
      type Err = String;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        $name::ALL
          .iter()
          .copied()
          .find(|v| v.as_str() == wanted)
          .ok_or_else(|| {
            let valid: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
            format!("unknown {} '{}' (expected one of: {})", stringify!($name), s, valid.join(", "))
          })
      }
    }
  };
}

status_enum!(
  /// Lease lifecycle
  AgreementStatus {
    Draft => "draft",
    Pending => "pending",
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
    Overdue => "overdue",
  }
);

status_enum!(CustomerStatus {
  Active => "active",
  Inactive => "inactive",
  PendingReview => "pending_review",
  Blacklisted => "blacklisted",
});

status_enum!(
  /// Drives fleet metrics on the dashboard
  VehicleStatus {
    Available => "available",
    Rented => "rented",
    Reserved => "reserved",
    Maintenance => "maintenance",
    Retired => "retired",
  }
);

status_enum!(MaintenanceStatus {
  Scheduled => "scheduled",
  InProgress => "in_progress",
  Completed => "completed",
  Cancelled => "cancelled",
});

status_enum!(PaymentStatus {
  Pending => "pending",
  Completed => "completed",
  Failed => "failed",
  Refunded => "refunded",
});

status_enum!(LeadStatus {
  New => "new",
  Contacted => "contacted",
  Qualified => "qualified",
  Negotiation => "negotiation",
  Converted => "converted",
  Lost => "lost",
});

/// Lease agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
  pub id: String,
  pub agreement_number: Option<String>,
  pub customer_id: String,
  pub vehicle_id: String,
  pub status: AgreementStatus,
  #[serde(default)]
  pub rent_amount: f64,
  pub total_amount: Option<f64>,
  pub start_date: NaiveDate,
  pub end_date: Option<NaiveDate>,
  pub created_at: Option<DateTime<Utc>>,
}

/// Customer profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: String,
  pub full_name: String,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub status: CustomerStatus,
  pub role: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
  pub id: String,
  pub make: String,
  pub model: String,
  pub year: Option<i32>,
  pub license_plate: String,
  pub vehicle_type_id: Option<String>,
  pub daily_rate: Option<f64>,
  pub status: VehicleStatus,
}

/// Vehicle category with its rate card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
  pub id: String,
  pub name: String,
  pub description: Option<String>,
  pub daily_rate: f64,
  pub weekly_rate: Option<f64>,
  pub monthly_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceRecord {
  pub id: String,
  pub vehicle_id: String,
  pub status: MaintenanceStatus,
  pub description: String,
  pub cost: Option<f64>,
  pub scheduled_date: NaiveDate,
  pub completed_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
  pub id: String,
  pub agreement_id: String,
  pub amount: f64,
  pub status: PaymentStatus,
  pub due_date: Option<NaiveDate>,
  pub paid_at: Option<DateTime<Utc>>,
  pub payment_method: Option<String>,
}

/// Sales lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
  pub id: String,
  pub full_name: String,
  pub email: Option<String>,
  pub phone: Option<String>,
  #[serde(default)]
  pub score: i32,
  pub status: LeadStatus,
  pub assigned_to: Option<String>,
  pub source: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTask {
  pub id: String,
  pub lead_id: String,
  pub title: String,
  pub due_date: Option<NaiveDate>,
  #[serde(default)]
  pub completed: bool,
  pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadCommunication {
  pub id: String,
  pub lead_id: String,
  /// "call", "email", "sms", "meeting"
  pub channel: String,
  pub summary: String,
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyAccount {
  pub customer_id: String,
  #[serde(default)]
  pub points: i64,
  pub tier: Option<String>,
}

/// Generated contract or receipt attached to an agreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalDocument {
  pub id: String,
  pub agreement_id: String,
  pub document_type: String,
  pub document_url: Option<String>,
  pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Write payloads
// ============================================================================

/// Body for a status-only update.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPatch<S> {
  pub status: S,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLeadTask {
  pub lead_id: String,
  pub title: String,
  pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewLeadCommunication {
  pub lead_id: String,
  pub channel: String,
  pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMaintenance {
  pub vehicle_id: String,
  pub description: String,
  pub scheduled_date: NaiveDate,
  pub cost: Option<f64>,
  pub status: MaintenanceStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
  pub agreement_id: String,
  pub amount: f64,
  pub payment_method: Option<String>,
  pub status: PaymentStatus,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_parse() {
    assert_eq!("in-progress".parse::<MaintenanceStatus>(), Ok(MaintenanceStatus::InProgress));
    assert_eq!("Qualified".parse::<LeadStatus>(), Ok(LeadStatus::Qualified));
    assert!("sold".parse::<LeadStatus>().is_err());
  }

  #[test]
  fn test_unknown_status_deserializes() {
    let status: VehicleStatus = serde_json::from_str("\"in_transit\"").unwrap();
    assert_eq!(status, VehicleStatus::Unknown);
  }

  #[test]
  fn test_lead_row() {
    let json = r#"{
      "id": "l-1",
      "full_name": "Dana Reyes",
      "email": "dana@example.com",
      "phone": null,
      "score": 72,
      "status": "contacted",
      "assigned_to": "u-9",
      "source": "website",
      "created_at": "2026-03-01T10:00:00Z"
    }"#;
    let lead: Lead = serde_json::from_str(json).unwrap();
    assert_eq!(lead.status, LeadStatus::Contacted);
    assert_eq!(lead.score, 72);
  }

  #[test]
  fn test_status_patch_body() {
    let body = serde_json::to_value(StatusPatch {
      status: AgreementStatus::Completed,
    })
    .unwrap();
    assert_eq!(body, serde_json::json!({ "status": "completed" }));
  }
}
