use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::prefs::ViewMode;
use crate::remote::types::{
  AgreementStatus, CustomerStatus, LeadStatus, MaintenanceStatus, VehicleStatus,
};

#[derive(Parser, Debug)]
#[command(name = "rentdesk")]
#[command(about = "A terminal client for car-rental operations")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/rentdesk/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Fleet, agreement and revenue figures
  Dashboard {
    /// Keep refreshing every N seconds until interrupted
    #[arg(long, value_name = "SECS")]
    watch: Option<u64>,
  },
  /// Sales leads, tasks and communications
  Leads {
    #[command(subcommand)]
    command: LeadsCommand,
  },
  Vehicles {
    #[command(subcommand)]
    command: VehiclesCommand,
  },
  Customers {
    #[command(subcommand)]
    command: CustomersCommand,
  },
  /// Rental agreements and their legal documents
  Agreements {
    #[command(subcommand)]
    command: AgreementsCommand,
  },
  Maintenance {
    #[command(subcommand)]
    command: MaintenanceCommand,
  },
  Payments {
    #[command(subcommand)]
    command: PaymentsCommand,
  },
  Loyalty {
    #[command(subcommand)]
    command: LoyaltyCommand,
  },
  /// Search vehicles, customers and agreements at once
  Search {
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,
  },
  /// Local preferences
  Prefs {
    #[command(subcommand)]
    command: PrefsCommand,
  },
}

#[derive(Subcommand, Debug)]
pub enum LeadsCommand {
  List {
    #[arg(long)]
    status: Option<LeadStatus>,
    #[arg(long)]
    assigned_to: Option<String>,
    #[arg(long)]
    min_score: Option<i32>,
  },
  /// A lead with its tasks and communication log
  Show { id: String },
  SetStatus { id: String, status: LeadStatus },
  /// Assign to a staff member; omit --to to unassign
  Assign {
    id: String,
    #[arg(long)]
    to: Option<String>,
  },
  AddTask {
    lead_id: String,
    title: String,
    #[arg(long, value_name = "YYYY-MM-DD")]
    due: Option<NaiveDate>,
  },
  CompleteTask { task_id: String },
  /// Record a call, email or meeting
  Log {
    lead_id: String,
    summary: String,
    #[arg(long, default_value = "call")]
    channel: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum VehiclesCommand {
  List {
    #[arg(long)]
    status: Option<VehicleStatus>,
    #[arg(long = "type", value_name = "TYPE_ID")]
    vehicle_type: Option<String>,
    /// Override the saved view mode
    #[arg(long)]
    view: Option<ViewMode>,
  },
  Show { id: String },
  SetStatus { id: String, status: VehicleStatus },
  /// Vehicle types and their rates
  Types,
}

#[derive(Subcommand, Debug)]
pub enum CustomersCommand {
  List {
    #[arg(long)]
    status: Option<CustomerStatus>,
    #[arg(long)]
    name: Option<String>,
  },
  /// A customer with their loyalty balance
  Show { id: String },
  SetStatus { id: String, status: CustomerStatus },
  /// Create a customer login
  Provision {
    #[arg(long)]
    email: String,
    #[arg(long)]
    name: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum AgreementsCommand {
  List {
    #[arg(long)]
    status: Option<AgreementStatus>,
    #[arg(long)]
    customer: Option<String>,
    #[arg(long)]
    vehicle: Option<String>,
  },
  /// An agreement with its payments and balance
  Show { id: String },
  SetStatus { id: String, status: AgreementStatus },
  Documents { id: String },
  GenerateDocument {
    id: String,
    #[arg(default_value = "rental_contract")]
    document_type: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum MaintenanceCommand {
  List {
    #[arg(long)]
    status: Option<MaintenanceStatus>,
    #[arg(long)]
    vehicle: Option<String>,
  },
  Schedule {
    vehicle_id: String,
    description: String,
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: NaiveDate,
    #[arg(long)]
    cost: Option<f64>,
  },
  SetStatus { id: String, status: MaintenanceStatus },
  Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum PaymentsCommand {
  List { agreement_id: String },
  Record {
    agreement_id: String,
    amount: f64,
    #[arg(long)]
    method: Option<String>,
  },
}

#[derive(Subcommand, Debug)]
pub enum LoyaltyCommand {
  Show { customer_id: String },
  Award {
    customer_id: String,
    points: i64,
    #[arg(long, default_value = "manual adjustment")]
    reason: String,
  },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
  List,
  Get { key: String },
  Set { key: String, value: String },
  Unset { key: String },
}
