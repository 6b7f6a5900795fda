use color_eyre::{eyre::eyre, Result};
use futures::try_join;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cache::QueryClient;
use crate::cli::{
  AgreementsCommand, Command, CustomersCommand, LeadsCommand, LoyaltyCommand, MaintenanceCommand,
  PaymentsCommand, PrefsCommand, VehiclesCommand,
};
use crate::config::Config;
use crate::mutation::Mutation;
use crate::notify::{Level, Notifications, Notifier};
use crate::output::{date, money, or_dash, truncate, Table};
use crate::prefs::{PreferenceStore, ViewMode, VEHICLE_VIEW_MODE};
use crate::query::Query;
use crate::remote::types::{Customer, Vehicle, VehicleType};
use crate::remote::RemoteClient;
use crate::resources::agreements::{self, AgreementFilters, DocumentRequest};
use crate::resources::customers::{self, CustomerFilters, NewCustomer};
use crate::resources::leads::{self, LeadFilters};
use crate::resources::maintenance::{self, MaintenanceFilters, RecordRef};
use crate::resources::vehicles::{self, VehicleFilters};
use crate::resources::{dashboard, loyalty, payments, Api};
use crate::search::{SearchAggregator, SearchResults};

/// How often the watch loop polls its hook between refreshes
const TICK: Duration = Duration::from_millis(250);

/// Main application state
pub struct App {
  api: Api,
  search: SearchAggregator,
  prefs: PreferenceStore,
  notifications: Notifications,
}

impl App {
  pub fn new(config: Config, prefs: PreferenceStore) -> Result<Self> {
    let remote = RemoteClient::new(&config)?;
    let cache = QueryClient::new(config.cache.options());
    let (notifier, notifications) = Notifier::channel();

    let search = SearchAggregator::new(Arc::new(remote.clone()), &cache, &notifier, &config.search);
    let api = Api::new(remote, cache, notifier);

    Ok(Self {
      api,
      search,
      prefs,
      notifications,
    })
  }

  pub async fn run(&mut self, command: Command) -> Result<()> {
    let result = match command {
      Command::Dashboard { watch: None } => self.dashboard().await,
      Command::Dashboard { watch: Some(secs) } => self.watch_dashboard(secs.max(1)).await,
      Command::Leads { command } => self.leads(command).await,
      Command::Vehicles { command } => self.vehicles(command).await,
      Command::Customers { command } => self.customers(command).await,
      Command::Agreements { command } => self.agreements(command).await,
      Command::Maintenance { command } => self.maintenance(command).await,
      Command::Payments { command } => self.payments(command).await,
      Command::Loyalty { command } => self.loyalty(command).await,
      Command::Search { query } => self.search(&query.join(" ")).await,
      Command::Prefs { command } => run_prefs(&self.prefs, command),
    };
    self.flush_notifications();
    result
  }

  fn flush_notifications(&mut self) {
    for notification in self.notifications.drain() {
      match notification.level {
        Level::Success => println!("{}", notification),
        Level::Error => eprintln!("{}", notification),
      }
    }
  }

  async fn dashboard(&self) -> Result<()> {
    let stats = load(dashboard::stats_query(&self.api)).await?;
    print!("{}", render_dashboard(&stats));
    Ok(())
  }

  /// Re-render whenever the hook reports a change; invalidations and the
  /// periodic refetch both arrive through `poll`.
  async fn watch_dashboard(&mut self, secs: u64) -> Result<()> {
    let mut query = dashboard::stats_query(&self.api);
    query.fetch();

    let mut tick = tokio::time::interval(TICK);
    let mut refresh = tokio::time::interval(Duration::from_secs(secs));
    refresh.tick().await;
    info!(secs, "watching dashboard");

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        _ = refresh.tick() => query.refetch(),
        _ = tick.tick() => {
          if query.poll() {
            if let Some(stats) = query.data() {
              print!("\x1b[2J\x1b[H{}", render_dashboard(stats));
            }
            if let Some(err) = query.error() {
              eprintln!("[error] Dashboard refresh failed: {}", err);
            }
          }
          self.flush_notifications();
        }
      }
    }
    Ok(())
  }

  async fn leads(&self, command: LeadsCommand) -> Result<()> {
    match command {
      LeadsCommand::List {
        status,
        assigned_to,
        min_score,
      } => {
        let filters = LeadFilters {
          status,
          assigned_to,
          min_score,
        };
        let rows = load(leads::list_query(&self.api, filters)).await?;
        let mut table = Table::new(&["ID", "NAME", "SCORE", "STATUS", "ASSIGNED"]);
        for lead in rows.iter() {
          table.row(vec![
            lead.id.clone(),
            truncate(&lead.full_name, 28),
            lead.score.to_string(),
            lead.status.to_string(),
            or_dash(lead.assigned_to.as_deref()).to_string(),
          ]);
        }
        print_table(&table, "No leads found");
      }
      LeadsCommand::Show { id } => {
        let (lead, tasks, log) = try_join!(
          load(leads::detail_query(&self.api, &id)),
          load(leads::tasks_query(&self.api, &id)),
          load(leads::communications_query(&self.api, &id)),
        )?;
        println!("{}  ({})", lead.full_name, lead.id);
        println!("Status:   {}", lead.status);
        println!("Score:    {}", lead.score);
        println!("Email:    {}", or_dash(lead.email.as_deref()));
        println!("Phone:    {}", or_dash(lead.phone.as_deref()));
        println!("Source:   {}", or_dash(lead.source.as_deref()));
        println!("Assigned: {}", or_dash(lead.assigned_to.as_deref()));

        println!("\nTasks");
        let mut table = Table::new(&["ID", "DUE", "DONE", "TITLE"]);
        for task in tasks.iter() {
          table.row(vec![
            task.id.clone(),
            date(task.due_date),
            if task.completed { "yes" } else { "no" }.to_string(),
            truncate(&task.title, 48),
          ]);
        }
        print_table(&table, "  none");

        println!("\nCommunications");
        let mut table = Table::new(&["WHEN", "CHANNEL", "SUMMARY"]);
        for entry in log.iter() {
          table.row(vec![
            entry
              .created_at
              .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
              .unwrap_or_else(|| "-".to_string()),
            entry.channel.clone(),
            truncate(&entry.summary, 60),
          ]);
        }
        print_table(&table, "  none");
      }
      LeadsCommand::SetStatus { id, status } => {
        let lead = submit(leads::update_status(&self.api), (id, status)).await?;
        println!("{} is now {}", lead.full_name, lead.status);
      }
      LeadsCommand::Assign { id, to } => {
        let lead = submit(leads::assign(&self.api), (id, to)).await?;
        println!(
          "{} assigned to {}",
          lead.full_name,
          or_dash(lead.assigned_to.as_deref())
        );
      }
      LeadsCommand::AddTask {
        lead_id,
        title,
        due,
      } => {
        let task = submit(leads::add_task(&self.api), leads::new_task(&lead_id, &title, due)).await?;
        println!("Created task {}", task.id);
      }
      LeadsCommand::CompleteTask { task_id } => {
        let task = submit(leads::complete_task(&self.api), task_id).await?;
        println!("Completed \"{}\"", task.title);
      }
      LeadsCommand::Log {
        lead_id,
        summary,
        channel,
      } => {
        let entry = crate::remote::types::NewLeadCommunication {
          lead_id,
          channel,
          summary,
        };
        let logged = submit(leads::log_communication(&self.api), entry).await?;
        println!("Logged {} {}", logged.channel, logged.id);
      }
    }
    Ok(())
  }

  async fn vehicles(&self, command: VehiclesCommand) -> Result<()> {
    match command {
      VehiclesCommand::List {
        status,
        vehicle_type,
        view,
      } => {
        let view = match view {
          Some(view) => view,
          None => self.prefs.get_or_default::<ViewMode>(VEHICLE_VIEW_MODE)?,
        };
        let filters = VehicleFilters {
          status,
          vehicle_type_id: vehicle_type,
        };
        let (rows, types) = try_join!(
          load(vehicles::list_query(&self.api, filters)),
          load(vehicles::types_query(&self.api)),
        )?;
        if rows.is_empty() {
          println!("No vehicles found");
        }
        match view {
          ViewMode::List => {
            let mut table = Table::new(&["ID", "VEHICLE", "PLATE", "STATUS", "DAILY"]);
            for vehicle in rows.iter() {
              table.row(vehicle_row(vehicle, &types));
            }
            if !table.is_empty() {
              print!("{}", table.render());
            }
          }
          ViewMode::Grid => {
            for vehicle in rows.iter() {
              print!("{}", vehicle_card(vehicle, &types));
            }
          }
        }
      }
      VehiclesCommand::Show { id } => {
        let (vehicle, types) = try_join!(
          load(vehicles::detail_query(&self.api, &id)),
          load(vehicles::types_query(&self.api)),
        )?;
        print!("{}", vehicle_card(&vehicle, &types));
      }
      VehiclesCommand::SetStatus { id, status } => {
        let vehicle = submit(vehicles::update_status(&self.api), (id, status)).await?;
        println!(
          "{} {} ({}) is now {}",
          vehicle.make, vehicle.model, vehicle.license_plate, vehicle.status
        );
      }
      VehiclesCommand::Types => {
        let types = load(vehicles::types_query(&self.api)).await?;
        let mut table = Table::new(&["ID", "NAME", "DAILY", "WEEKLY", "MONTHLY"]);
        for t in types.iter() {
          table.row(vec![
            t.id.clone(),
            t.name.clone(),
            money(t.daily_rate),
            t.weekly_rate.map(money).unwrap_or_else(|| "-".to_string()),
            t.monthly_rate.map(money).unwrap_or_else(|| "-".to_string()),
          ]);
        }
        print_table(&table, "No vehicle types defined");
      }
    }
    Ok(())
  }

  async fn customers(&self, command: CustomersCommand) -> Result<()> {
    match command {
      CustomersCommand::List { status, name } => {
        let rows = load(customers::list_query(&self.api, CustomerFilters { status, name })).await?;
        let mut table = Table::new(&["ID", "NAME", "EMAIL", "PHONE", "STATUS"]);
        for customer in rows.iter() {
          table.row(customer_row(customer));
        }
        print_table(&table, "No customers found");
      }
      CustomersCommand::Show { id } => {
        let (customer, account) = try_join!(
          load(customers::detail_query(&self.api, &id)),
          load(loyalty::account_query(&self.api, &id)),
        )?;
        println!("{}  ({})", customer.full_name, customer.id);
        println!("Status:  {}", customer.status);
        println!("Email:   {}", or_dash(customer.email.as_deref()));
        println!("Phone:   {}", or_dash(customer.phone.as_deref()));
        println!(
          "Loyalty: {} points ({})",
          account.points,
          or_dash(account.tier.as_deref())
        );
      }
      CustomersCommand::SetStatus { id, status } => {
        let customer = submit(customers::update_status(&self.api), (id, status)).await?;
        println!("{} is now {}", customer.full_name, customer.status);
      }
      CustomersCommand::Provision { email, name } => {
        let created = submit(
          customers::provision(&self.api),
          NewCustomer {
            email,
            full_name: name,
          },
        )
        .await?;
        if created.invited {
          println!("Created customer {} and sent an invite", created.user_id);
        } else {
          println!("Created customer {}", created.user_id);
        }
      }
    }
    Ok(())
  }

  async fn agreements(&self, command: AgreementsCommand) -> Result<()> {
    match command {
      AgreementsCommand::List {
        status,
        customer,
        vehicle,
      } => {
        let filters = AgreementFilters {
          status,
          customer_id: customer,
          vehicle_id: vehicle,
        };
        let rows = load(agreements::list_query(&self.api, filters)).await?;
        let mut table = Table::new(&["ID", "NUMBER", "STATUS", "START", "END", "RENT"]);
        for agreement in rows.iter() {
          table.row(vec![
            agreement.id.clone(),
            or_dash(agreement.agreement_number.as_deref()).to_string(),
            agreement.status.to_string(),
            date(Some(agreement.start_date)),
            date(agreement.end_date),
            money(agreement.rent_amount),
          ]);
        }
        print_table(&table, "No agreements found");
      }
      AgreementsCommand::Show { id } => {
        let (agreement, paid) = try_join!(
          load(agreements::detail_query(&self.api, &id)),
          load(payments::list_query(&self.api, &id)),
        )?;
        let collected = payments::total_paid(&paid);
        println!(
          "Agreement {}  ({})",
          or_dash(agreement.agreement_number.as_deref()),
          agreement.id
        );
        println!("Status:      {}", agreement.status);
        println!("Customer:    {}", agreement.customer_id);
        println!("Vehicle:     {}", agreement.vehicle_id);
        println!(
          "Period:      {} to {}",
          date(Some(agreement.start_date)),
          date(agreement.end_date)
        );
        println!("Rent:        {}", money(agreement.rent_amount));
        println!("Paid:        {}", money(collected));
        println!(
          "Outstanding: {}",
          money(agreements::outstanding(&agreement, collected))
        );
      }
      AgreementsCommand::SetStatus { id, status } => {
        let agreement = submit(agreements::update_status(&self.api), (id, status)).await?;
        println!("Agreement {} is now {}", agreement.id, agreement.status);
      }
      AgreementsCommand::Documents { id } => {
        let documents = load(agreements::documents_query(&self.api, &id)).await?;
        let mut table = Table::new(&["ID", "TYPE", "CREATED", "URL"]);
        for doc in documents.iter() {
          table.row(vec![
            doc.id.clone(),
            doc.document_type.clone(),
            doc
              .created_at
              .map(|t| t.date_naive().to_string())
              .unwrap_or_else(|| "-".to_string()),
            or_dash(doc.document_url.as_deref()).to_string(),
          ]);
        }
        print_table(&table, "No documents generated yet");
      }
      AgreementsCommand::GenerateDocument { id, document_type } => {
        let request = DocumentRequest {
          agreement_id: id,
          document_type,
        };
        let document = submit(agreements::generate_document(&self.api), request).await?;
        println!(
          "Generated {} {}",
          document.document_type,
          or_dash(document.document_url.as_deref())
        );
      }
    }
    Ok(())
  }

  async fn maintenance(&self, command: MaintenanceCommand) -> Result<()> {
    match command {
      MaintenanceCommand::List { status, vehicle } => {
        let filters = MaintenanceFilters {
          status,
          vehicle_id: vehicle,
        };
        let rows = load(maintenance::list_query(&self.api, filters)).await?;
        let mut table = Table::new(&["ID", "VEHICLE", "SCHEDULED", "STATUS", "COST", "DESCRIPTION"]);
        for record in rows.iter() {
          table.row(vec![
            record.id.clone(),
            record.vehicle_id.clone(),
            date(Some(record.scheduled_date)),
            record.status.to_string(),
            record.cost.map(money).unwrap_or_else(|| "-".to_string()),
            truncate(&record.description, 40),
          ]);
        }
        print_table(&table, "No maintenance records");
      }
      MaintenanceCommand::Schedule {
        vehicle_id,
        description,
        date: scheduled,
        cost,
      } => {
        let record = maintenance::new_record(&vehicle_id, &description, scheduled, cost);
        let created = submit(maintenance::schedule(&self.api), record).await?;
        println!("Scheduled {} for {}", created.id, date(Some(created.scheduled_date)));
      }
      MaintenanceCommand::SetStatus { id, status } => {
        let record = submit(maintenance::set_status(&self.api), (id, status)).await?;
        println!("Maintenance {} is now {}", record.id, record.status);
      }
      MaintenanceCommand::Delete { id } => {
        // The vehicle id is needed to refresh that vehicle afterwards
        let record = load(maintenance::detail_query(&self.api, &id)).await?;
        let deleted = submit(maintenance::delete(&self.api), RecordRef::from(record.as_ref())).await?;
        println!("Deleted maintenance {}", deleted.id);
      }
    }
    Ok(())
  }

  async fn payments(&self, command: PaymentsCommand) -> Result<()> {
    match command {
      PaymentsCommand::List { agreement_id } => {
        let rows = load(payments::list_query(&self.api, &agreement_id)).await?;
        let mut table = Table::new(&["ID", "DUE", "PAID", "STATUS", "AMOUNT", "METHOD"]);
        for payment in rows.iter() {
          table.row(vec![
            payment.id.clone(),
            date(payment.due_date),
            payment
              .paid_at
              .map(|t| t.date_naive().to_string())
              .unwrap_or_else(|| "-".to_string()),
            payment.status.to_string(),
            money(payment.amount),
            or_dash(payment.payment_method.as_deref()).to_string(),
          ]);
        }
        print_table(&table, "No payments recorded");
        println!("Total paid: {}", money(payments::total_paid(&rows)));
      }
      PaymentsCommand::Record {
        agreement_id,
        amount,
        method,
      } => {
        let payment = payments::new_payment(&agreement_id, amount, method).map_err(|e| eyre!(e))?;
        let recorded = submit(payments::record(&self.api), payment).await?;
        println!("Recorded {} against {}", money(recorded.amount), recorded.agreement_id);
      }
    }
    Ok(())
  }

  async fn loyalty(&self, command: LoyaltyCommand) -> Result<()> {
    match command {
      LoyaltyCommand::Show { customer_id } => {
        let account = load(loyalty::account_query(&self.api, &customer_id)).await?;
        println!(
          "{}: {} points ({})",
          account.customer_id,
          account.points,
          or_dash(account.tier.as_deref())
        );
      }
      LoyaltyCommand::Award {
        customer_id,
        points,
        reason,
      } => {
        let award = loyalty::Award {
          customer_id,
          points,
          reason,
        };
        let awarded = submit(loyalty::award_points(&self.api), award).await?;
        // Read back through the cache; the award made the old balance stale
        let account = load(loyalty::account_query(&self.api, &awarded.customer_id)).await?;
        println!(
          "Awarded {} points, balance {}",
          awarded.points, account.points
        );
      }
    }
    Ok(())
  }

  async fn search(&self, query: &str) -> Result<()> {
    let results = self.search.search(query).await;
    print!("{}", render_search(&results));
    if results.is_total_failure() {
      return Err(eyre!("Search failed for every category"));
    }
    Ok(())
  }
}

/// Local preferences never touch the backend, so they run without an `App`.
pub fn run_prefs(prefs: &PreferenceStore, command: PrefsCommand) -> Result<()> {
  match command {
    PrefsCommand::List => {
      for (key, value) in prefs.all()? {
        println!("{} = {}", key, value);
      }
    }
    PrefsCommand::Get { key } => match prefs.get(&key)? {
      Some(value) => println!("{}", value),
      None => println!("{} is not set", key),
    },
    PrefsCommand::Set { key, value } => {
      if key == VEHICLE_VIEW_MODE {
        value.parse::<ViewMode>().map_err(|e| eyre!(e))?;
      }
      prefs.set(&key, &value)?;
      println!("{} = {}", key, value);
    }
    PrefsCommand::Unset { key } => {
      if !prefs.remove(&key)? {
        println!("{} was not set", key);
      }
    }
  }
  Ok(())
}

/// Run a data hook to completion and hand back its value.
async fn load<T: Send + Sync + 'static>(mut query: Query<T>) -> Result<Arc<T>> {
  query.fetch();
  query.settle().await;
  if let Some(err) = query.error() {
    return Err(eyre!("Failed to load {}: {}", query.key(), err));
  }
  let key = query.key().to_string();
  query
    .into_data()
    .ok_or_else(|| eyre!("Nothing loaded for {}", key))
}

async fn submit<I, O>(mutation: Mutation<I, O>, input: I) -> Result<O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  mutation.mutate(input).await.map_err(|e| eyre!(e))
}

fn print_table(table: &Table, empty: &str) {
  if table.is_empty() {
    println!("{}", empty);
  } else {
    print!("{}", table.render());
  }
}

fn rate(vehicle: &Vehicle, types: &[VehicleType]) -> String {
  vehicles::effective_daily_rate(vehicle, types)
    .map(money)
    .unwrap_or_else(|| "-".to_string())
}

fn vehicle_row(vehicle: &Vehicle, types: &[VehicleType]) -> Vec<String> {
  vec![
    vehicle.id.clone(),
    truncate(&format!("{} {}", vehicle.make, vehicle.model), 28),
    vehicle.license_plate.clone(),
    vehicle.status.to_string(),
    rate(vehicle, types),
  ]
}

fn vehicle_card(vehicle: &Vehicle, types: &[VehicleType]) -> String {
  let year = vehicle.year.map(|y| format!(" {}", y)).unwrap_or_default();
  format!(
    "{} {}{}  [{}]\n  id:     {}\n  plate:  {}\n  type:   {}\n  daily:  {}\n\n",
    vehicle.make,
    vehicle.model,
    year,
    vehicle.status,
    vehicle.id,
    vehicle.license_plate,
    vehicles::type_name(vehicle, types).unwrap_or("-"),
    rate(vehicle, types),
  )
}

fn customer_row(customer: &Customer) -> Vec<String> {
  vec![
    customer.id.clone(),
    truncate(&customer.full_name, 28),
    or_dash(customer.email.as_deref()).to_string(),
    or_dash(customer.phone.as_deref()).to_string(),
    customer.status.to_string(),
  ]
}

fn render_dashboard(stats: &dashboard::DashboardStats) -> String {
  format!(
    "Fleet\n  vehicles:      {}\n  available:     {}\n  rented:        {}\n  in maintenance: {}\n  utilization:   {:.1}%\n\
     Agreements\n  active:        {}\n  overdue:       {}\n\
     Maintenance\n  open:          {}\n  scheduled cost: {}\n\
     Revenue\n  collected:     {}\n  pending:       {}\n",
    stats.total_vehicles,
    stats.available_vehicles,
    stats.rented_vehicles,
    stats.vehicles_in_maintenance,
    stats.utilization,
    stats.active_agreements,
    stats.overdue_agreements,
    stats.open_maintenance,
    money(stats.scheduled_maintenance_cost),
    money(stats.revenue_collected),
    money(stats.payments_pending),
  )
}

fn render_search(results: &SearchResults) -> String {
  let mut out = String::new();
  if results.is_empty() && results.failures.is_empty() {
    out.push_str("No matches\n");
    return out;
  }

  if !results.vehicles.is_empty() {
    let mut table = Table::new(&["ID", "VEHICLE", "PLATE", "STATUS", "DAILY"]);
    for vehicle in &results.vehicles {
      table.row(vehicle_row(vehicle, &[]));
    }
    out.push_str("Vehicles\n");
    out.push_str(&table.render());
  }
  if !results.customers.is_empty() {
    let mut table = Table::new(&["ID", "NAME", "EMAIL", "PHONE", "STATUS"]);
    for customer in &results.customers {
      table.row(customer_row(customer));
    }
    out.push_str("Customers\n");
    out.push_str(&table.render());
  }
  if !results.agreements.is_empty() {
    let mut table = Table::new(&["ID", "NUMBER", "STATUS", "START"]);
    for agreement in &results.agreements {
      table.row(vec![
        agreement.id.clone(),
        or_dash(agreement.agreement_number.as_deref()).to_string(),
        agreement.status.to_string(),
        date(Some(agreement.start_date)),
      ]);
    }
    out.push_str("Agreements\n");
    out.push_str(&table.render());
  }
  for failure in &results.failures {
    out.push_str(&format!("({} unavailable)\n", failure.category));
  }
  out
}
