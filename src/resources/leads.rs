//! Sales leads with their follow-up tasks and communication log.

use chrono::NaiveDate;

use crate::cache::{KeyFilter, QueryKey};
use crate::mutation::Mutation;
use crate::query::Query;
use crate::remote::types::{
  Lead, LeadCommunication, LeadStatus, LeadTask, NewLeadCommunication, NewLeadTask, StatusPatch,
};
use crate::remote::{Filter, Order, RemoteClient, RemoteError, Select};

use super::{dashboard_filter, Api};

const TABLE: &str = "sales_leads";
const TASKS_TABLE: &str = "lead_tasks";
const COMMUNICATIONS_TABLE: &str = "lead_communications";

pub mod keys {
  use super::LeadFilters;
  use crate::cache::QueryKey;

  pub fn all() -> QueryKey {
    QueryKey::new("leads")
  }

  pub fn lists() -> QueryKey {
    all().with("list")
  }

  pub fn list(filters: &LeadFilters) -> QueryKey {
    lists()
      .with(filters.status.map(|s| s.as_str()))
      .with(filters.assigned_to.as_ref())
      .with(filters.min_score)
  }

  pub fn detail(id: &str) -> QueryKey {
    all().with("detail").with(id)
  }

  pub fn tasks(lead_id: &str) -> QueryKey {
    QueryKey::new("lead_tasks").with(lead_id)
  }

  pub fn communications(lead_id: &str) -> QueryKey {
    QueryKey::new("lead_communications").with(lead_id)
  }
}

/// Narrowing for the lead list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilters {
  pub status: Option<LeadStatus>,
  pub assigned_to: Option<String>,
  pub min_score: Option<i32>,
}

impl LeadFilters {
  pub fn select(&self) -> Select {
    Select::from(TABLE)
      .filter_opt(self.status, |s| Filter::eq("status", s))
      .filter_opt(self.assigned_to.as_deref(), |u| Filter::eq("assigned_to", u))
      .filter_opt(self.min_score, |s| Filter::gte("score", s))
      .order_by("score", Order::Desc)
      .order_by("created_at", Order::Desc)
  }
}

pub async fn fetch_leads(remote: &RemoteClient, filters: &LeadFilters) -> Result<Vec<Lead>, RemoteError> {
  remote.select(&filters.select()).await
}

pub async fn fetch_lead(remote: &RemoteClient, id: &str) -> Result<Lead, RemoteError> {
  remote
    .select_one(&Select::from(TABLE).filter(Filter::eq("id", id)))
    .await
}

pub async fn fetch_tasks(remote: &RemoteClient, lead_id: &str) -> Result<Vec<LeadTask>, RemoteError> {
  let select = Select::from(TASKS_TABLE)
    .filter(Filter::eq("lead_id", lead_id))
    .order_by("completed", Order::Asc)
    .order_by("due_date", Order::Asc);
  remote.select(&select).await
}

pub async fn fetch_communications(
  remote: &RemoteClient,
  lead_id: &str,
) -> Result<Vec<LeadCommunication>, RemoteError> {
  let select = Select::from(COMMUNICATIONS_TABLE)
    .filter(Filter::eq("lead_id", lead_id))
    .order_by("created_at", Order::Desc);
  remote.select(&select).await
}

pub fn list_query(api: &Api, filters: LeadFilters) -> Query<Vec<Lead>> {
  api.query(keys::list(&filters), move |remote| {
    let filters = filters.clone();
    async move { fetch_leads(&remote, &filters).await }
  })
}

pub fn detail_query(api: &Api, id: &str) -> Query<Lead> {
  let id = id.to_string();
  api.query(keys::detail(&id), move |remote| {
    let id = id.clone();
    async move { fetch_lead(&remote, &id).await }
  })
}

pub fn tasks_query(api: &Api, lead_id: &str) -> Query<Vec<LeadTask>> {
  let lead_id = lead_id.to_string();
  api.query(keys::tasks(&lead_id), move |remote| {
    let lead_id = lead_id.clone();
    async move { fetch_tasks(&remote, &lead_id).await }
  })
}

pub fn communications_query(api: &Api, lead_id: &str) -> Query<Vec<LeadCommunication>> {
  let lead_id = lead_id.to_string();
  api.query(keys::communications(&lead_id), move |remote| {
    let lead_id = lead_id.clone();
    async move { fetch_communications(&remote, &lead_id).await }
  })
}

/// A lead row changed: every list may now sort or filter differently, and
/// lead counts feed the dashboard.
pub fn lead_invalidations(_lead: &Lead) -> Vec<KeyFilter> {
  vec![KeyFilter::prefix(keys::all()), dashboard_filter()]
}

/// Something under a lead changed: its own collection and the lead detail.
fn child_invalidations(collection: QueryKey, lead_id: &str) -> Vec<KeyFilter> {
  vec![
    KeyFilter::exact(collection),
    KeyFilter::exact(keys::detail(lead_id)),
  ]
}

pub fn task_invalidations(task: &LeadTask) -> Vec<KeyFilter> {
  child_invalidations(keys::tasks(&task.lead_id), &task.lead_id)
}

pub fn communication_invalidations(entry: &LeadCommunication) -> Vec<KeyFilter> {
  child_invalidations(keys::communications(&entry.lead_id), &entry.lead_id)
}

/// Move a lead through the pipeline.
pub fn update_status(api: &Api) -> Mutation<(String, LeadStatus), Lead> {
  api
    .mutation("Lead status updated", |remote, (id, status): (String, LeadStatus)| async move {
      remote
        .update_by_id(TABLE, &id, &StatusPatch { status })
        .await
    })
    .invalidates_with(lead_invalidations)
}

#[derive(serde::Serialize)]
struct AssignPatch {
  assigned_to: Option<String>,
}

/// Assign a lead to a staff member, or unassign with `None`.
pub fn assign(api: &Api) -> Mutation<(String, Option<String>), Lead> {
  api
    .mutation("Lead assigned", |remote, (id, assignee): (String, Option<String>)| async move {
      remote
        .update_by_id(TABLE, &id, &AssignPatch { assigned_to: assignee })
        .await
    })
    .invalidates_with(lead_invalidations)
}

pub fn add_task(api: &Api) -> Mutation<NewLeadTask, LeadTask> {
  api
    .mutation("Task added", |remote, task: NewLeadTask| async move {
      remote.insert(TASKS_TABLE, &task).await
    })
    .invalidates_with(task_invalidations)
}

#[derive(serde::Serialize)]
struct CompletePatch {
  completed: bool,
}

pub fn complete_task(api: &Api) -> Mutation<String, LeadTask> {
  api
    .mutation("Task completed", |remote, task_id: String| async move {
      remote
        .update_by_id(TASKS_TABLE, &task_id, &CompletePatch { completed: true })
        .await
    })
    .invalidates_with(task_invalidations)
}

pub fn log_communication(api: &Api) -> Mutation<NewLeadCommunication, LeadCommunication> {
  api
    .mutation("Communication logged", |remote, entry: NewLeadCommunication| async move {
      remote.insert(COMMUNICATIONS_TABLE, &entry).await
    })
    .invalidates_with(communication_invalidations)
}

/// Build a task payload, trimming the title.
pub fn new_task(lead_id: &str, title: &str, due_date: Option<NaiveDate>) -> NewLeadTask {
  NewLeadTask {
    lead_id: lead_id.to_string(),
    title: title.trim().to_string(),
    due_date,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::QueryError;
  use crate::resources::testing::{api, seed, staleness};
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn lead(id: &str, status: LeadStatus) -> Lead {
    Lead {
      id: id.to_string(),
      full_name: "Dana Reyes".to_string(),
      email: None,
      phone: None,
      score: 40,
      status,
      assigned_to: None,
      source: None,
      created_at: None,
    }
  }

  #[test]
  fn test_filters_render_select() {
    let filters = LeadFilters {
      status: Some(LeadStatus::Qualified),
      assigned_to: None,
      min_score: Some(50),
    };
    let pairs = filters.select().query_pairs();
    assert!(pairs.contains(&("status".to_string(), "eq.qualified".to_string())));
    assert!(pairs.contains(&("score".to_string(), "gte.50".to_string())));
    assert!(!pairs.iter().any(|(k, _)| k == "assigned_to"));
  }

  #[test]
  fn test_list_keys_differ_by_filters() {
    let open = keys::list(&LeadFilters::default());
    let qualified = keys::list(&LeadFilters {
      status: Some(LeadStatus::Qualified),
      ..LeadFilters::default()
    });
    assert_ne!(open, qualified);
    assert!(open.starts_with(&keys::lists()));
    assert_eq!(qualified.to_string(), r#"["leads", "list", "qualified", null, null]"#);
  }

  #[tokio::test]
  async fn test_status_change_refetches_list_and_detail() {
    let (api, _notifications) = api();
    let list_fetches = Arc::new(AtomicU32::new(0));
    let detail_fetches = Arc::new(AtomicU32::new(0));

    let counter = list_fetches.clone();
    let mut list: Query<Vec<Lead>> =
      Query::new(&api.cache, keys::list(&LeadFilters::default()), move || {
        let counter = counter.clone();
        async move {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok::<_, QueryError>(vec![lead("l-1", LeadStatus::New)])
        }
      });
    let counter = detail_fetches.clone();
    let mut detail: Query<Lead> = Query::new(&api.cache, keys::detail("l-1"), move || {
      let counter = counter.clone();
      async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok::<_, QueryError>(lead("l-1", LeadStatus::New))
      }
    });

    list.fetch();
    detail.fetch();
    list.settle().await;
    detail.settle().await;

    let mutation = Mutation::new(
      &api.cache,
      &api.notifier,
      "Lead status updated",
      |(id, status): (String, LeadStatus)| async move { Ok::<_, QueryError>(lead(&id, status)) },
    )
    .invalidates_with(lead_invalidations);
    mutation
      .mutate(("l-1".to_string(), LeadStatus::Contacted))
      .await
      .unwrap();

    assert!(list.poll());
    assert!(detail.poll());
    list.settle().await;
    detail.settle().await;

    assert_eq!(list_fetches.load(Ordering::SeqCst), 2);
    assert_eq!(detail_fetches.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_task_write_touches_only_that_lead() {
    let (api, _notifications) = api();
    let touched = [keys::tasks("l-1"), keys::detail("l-1")];
    let untouched = [keys::tasks("l-2"), keys::detail("l-2"), keys::lists()];
    seed(&api.cache, &touched);
    seed(&api.cache, &untouched);

    let task = LeadTask {
      id: "t-1".to_string(),
      lead_id: "l-1".to_string(),
      title: "Call back".to_string(),
      due_date: None,
      completed: true,
      assigned_to: None,
    };
    for filter in task_invalidations(&task) {
      api.cache.invalidate(&filter);
    }

    assert_eq!(staleness(&api.cache, &touched), vec![true, true]);
    assert_eq!(staleness(&api.cache, &untouched), vec![false, false, false]);
  }

  #[test]
  fn test_new_task_trims_title() {
    let task = new_task("l-1", "  Send quote  ", None);
    assert_eq!(task.title, "Send quote");
  }
}
