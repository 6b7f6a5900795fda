//! Typed query builder for the REST data API.
//!
//! Each resource builds a [`Select`] from its own filter struct instead of
//! assembling query strings by hand. `Select::query_pairs` renders the
//! PostgREST-style parameters (`status=eq.active`, `or=(...)`, `limit=5`).

/// A row predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Eq(String, String),
  Gte(String, String),
  /// Case-insensitive pattern match; `*` is the wildcard
  ILike(String, String),
  In(String, Vec<String>),
  /// Any of the inner predicates
  Or(Vec<Filter>),
}

impl Filter {
  pub fn eq(column: &str, value: impl ToString) -> Self {
    Filter::Eq(column.to_string(), value.to_string())
  }

  pub fn gte(column: &str, value: impl ToString) -> Self {
    Filter::Gte(column.to_string(), value.to_string())
  }

  pub fn in_list<I, S>(column: &str, values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: ToString,
  {
    Filter::In(
      column.to_string(),
      values.into_iter().map(|v| v.to_string()).collect(),
    )
  }

  /// `column` contains `term`, ignoring case.
  pub fn contains(column: &str, term: &str) -> Self {
    Filter::ILike(column.to_string(), format!("*{}*", sanitize_term(term)))
  }

  pub fn or(filters: Vec<Filter>) -> Self {
    Filter::Or(filters)
  }

  /// Render as a top-level `(name, value)` query parameter.
  pub fn to_pair(&self) -> (String, String) {
    match self {
      Filter::Or(inner) => ("or".to_string(), render_group(inner)),
      _ => self.column_expr(),
    }
  }

  /// Render for use inside an `or=(...)` group: `column.op.value`.
  fn to_inline(&self) -> String {
    match self {
      Filter::Or(inner) => format!("or{}", render_group(inner)),
      _ => {
        let (column, expr) = self.column_expr();
        format!("{}.{}", column, expr)
      }
    }
  }

  fn column_expr(&self) -> (String, String) {
    match self {
      Filter::Eq(c, v) => (c.clone(), format!("eq.{}", v)),
      Filter::Gte(c, v) => (c.clone(), format!("gte.{}", v)),
      Filter::ILike(c, p) => (c.clone(), format!("ilike.{}", p)),
      Filter::In(c, values) => (c.clone(), format!("in.({})", values.join(","))),
      Filter::Or(_) => unreachable!("or groups are rendered by the caller"),
    }
  }
}

fn render_group(filters: &[Filter]) -> String {
  let inner: Vec<String> = filters.iter().map(Filter::to_inline).collect();
  format!("({})", inner.join(","))
}

/// Strip characters that carry meaning in filter syntax.
pub fn sanitize_term(term: &str) -> String {
  term
    .trim()
    .chars()
    .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '"' | '\\' | ':'))
    .collect()
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
  Asc,
  Desc,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
  table: String,
  filters: Vec<Filter>,
  order: Vec<(String, Order)>,
  limit: Option<usize>,
}

impl Select {
  pub fn from(table: &str) -> Self {
    Self {
      table: table.to_string(),
      filters: Vec::new(),
      order: Vec::new(),
      limit: None,
    }
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filters.push(filter);
    self
  }

  /// Add a filter only when a value is present.
  pub fn filter_opt<T>(mut self, value: Option<T>, build: impl FnOnce(T) -> Filter) -> Self {
    if let Some(v) = value {
      self.filters.push(build(v));
    }
    self
  }

  pub fn order_by(mut self, column: &str, order: Order) -> Self {
    self.order.push((column.to_string(), order));
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn table(&self) -> &str {
    &self.table
  }

  pub fn filters(&self) -> &[Filter] {
    &self.filters
  }

  pub fn query_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), "*".to_string())];
    pairs.extend(self.filters.iter().map(Filter::to_pair));

    if !self.order.is_empty() {
      let order: Vec<String> = self
        .order
        .iter()
        .map(|(column, dir)| match dir {
          Order::Asc => format!("{}.asc", column),
          Order::Desc => format!("{}.desc", column),
        })
        .collect();
      pairs.push(("order".to_string(), order.join(",")));
    }
    if let Some(limit) = self.limit {
      pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
  }
}
