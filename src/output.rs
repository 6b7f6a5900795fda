//! Plain-text rendering helpers for command output.

use chrono::NaiveDate;
use std::fmt::Write;

/// Truncate a string to a maximum number of characters, adding "..." if
/// truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Format an amount with two decimals and thousands separators.
pub fn money(amount: f64) -> String {
  let cents = (amount.abs() * 100.0).round() as u64;
  let whole = (cents / 100).to_string();
  let mut grouped = String::new();
  for (i, c) in whole.chars().enumerate() {
    if i > 0 && (whole.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(c);
  }
  let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
  format!("{}{}.{:02}", sign, grouped, cents % 100)
}

pub fn date(d: Option<NaiveDate>) -> String {
  d.map(|d| d.format("%Y-%m-%d").to_string())
    .unwrap_or_else(|| "-".to_string())
}

pub fn or_dash(value: Option<&str>) -> &str {
  match value {
    Some(v) if !v.is_empty() => v,
    _ => "-",
  }
}

/// Left-aligned columns sized to their widest cell.
pub struct Table {
  headers: Vec<&'static str>,
  rows: Vec<Vec<String>>,
}

impl Table {
  pub fn new(headers: &[&'static str]) -> Self {
    Self {
      headers: headers.to_vec(),
      rows: Vec::new(),
    }
  }

  pub fn row(&mut self, cells: Vec<String>) {
    self.rows.push(cells);
  }

  pub fn is_empty(&self) -> bool {
    self.rows.is_empty()
  }

  pub fn render(&self) -> String {
    let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
    for row in &self.rows {
      for (i, cell) in row.iter().enumerate() {
        if let Some(w) = widths.get_mut(i) {
          *w = (*w).max(cell.chars().count());
        }
      }
    }

    let mut out = String::new();
    let header: Vec<String> = self.headers.iter().map(|h| h.to_string()).collect();
    for line in std::iter::once(&header).chain(self.rows.iter()) {
      let cells: Vec<String> = line
        .iter()
        .zip(&widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = w))
        .collect();
      let _ = writeln!(out, "{}", cells.join("  ").trim_end());
    }
    out
  }
}
