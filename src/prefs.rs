//! Local user preferences persisted as key/value strings.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

/// Preference key for how vehicle lists are printed
pub const VEHICLE_VIEW_MODE: &str = "vehicles.view_mode";

/// Schema for the preference table.
const PREFS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS preferences (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed preference store.
pub struct PreferenceStore {
  conn: Mutex<Connection>,
}

impl PreferenceStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open (or create) the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create preferences directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open preferences at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("rentdesk").join("prefs.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(PREFS_SCHEMA)
      .map_err(|e| eyre!("Failed to run preference migrations: {}", e))?;

    Ok(())
  }

  pub fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row(
        "SELECT value FROM preferences WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read preference {}: {}", key, e))
  }

  pub fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO preferences (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to store preference {}: {}", key, e))?;

    Ok(())
  }

  pub fn remove(&self, key: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute("DELETE FROM preferences WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove preference {}: {}", key, e))?;

    Ok(removed > 0)
  }

  /// All stored preferences, ordered by key.
  pub fn all(&self) -> Result<Vec<(String, String)>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT key, value FROM preferences ORDER BY key")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
      .map_err(|e| eyre!("Failed to read preferences: {}", e))?
      .collect::<rusqlite::Result<Vec<(String, String)>>>()
      .map_err(|e| eyre!("Failed to read preferences: {}", e))?;

    Ok(rows)
  }

  /// Read a typed preference, falling back to its default when unset or
  /// unparseable.
  pub fn get_or_default<T: FromStr + Default>(&self, key: &str) -> Result<T> {
    Ok(
      self
        .get(key)?
        .and_then(|v| v.parse().ok())
        .unwrap_or_default(),
    )
  }
}

/// How vehicle lists are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
  /// One line per vehicle
  #[default]
  List,
  /// A block per vehicle with rates and type
  Grid,
}

impl fmt::Display for ViewMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ViewMode::List => f.write_str("list"),
      ViewMode::Grid => f.write_str("grid"),
    }
  }
}

impl FromStr for ViewMode {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "list" => Ok(ViewMode::List),
      "grid" => Ok(ViewMode::Grid),
      other => Err(format!("unknown view mode '{}' (expected list or grid)", other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_remove() {
    let dir = tempfile::tempdir().unwrap();
    let store = PreferenceStore::open_at(&dir.path().join("prefs.db")).unwrap();

    assert_eq!(store.get(VEHICLE_VIEW_MODE).unwrap(), None);
    store.set(VEHICLE_VIEW_MODE, "grid").unwrap();
    assert_eq!(store.get(VEHICLE_VIEW_MODE).unwrap().as_deref(), Some("grid"));

    store.set(VEHICLE_VIEW_MODE, "list").unwrap();
    assert_eq!(store.get(VEHICLE_VIEW_MODE).unwrap().as_deref(), Some("list"));

    assert!(store.remove(VEHICLE_VIEW_MODE).unwrap());
    assert!(!store.remove(VEHICLE_VIEW_MODE).unwrap());
  }

  #[test]
  fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("prefs.db");

    {
      let store = PreferenceStore::open_at(&path).unwrap();
      store.set("dashboard.refresh_secs", "15").unwrap();
      store.set(VEHICLE_VIEW_MODE, "grid").unwrap();
    }

    let store = PreferenceStore::open_at(&path).unwrap();
    assert_eq!(
      store.all().unwrap(),
      vec![
        ("dashboard.refresh_secs".to_string(), "15".to_string()),
        (VEHICLE_VIEW_MODE.to_string(), "grid".to_string()),
      ]
    );
  }

  #[test]
  fn test_typed_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = PreferenceStore::open_at(&dir.path().join("prefs.db")).unwrap();

    assert_eq!(store.get_or_default::<ViewMode>(VEHICLE_VIEW_MODE).unwrap(), ViewMode::List);
    store.set(VEHICLE_VIEW_MODE, "bogus").unwrap();
    assert_eq!(store.get_or_default::<ViewMode>(VEHICLE_VIEW_MODE).unwrap(), ViewMode::List);
    store.set(VEHICLE_VIEW_MODE, "Grid").unwrap();
    assert_eq!(store.get_or_default::<ViewMode>(VEHICLE_VIEW_MODE).unwrap(), ViewMode::Grid);
  }
}
