//! Composable cache keys.

use std::fmt;

/// A single primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyPart {
  Null,
  Bool(bool),
  Int(i64),
  Str(String),
}

impl fmt::Display for KeyPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPart::Null => write!(f, "null"),
      KeyPart::Bool(b) => write!(f, "{}", b),
      KeyPart::Int(n) => write!(f, "{}", n),
      KeyPart::Str(s) => write!(f, "{:?}", s),
    }
  }
}

impl From<&str> for KeyPart {
  fn from(value: &str) -> Self {
    KeyPart::Str(value.to_string())
  }
}

impl From<String> for KeyPart {
  fn from(value: String) -> Self {
    KeyPart::Str(value)
  }
}

impl From<&String> for KeyPart {
  fn from(value: &String) -> Self {
    KeyPart::Str(value.clone())
  }
}

impl From<i64> for KeyPart {
  fn from(value: i64) -> Self {
    KeyPart::Int(value)
  }
}

impl From<i32> for KeyPart {
  fn from(value: i32) -> Self {
    KeyPart::Int(value.into())
  }
}

impl From<usize> for KeyPart {
  fn from(value: usize) -> Self {
    KeyPart::Int(i64::try_from(value).unwrap_or(i64::MAX))
  }
}

impl From<bool> for KeyPart {
  fn from(value: bool) -> Self {
    KeyPart::Bool(value)
  }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
  fn from(value: Option<T>) -> Self {
    value.map(Into::into).unwrap_or(KeyPart::Null)
  }
}

/// Ordered identifier for a cached query: a resource name followed by parameters.
///
/// Equal sequences address the same cache entry. A key is a prefix of another
/// when its parts are the leading parts of the other, which is what prefix
/// invalidation matches on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
  /// Start a key with its resource name.
  pub fn new(resource: impl Into<KeyPart>) -> Self {
    Self(vec![resource.into()])
  }

  pub fn from_parts(parts: Vec<KeyPart>) -> Self {
    Self(parts)
  }

  /// Append a parameter.
  pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
    self.0.push(part.into());
    self
  }

  pub fn parts(&self) -> &[KeyPart] {
    &self.0
  }

  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.0.starts_with(&prefix.0)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[")?;
    for (i, part) in self.0.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{}", part)?;
    }
    write!(f, "]")
  }
}

/// Selects which entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
  /// Only the entry with exactly this key
  Exact(QueryKey),
  /// Every entry whose key starts with this key (including the key itself)
  Prefix(QueryKey),
}

impl KeyFilter {
  pub fn exact(key: QueryKey) -> Self {
    KeyFilter::Exact(key)
  }

  pub fn prefix(key: QueryKey) -> Self {
    KeyFilter::Prefix(key)
  }

  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      KeyFilter::Exact(k) => k == key,
      KeyFilter::Prefix(p) => key.starts_with(p),
    }
  }
}

impl fmt::Display for KeyFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyFilter::Exact(k) => write!(f, "{}", k),
      KeyFilter::Prefix(k) => write!(f, "{}*", k),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_equal_sequences_are_equal_keys() {
    let a = QueryKey::new("leads").with("detail").with("abc");
    let b = QueryKey::from_parts(vec!["leads".into(), "detail".into(), "abc".into()]);
    assert_eq!(a, b);
  }

  #[test]
  fn test_part_types_are_distinct() {
    let a = QueryKey::new("vehicles").with(5);
    let b = QueryKey::new("vehicles").with("5");
    assert_ne!(a, b);
  }

  #[test]
  fn test_prefix_filter() {
    let filter = KeyFilter::prefix(QueryKey::new("leads"));
    assert!(filter.matches(&QueryKey::new("leads")));
    assert!(filter.matches(&QueryKey::new("leads").with("list").with(KeyPart::Null)));
    assert!(!filter.matches(&QueryKey::new("lead_tasks").with("abc")));
    assert!(!filter.matches(&QueryKey::new("customers")));
  }

  #[test]
  fn test_exact_filter() {
    let key = QueryKey::new("leads").with("detail").with("abc");
    let filter = KeyFilter::exact(key.clone());
    assert!(filter.matches(&key));
    assert!(!filter.matches(&QueryKey::new("leads")));
    assert!(!filter.matches(&key.clone().with("extra")));
  }

  #[test]
  fn test_option_parts() {
    let none: Option<&str> = None;
    assert_eq!(KeyPart::from(none), KeyPart::Null);
    assert_eq!(KeyPart::from(Some("x")), KeyPart::Str("x".to_string()));
  }

  #[test]
  fn test_display() {
    let key = QueryKey::new("leads").with("list").with(KeyPart::Null).with(3);
    assert_eq!(key.to_string(), r#"["leads", "list", null, 3]"#);
    assert_eq!(
      KeyFilter::prefix(QueryKey::new("leads")).to_string(),
      r#"["leads"]*"#
    );
  }
}
