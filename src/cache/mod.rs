//! In-memory query cache shared by every data and mutation hook.
//!
//! This module provides a resource-agnostic caching mechanism that:
//! - Addresses entries by composable keys (`["leads", "detail", id]`)
//! - Serves fresh values inside a staleness window without network calls
//! - Shares one in-flight request between concurrent readers of a key
//! - Invalidates by exact key or by key prefix and notifies observers
//! - Keeps the last good value when a fetch fails
//!
//! Nothing is persisted; the cache lives as long as the process.

mod entry;
mod error;
mod key;
mod layer;

pub use entry::CacheEvent;
pub use error::QueryError;
pub use key::{KeyFilter, QueryKey};
pub use layer::{CacheOptions, QueryClient};
