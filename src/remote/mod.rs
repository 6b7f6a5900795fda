//! Client for the hosted database: REST tables, RPC functions and edge functions.

pub mod api_types;
mod client;
mod error;
pub mod filter;
pub mod types;

pub use client::RemoteClient;
pub use error::RemoteError;
pub use filter::{Filter, Order, Select};
