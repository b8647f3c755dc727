//! Run-based conversation backend: domain types and the port adapters implement.

pub mod client;
pub mod types;
