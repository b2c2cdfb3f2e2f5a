//! SQLite-backed plugin catalogue reader.

pub mod filter;
pub mod query;
pub mod schema;

pub use filter::{GroupFilter, PluginFilter};
pub use query::InventoryStore;
pub use schema::ensure_schema;
