//! Sync Engine, Data Store, and local installation-record bookkeeping.

pub mod data_store;
pub mod engine;
pub mod installation_store;
pub mod installer;
pub mod reporter;

pub use data_store::DataStore;
pub use engine::SyncEngine;
pub use installation_store::InstallationStore;
pub use installer::Installer;
pub use reporter::{CollectingReporter, Reporter, SyncReport, SyncStatus, SyncSummary};
