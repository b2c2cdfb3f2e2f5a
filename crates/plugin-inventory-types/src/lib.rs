//! Data model and error kinds shared across the plugin inventory workspace.

pub mod descriptor;
pub mod entry;
pub mod error;
pub mod group;
pub mod installation;
pub mod recommendation;
pub mod source;
pub mod target;
pub mod version;

pub use descriptor::PluginDescriptor;
pub use entry::PluginEntry;
pub use error::{Error, Result, ResultExt};
pub use group::{GroupMember, PluginGroup};
pub use installation::{InstallScope, InstallationRecord};
pub use recommendation::{merge_recommendations, Recommendation};
pub use source::{DiscoverySource, RawDiscoverySourceRecord, RawSourceError};
pub use target::Target;
pub use version::Version;
