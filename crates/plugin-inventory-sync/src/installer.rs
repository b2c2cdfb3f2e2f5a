//! Installer contract (external collaborator, §6): given a resolved
//! descriptor for the current OS/arch, pulls the plugin binary image,
//! verifies it, unpacks it to a known plugin directory, and makes it
//! executable. The sync engine only depends on this trait; a concrete
//! implementation (shelling out to the host package manager, or reusing
//! `plugin_inventory_oci`'s pull/verify primitives) lives with the CLI.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use plugin_inventory_types::{InstallationRecord, PluginDescriptor, Result};

#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, descriptor: &PluginDescriptor, cancel: &CancellationToken) -> Result<()>;
    async fn uninstall(&self, record: &InstallationRecord, cancel: &CancellationToken) -> Result<()>;
}
