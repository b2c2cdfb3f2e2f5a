//! Default [`Installer`] implementation: pulls the plugin binary image via
//! the same OCI client the inventory cache uses, verifies its signature,
//! unpacks it into the per-plugin install directory, and marks the binary
//! executable.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio_util::sync::CancellationToken;

use plugin_inventory_oci::{HttpOciClient, OciClient, SignatureVerifier};
use plugin_inventory_sync::Installer;
use plugin_inventory_types::{Error, InstallationRecord, PluginDescriptor, Result};

pub struct DefaultInstaller {
    install_root: PathBuf,
    oci_client: Arc<dyn OciClient>,
    signature_verifier: Option<SignatureVerifier>,
}

impl DefaultInstaller {
    pub fn new(install_root: PathBuf) -> Self {
        Self {
            install_root,
            oci_client: Arc::new(HttpOciClient::default()),
            signature_verifier: None,
        }
    }

    pub fn with_signature_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.signature_verifier = Some(verifier);
        self
    }

    fn plugin_dir(&self, descriptor: &PluginDescriptor) -> PathBuf {
        self.install_root
            .join(&descriptor.name)
            .join(descriptor.target.to_string())
            .join(descriptor.version.to_string())
    }
}

#[async_trait]
impl Installer for DefaultInstaller {
    async fn install(&self, descriptor: &PluginDescriptor, cancel: &CancellationToken) -> Result<()> {
        let dest = self.plugin_dir(descriptor);
        if let Some(verifier) = &self.signature_verifier {
            let signature = self
                .oci_client
                .resolve_image_signature(&descriptor.image_uri, cancel)
                .await?;
            verifier.verify(&descriptor.image_uri, descriptor.digest.as_bytes(), signature.as_deref())?;
        }

        self.oci_client
            .pull_image_to_dir(&descriptor.image_uri, &dest, cancel)
            .await
            .map_err(|e| {
                Error::InstallFailed {
                    name: descriptor.name.clone(),
                    target: descriptor.target.to_string(),
                    version: descriptor.version.to_string(),
                    reason: e.to_string(),
                }
            })?;

        mark_executables(&dest)?;
        info!("installed {}/{}@{}", descriptor.name, descriptor.target, descriptor.version);
        Ok(())
    }

    async fn uninstall(&self, record: &InstallationRecord, _cancel: &CancellationToken) -> Result<()> {
        let dest = self
            .install_root
            .join(&record.name)
            .join(record.target.to_string())
            .join(record.version.to_string());
        if dest.exists() {
            std::fs::remove_dir_all(&dest)?;
        }
        info!("uninstalled {}/{}@{}", record.name, record.target, record.version);
        Ok(())
    }
}

#[cfg(unix)]
fn mark_executables(dir: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let mut perms = entry.metadata()?.permissions();
            perms.set_mode(perms.mode() | 0o111);
            std::fs::set_permissions(entry.path(), perms)?;
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn mark_executables(_dir: &std::path::Path) -> Result<()> {
    Ok(())
}
