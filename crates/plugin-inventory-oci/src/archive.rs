use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use plugin_inventory_types::{Error, Result};

/// Unpacks a gzip-compressed tar archive (the shape of an OCI image layer
/// tarball) into `dest_dir`.
pub fn unpack_tar_gz(bytes: &[u8], dest_dir: &Path) -> Result<()> {
    let decoder = GzDecoder::new(bytes);
    let mut archive = Archive::new(decoder);
    archive
        .unpack(dest_dir)
        .map_err(|e| Error::Io(format!("failed to unpack image layer into {dest_dir:?}: {e}")))
}
