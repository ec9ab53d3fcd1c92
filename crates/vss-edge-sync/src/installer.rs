//! Staged, atomic installation of extracted archives.
//!
//! Archives are gzip tarballs. Extraction happens into a staging sibling
//! under the install root; the final step is a rename, so a consumer never
//! observes a half-extracted directory. A previous install is parked (not
//! deleted) until the caller commits, which is what makes the
//! reload-failed rollback possible.

use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::SyncError;

/// Extract a gzip tarball into `dest` (created fresh).
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), SyncError> {
    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let file = std::fs::File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.unpack(dest).map_err(|e| SyncError::ExtractionFailed {
        message: format!("{}: {e}", archive.display()),
    })?;
    debug!(archive = %archive.display(), dest = %dest.display(), "archive extracted");
    Ok(())
}

/// A completed swap that can still be undone. Dropping it without calling
/// [`Installation::commit`] leaves the parked previous install on disk for
/// [`Installation::rollback`].
pub struct Installation {
    pub target: PathBuf,
    previous: Option<PathBuf>,
}

impl Installation {
    /// Delete the parked previous install; the new one is now permanent.
    pub fn commit(self) -> Result<(), SyncError> {
        if let Some(previous) = self.previous {
            if previous.exists() {
                std::fs::remove_dir_all(&previous)?;
            }
        }
        Ok(())
    }

    /// Remove the new install and put the previous one back.
    pub fn rollback(self) -> Result<(), SyncError> {
        if self.target.exists() {
            std::fs::remove_dir_all(&self.target)?;
        }
        if let Some(previous) = self.previous {
            if previous.exists() {
                std::fs::rename(&previous, &self.target)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ModelInstaller {
    model_root: PathBuf,
    staging_dir: PathBuf,
}

impl ModelInstaller {
    pub fn new(model_root: PathBuf, staging_dir: PathBuf) -> Self {
        Self {
            model_root,
            staging_dir,
        }
    }

    /// Extract the verified archive and swap it into
    /// `{model_root}/{package_id}/`, parking any previous install.
    pub fn install(&self, package_id: &str, archive: &Path) -> Result<Installation, SyncError> {
        std::fs::create_dir_all(&self.model_root)?;
        std::fs::create_dir_all(&self.staging_dir)?;

        let extract_dir = self.staging_dir.join(format!("extract-{package_id}"));
        if let Err(e) = extract_archive(archive, &extract_dir) {
            let _ = std::fs::remove_dir_all(&extract_dir);
            return Err(e);
        }

        let target = self.model_root.join(package_id);
        let previous = if target.exists() {
            let parked = self.staging_dir.join(format!("previous-{package_id}"));
            if parked.exists() {
                std::fs::remove_dir_all(&parked)?;
            }
            std::fs::rename(&target, &parked)?;
            Some(parked)
        } else {
            None
        };

        std::fs::rename(&extract_dir, &target)?;
        info!(%package_id, target = %target.display(), "package installed");
        Ok(Installation { target, previous })
    }
}
