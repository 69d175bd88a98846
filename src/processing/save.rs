//! Copying accepted artifacts next to the original.
//!
//! For `dir/photo.jpg` the original is first copied to `dir/photo.original.jpg`,
//! then each artifact to `dir/photo.<ext>`. When a format's extension matches
//! the original's, that copy replaces the original file, which is why the
//! backup is always written first and never overwritten once it exists.

use std::path::{Path, PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::processing::temp::TempArtifactManager;
use crate::utils::{get_extension, EngineError, EngineResult, FormatId};

/// Where the original is backed up before anything is written.
pub fn backup_path(original: &Path) -> PathBuf {
    let dir = original.parent().unwrap_or(Path::new(""));
    let stem = original.file_stem().unwrap_or_default().to_string_lossy();
    let name = match original.extension() {
        Some(ext) => format!("{}.original.{}", stem, ext.to_string_lossy()),
        None => format!("{}.original", stem),
    };
    dir.join(name)
}

/// Whether saving `format` writes over `original` itself.
///
/// Compared on the lowercased extension, so `photo.JPG` collides with the
/// JPEG output on case-insensitive filesystems too.
pub fn replaces_original(original: &Path, format: FormatId) -> bool {
    get_extension(original).is_some_and(|ext| ext == format.canonical_extension())
}

/// Destination of a `format` artifact saved for `original`.
pub fn target_path(original: &Path, format: FormatId) -> PathBuf {
    let dir = original.parent().unwrap_or(Path::new(""));
    let stem = original.file_stem().unwrap_or_default().to_string_lossy();
    dir.join(format!("{}.{}", stem, format.canonical_extension()))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub backup: PathBuf,
    /// False when an earlier backup was kept as is
    pub backup_created: bool,
    pub written: Vec<(FormatId, PathBuf)>,
    /// A same-extension output now sits where the original was; the backup
    /// holds the real original
    pub original_replaced: bool,
}

impl SaveReport {
    /// Every file this save produced or kept, backup included.
    pub fn outputs(&self) -> Vec<PathBuf> {
        std::iter::once(self.backup.clone())
            .chain(self.written.iter().map(|(_, p)| p.clone()))
            .collect()
    }
}

/// Copies the original to its backup and each `(format, artifact)` to its target.
///
/// Stops at the first failing copy. Files written before the failure stay in
/// place and are listed in [`EngineError::SaveIncomplete`].
pub async fn save_artifacts(
    temp: &TempArtifactManager,
    original: &Path,
    artifacts: &[(FormatId, PathBuf)],
) -> EngineResult<SaveReport> {
    let backup = backup_path(original);
    let backup_created = if tokio::fs::try_exists(&backup).await.unwrap_or(false) {
        warn!("Keeping existing backup {}", backup.display());
        false
    } else {
        tokio::fs::copy(original, &backup).await.map_err(|e| {
            EngineError::filesystem(format!(
                "Failed to back up {} to {}: {}", original.display(), backup.display(), e
            ))
        })?;
        debug!("Backed up {} to {}", original.display(), backup.display());
        true
    };

    let mut completed = Vec::new();
    if backup_created {
        completed.push(backup.clone());
    }

    let mut written = Vec::with_capacity(artifacts.len());
    let mut original_replaced = false;
    for (format, artifact) in artifacts {
        let target = target_path(original, *format);
        if let Err(e) = temp.finalize(artifact, &target).await {
            return Err(EngineError::SaveIncomplete {
                completed,
                error: e.to_string(),
            });
        }
        if replaces_original(original, *format) {
            warn!(
                "{} output replaced {}, the original is kept as {}",
                format,
                original.display(),
                backup.display()
            );
            original_replaced = true;
        }
        completed.push(target.clone());
        written.push((*format, target));
    }

    info!("Saved {} outputs for {}", written.len(), original.display());
    Ok(SaveReport { backup, backup_created, written, original_replaced })
}
