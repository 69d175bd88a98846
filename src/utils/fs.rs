use std::path::Path;
use tokio::fs;
use crate::utils::{EngineError, EngineResult};

/// Get file size in bytes
pub async fn get_file_size(path: impl AsRef<Path>) -> EngineResult<u64> {
    fs::metadata(path.as_ref())
        .await
        .map(|m| m.len())
        .map_err(|e| EngineError::filesystem(format!(
            "Failed to get file size of {}: {}", path.as_ref().display(), e
        )))
}

/// Size and modification time, used to tell an unchanged source apart
pub async fn file_fingerprint(path: impl AsRef<Path>) -> EngineResult<(u64, u128)> {
    let meta = fs::metadata(path.as_ref())
        .await
        .map_err(|e| EngineError::filesystem(format!(
            "Failed to stat {}: {}", path.as_ref().display(), e
        )))?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    Ok((meta.len(), mtime))
}

/// Remove a file, treating an already missing file as success
pub async fn remove_if_exists(path: impl AsRef<Path>) -> std::io::Result<bool> {
    match fs::remove_file(path.as_ref()).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Hard-links `from` to `to`, copying when linking is not possible
/// (e.g. across filesystems)
pub async fn link_or_copy(from: impl AsRef<Path>, to: impl AsRef<Path>) -> std::io::Result<()> {
    if fs::hard_link(from.as_ref(), to.as_ref()).await.is_ok() {
        return Ok(());
    }
    fs::copy(from.as_ref(), to.as_ref()).await.map(|_| ())
}

/// Get file extension as lowercase string
pub fn get_extension(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Last path component for log lines
pub fn extract_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn remove_missing_file_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("gone.png");
        assert!(!remove_if_exists(&path).await.unwrap());

        std::fs::write(&path, b"x").unwrap();
        assert!(remove_if_exists(&path).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_size_reports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = get_file_size(tmp.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, EngineError::Filesystem(_)));
    }

    #[tokio::test]
    async fn linked_copy_survives_removal_of_the_source() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.webp");
        let b = tmp.path().join("b.webp");
        std::fs::write(&a, b"webp").unwrap();

        link_or_copy(&a, &b).await.unwrap();
        std::fs::remove_file(&a).unwrap();
        assert_eq!(std::fs::read(&b).unwrap(), b"webp");
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(get_extension("a/B.PNG").as_deref(), Some("png"));
        assert_eq!(get_extension("noext"), None);
    }
}
