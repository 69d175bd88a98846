//! Temporary artifact lifecycle.
//!
//! Every file an encoder writes gets its path from [`TempArtifactManager::allocate`]
//! and stays registered until it is retired. Retiring deletes the file; the
//! registry lets shutdown delete whatever is still around.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use lazy_static::lazy_static;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::CompressionResult;
use crate::utils::{remove_if_exists, EngineError, EngineResult, FormatId};

lazy_static! {
    /// Distinguishes artifacts of concurrently running processes sharing a temp dir.
    static ref PROCESS_TOKEN: String = {
        let started = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        format!("{}-{:08x}", std::process::id(), started)
    };
}

pub struct TempArtifactManager {
    dir: PathBuf,
    counter: AtomicU64,
    owned: Mutex<HashSet<PathBuf>>,
}

impl TempArtifactManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
            owned: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the temp directory if needed.
    pub async fn prepare(&self) -> EngineResult<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            EngineError::filesystem(format!(
                "Cannot create temp directory {}: {}", self.dir.display(), e
            ))
        })
    }

    /// Returns a fresh path for a `format` artifact and takes ownership of it.
    ///
    /// The process token and counter make the name unique; it is never handed
    /// out twice.
    pub async fn allocate(&self, format: FormatId) -> PathBuf {
        let mut owned = self.owned.lock().await;
        loop {
            let n = self.counter.fetch_add(1, Ordering::Relaxed);
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            let path = self.dir.join(format!(
                "pact-{}-{}-{}.{}",
                *PROCESS_TOKEN,
                millis,
                n,
                format.canonical_extension()
            ));
            if owned.insert(path.clone()) {
                return path;
            }
        }
    }

    pub async fn is_owned(&self, path: &Path) -> bool {
        self.owned.lock().await.contains(path)
    }

    pub async fn owned_count(&self) -> usize {
        self.owned.lock().await.len()
    }

    /// Deletes an artifact and drops it from the registry.
    ///
    /// Failures are logged, not returned: a leftover file in the temp dir is
    /// not worth failing the operation that superseded it.
    pub async fn retire(&self, path: &Path) {
        self.owned.lock().await.remove(path);
        match remove_if_exists(path).await {
            Ok(true) => debug!("Retired artifact {}", path.display()),
            Ok(false) => {}
            Err(e) => warn!("Failed to delete artifact {}: {}", path.display(), e),
        }
    }

    /// Retires the artifact of a result, if it has one.
    pub async fn retire_result(&self, result: &CompressionResult) {
        if let Some(artifact) = &result.artifact {
            self.retire(&artifact.path).await;
        }
    }

    /// Copies an artifact out of the temp dir to its permanent location.
    ///
    /// The temp file stays owned by the manager.
    pub async fn finalize(&self, artifact: &Path, destination: &Path) -> EngineResult<u64> {
        tokio::fs::copy(artifact, destination).await.map_err(|e| {
            EngineError::filesystem(format!(
                "Failed to copy {} to {}: {}", artifact.display(), destination.display(), e
            ))
        })
    }

    /// Deletes every artifact still registered.
    pub async fn purge(&self) {
        let paths: Vec<PathBuf> = self.owned.lock().await.drain().collect();
        if !paths.is_empty() {
            debug!("Purging {} temp artifacts", paths.len());
        }
        for path in paths {
            if let Err(e) = remove_if_exists(&path).await {
                warn!("Failed to delete artifact {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn allocated_paths_are_unique_and_typed() {
        let tmp = TempDir::new().unwrap();
        let temp = TempArtifactManager::new(tmp.path());

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let path = temp.allocate(FormatId::Webp).await;
            assert_eq!(path.extension().unwrap(), "webp");
            assert_eq!(path.parent().unwrap(), tmp.path());
            assert!(seen.insert(path));
        }
        assert_eq!(temp.owned_count().await, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocations_never_collide() {
        let tmp = TempDir::new().unwrap();
        // never touches the filesystem, so the directory need not exist yet
        let temp = std::sync::Arc::new(TempArtifactManager::new(tmp.path().join("later")));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let temp = temp.clone();
                tokio::spawn(async move {
                    let mut paths = Vec::new();
                    for _ in 0..10 {
                        paths.push(temp.allocate(FormatId::Jpeg).await);
                    }
                    paths
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for task in tasks {
            for path in task.await.unwrap() {
                assert!(seen.insert(path));
            }
        }
        assert_eq!(seen.len(), 80);
        assert_eq!(temp.owned_count().await, 80);
    }

    #[tokio::test]
    async fn retire_deletes_and_forgets() {
        let tmp = TempDir::new().unwrap();
        let temp = TempArtifactManager::new(tmp.path());
        let path = temp.allocate(FormatId::Png).await;
        std::fs::write(&path, b"png").unwrap();

        temp.retire(&path).await;
        assert!(!path.exists());
        assert!(!temp.is_owned(&path).await);
        // retiring twice is harmless
        temp.retire(&path).await;
    }

    #[tokio::test]
    async fn purge_removes_everything_owned() {
        let tmp = TempDir::new().unwrap();
        let temp = TempArtifactManager::new(tmp.path().join("nested"));
        temp.prepare().await.unwrap();

        let a = temp.allocate(FormatId::Png).await;
        let b = temp.allocate(FormatId::Jpeg).await;
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        temp.purge().await;
        assert!(!a.exists());
        assert!(!b.exists());
        assert_eq!(temp.owned_count().await, 0);
    }

    #[tokio::test]
    async fn finalize_copies_and_keeps_source() {
        let tmp = TempDir::new().unwrap();
        let temp = TempArtifactManager::new(tmp.path());
        let artifact = temp.allocate(FormatId::Jpeg).await;
        std::fs::write(&artifact, b"jpeg bytes").unwrap();

        let dest = tmp.path().join("photo.jpg");
        assert_eq!(temp.finalize(&artifact, &dest).await.unwrap(), 10);
        assert_eq!(std::fs::read(&dest).unwrap(), b"jpeg bytes");
        assert!(artifact.exists());
    }
}
