//! Engine configuration.
//!
//! Values come from [`EngineConfig::default`], optionally overlaid by a JSON
//! file. Nothing is ever written back.

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::utils::{EngineError, EngineResult, FormatId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// pngquant program, bare name or path
    pub pngquant: PathBuf,
    /// cwebp program, bare name or path
    pub cwebp: PathBuf,
    /// mozjpeg cjpeg program, bare name or path
    pub cjpeg: PathBuf,
    /// Quiet period after the last parameter change before recompressing
    pub quiescence_ms: u64,
    /// Upper bound for a single encoder run
    pub encoder_timeout_ms: u64,
    /// Directory holding preview artifacts
    pub temp_dir: PathBuf,
    /// Entries kept by the artifact cache; 0 disables it
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pngquant: PathBuf::from(FormatId::Png.default_program()),
            cwebp: PathBuf::from(FormatId::Webp.default_program()),
            cjpeg: PathBuf::from(FormatId::Jpeg.default_program()),
            quiescence_ms: 100,
            encoder_timeout_ms: 60_000,
            temp_dir: std::env::temp_dir().join("pact"),
            cache_capacity: 32,
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::filesystem(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            EngineError::validation(format!("Invalid config {}: {}", path.display(), e))
        })
    }

    pub fn program(&self, format: FormatId) -> &Path {
        match format {
            FormatId::Png => &self.pngquant,
            FormatId::Webp => &self.cwebp,
            FormatId::Jpeg => &self.cjpeg,
        }
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_millis(self.encoder_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pact.json");
        std::fs::write(&path, r#"{ "cwebp": "/opt/webp/bin/cwebp", "quiescenceMs": 200 }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.program(FormatId::Webp), Path::new("/opt/webp/bin/cwebp"));
        assert_eq!(config.program(FormatId::Png), Path::new("pngquant"));
        assert_eq!(config.quiescence(), Duration::from_millis(200));
        assert_eq!(config.cache_capacity, 32);
    }

    #[test]
    fn malformed_file_is_a_validation_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("pact.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::from_json_file(&path),
            Err(EngineError::Validation(_))
        ));
    }
}
