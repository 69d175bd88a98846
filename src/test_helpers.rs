//! Shared test utilities.
//!
//! [`ShellEncoder`] stands in for pngquant/cwebp/cjpeg: it runs a small
//! `/bin/sh` script with the source path as `$1`, the output path as `$2`
//! and the requested quality as `$3`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core::EncoderParameters;
use crate::processing::encoder::{Encoder, EncoderAdapter, EncoderRegistry};
use crate::processing::temp::TempArtifactManager;
use crate::utils::{EncodeError, FormatId};

pub struct ShellEncoder {
    format: FormatId,
    program: PathBuf,
    script: String,
}

impl ShellEncoder {
    pub fn new(format: FormatId, script: impl Into<String>) -> Self {
        Self {
            format,
            program: PathBuf::from("/bin/sh"),
            script: script.into(),
        }
    }

    /// Writes the first `quality * 10` bytes of the source.
    pub fn truncating(format: FormatId) -> Self {
        Self::new(format, "head -c $(( $3 * 10 )) \"$1\" > \"$2\"")
    }

    /// Like [`ShellEncoder::truncating`], after sleeping `(101 - quality) * 10` ms,
    /// so lower qualities finish later.
    pub fn slow_for_low_quality(format: FormatId) -> Self {
        Self::new(
            format,
            "sleep $(awk \"BEGIN { print (101 - $3) * 0.01 }\"); head -c $(( $3 * 10 )) \"$1\" > \"$2\"",
        )
    }

    /// Points at a program that does not exist.
    pub fn missing(format: FormatId) -> Self {
        Self {
            format,
            program: PathBuf::from("/nonexistent/pact-test-encoder"),
            script: String::new(),
        }
    }
}

impl Encoder for ShellEncoder {
    fn format(&self) -> FormatId {
        self.format
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, input: &Path, output: &Path, params: &EncoderParameters) -> Result<Vec<OsString>, EncodeError> {
        if params.format() != self.format {
            return Err(EncodeError::WrongFormat { expected: self.format, given: params.format() });
        }
        Ok(vec![
            "-c".into(),
            self.script.clone().into(),
            "sh".into(),
            input.into(),
            output.into(),
            params.quality().to_string().into(),
        ])
    }
}

/// Registry with a truncating stand-in for every format.
pub fn shell_registry(temp: &Arc<TempArtifactManager>) -> EncoderRegistry {
    registry_with(temp, FormatId::ALL.iter().map(|&f| ShellEncoder::truncating(f)).collect())
}

pub fn registry_with(temp: &Arc<TempArtifactManager>, encoders: Vec<ShellEncoder>) -> EncoderRegistry {
    EncoderRegistry::new(
        encoders
            .into_iter()
            .map(|e| EncoderAdapter::new(Box::new(e), temp.clone(), Duration::from_secs(10)))
            .collect(),
    )
}

/// Writes a source image of `size` bytes.
pub fn write_source(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0x5au8; size]).unwrap();
    path
}
