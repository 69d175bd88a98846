//! Encoder adapters.
//!
//! Each supported format is driven by an external program. An [`Encoder`]
//! only knows how to turn parameters into that program's argument list; the
//! [`EncoderAdapter`] around it owns output path allocation, the timeout and
//! the classification of failures, so every format behaves the same way:
//!
//! - [`Pngquant`]: lossless-indexed PNG
//! - [`Cwebp`]: lossy WebP
//! - [`Cjpeg`]: progressive JPEG (mozjpeg)

mod cjpeg;
mod cwebp;
mod executor;
mod pngquant;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error};

use crate::core::{Artifact, EncoderParameters, EngineConfig};
use crate::processing::preflight::DependencyReport;
use crate::processing::temp::TempArtifactManager;
use crate::utils::{EncodeError, FormatId};

pub use cjpeg::Cjpeg;
pub use cwebp::Cwebp;
pub use executor::run_encoder;
pub use pngquant::Pngquant;

/// Command line builder for one external encoder.
pub trait Encoder: Send + Sync {
    fn format(&self) -> FormatId;

    fn program(&self) -> &Path;

    /// Arguments that make the program read `input` and write `output`.
    fn args(&self, input: &Path, output: &Path, params: &EncoderParameters) -> Result<Vec<OsString>, EncodeError>;
}

/// Runs one encoder against source images, one new artifact per call.
pub struct EncoderAdapter {
    encoder: Box<dyn Encoder>,
    temp: Arc<TempArtifactManager>,
    timeout: Duration,
    available: AtomicBool,
}

impl EncoderAdapter {
    pub fn new(encoder: Box<dyn Encoder>, temp: Arc<TempArtifactManager>, timeout: Duration) -> Self {
        Self {
            encoder,
            temp,
            timeout,
            available: AtomicBool::new(true),
        }
    }

    pub fn format(&self) -> FormatId {
        self.encoder.format()
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    pub fn disable(&self) {
        if self.available.swap(false, Ordering::Relaxed) {
            error!(
                "{} encoder {} is missing, {} output disabled",
                self.format(),
                self.encoder.program().display(),
                self.format()
            );
        }
    }

    /// Compresses `input` into a freshly allocated artifact.
    ///
    /// The caller owns the returned file. On failure no file is left behind.
    /// A missing encoder binary disables this adapter for good.
    pub async fn compress(&self, input: &Path, params: &EncoderParameters) -> Result<Artifact, EncodeError> {
        if !self.is_available() {
            return Err(EncodeError::MissingDependency {
                format: self.format(),
                program: self.encoder.program().to_path_buf(),
            });
        }

        let output = self.temp.allocate(self.format()).await;
        let result = match self.encoder.args(input, &output, params) {
            Ok(args) => {
                run_encoder(self.format(), self.encoder.program(), &args, &output, self.timeout).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(artifact) => {
                debug!("{} artifact {} ({} bytes)", self.format(), artifact.path.display(), artifact.size);
                Ok(artifact)
            }
            Err(e) => {
                self.temp.retire(&output).await;
                if e.is_missing_dependency() {
                    self.disable();
                }
                Err(e)
            }
        }
    }
}

/// One adapter per format.
pub struct EncoderRegistry {
    adapters: BTreeMap<FormatId, EncoderAdapter>,
}

impl EncoderRegistry {
    pub fn new(adapters: Vec<EncoderAdapter>) -> Self {
        Self {
            adapters: adapters.into_iter().map(|a| (a.format(), a)).collect(),
        }
    }

    /// Builds the three standard adapters, disabling those the preflight
    /// check could not resolve.
    pub fn from_config(config: &EngineConfig, report: &DependencyReport, temp: Arc<TempArtifactManager>) -> Self {
        let timeout = config.encoder_timeout();
        let adapters = FormatId::ALL
            .iter()
            .map(|&format| {
                let program = report
                    .resolved(format)
                    .unwrap_or_else(|| config.program(format))
                    .to_path_buf();
                let encoder: Box<dyn Encoder> = match format {
                    FormatId::Png => Box::new(Pngquant::new(program)),
                    FormatId::Webp => Box::new(Cwebp::new(program)),
                    FormatId::Jpeg => Box::new(Cjpeg::new(program)),
                };
                let adapter = EncoderAdapter::new(encoder, temp.clone(), timeout);
                if !report.is_available(format) {
                    adapter.available.store(false, Ordering::Relaxed);
                }
                adapter
            })
            .collect();
        Self::new(adapters)
    }

    pub fn get(&self, format: FormatId) -> Option<&EncoderAdapter> {
        self.adapters.get(&format)
    }

    pub fn is_available(&self, format: FormatId) -> bool {
        self.get(format).is_some_and(EncoderAdapter::is_available)
    }

    pub fn available_formats(&self) -> Vec<FormatId> {
        self.adapters
            .values()
            .filter(|a| a.is_available())
            .map(EncoderAdapter::format)
            .collect()
    }
}
