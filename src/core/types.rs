//! Core types for encoder parameters and compression results.

use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::utils::FormatId;

/// Identifies one open image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tag of a compression request within one (session, format) pair.
///
/// Strictly increasing per pair; the first request of a pair is generation 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// cwebp `-preset` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebpPreset {
    #[default]
    Default,
    Photo,
    Picture,
    Drawing,
    Icon,
    Text,
}

impl WebpPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Photo => "photo",
            Self::Picture => "picture",
            Self::Drawing => "drawing",
            Self::Icon => "icon",
            Self::Text => "text",
        }
    }
}

impl std::str::FromStr for WebpPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "photo" => Ok(Self::Photo),
            "picture" => Ok(Self::Picture),
            "drawing" => Ok(Self::Drawing),
            "icon" => Ok(Self::Icon),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown webp preset: {other}")),
        }
    }
}

/// pngquant settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PngquantParams {
    /// Upper bound of the accepted quality range (1-100)
    pub quality: u8,
    /// Floyd-Steinberg dither strength (0-1); encoder default when unset
    pub dither: Option<f32>,
}

impl Default for PngquantParams {
    fn default() -> Self {
        Self { quality: 50, dither: Some(1.0) }
    }
}

/// cwebp settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwebpParams {
    /// Quality (1-100)
    pub quality: u8,
    pub preset: WebpPreset,
}

impl Default for CwebpParams {
    fn default() -> Self {
        Self { quality: 75, preset: WebpPreset::Default }
    }
}

/// mozjpeg cjpeg settings. Progressive mode is always on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CjpegParams {
    /// Quality (1-100)
    pub quality: u8,
}

impl Default for CjpegParams {
    fn default() -> Self {
        Self { quality: 75 }
    }
}

/// Parameters of one compression request.
///
/// A request owns its copy; a later change produces a new value rather than
/// mutating one that is already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum EncoderParameters {
    Png(PngquantParams),
    Webp(CwebpParams),
    Jpeg(CjpegParams),
}

impl EncoderParameters {
    pub fn format(&self) -> FormatId {
        match self {
            Self::Png(_) => FormatId::Png,
            Self::Webp(_) => FormatId::Webp,
            Self::Jpeg(_) => FormatId::Jpeg,
        }
    }

    pub fn quality(&self) -> u8 {
        match self {
            Self::Png(p) => p.quality,
            Self::Webp(p) => p.quality,
            Self::Jpeg(p) => p.quality,
        }
    }

    pub fn default_for(format: FormatId) -> Self {
        match format {
            FormatId::Png => Self::Png(PngquantParams::default()),
            FormatId::Webp => Self::Webp(CwebpParams::default()),
            FormatId::Jpeg => Self::Jpeg(CjpegParams::default()),
        }
    }
}

/// One parameter set per format, as held by a display layer's controls.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatParameters {
    pub png: PngquantParams,
    pub webp: CwebpParams,
    pub jpeg: CjpegParams,
}

impl FormatParameters {
    pub fn get(&self, format: FormatId) -> EncoderParameters {
        match format {
            FormatId::Png => EncoderParameters::Png(self.png),
            FormatId::Webp => EncoderParameters::Webp(self.webp),
            FormatId::Jpeg => EncoderParameters::Jpeg(self.jpeg),
        }
    }

    pub fn set(&mut self, params: EncoderParameters) {
        match params {
            EncoderParameters::Png(p) => self.png = p,
            EncoderParameters::Webp(p) => self.webp = p,
            EncoderParameters::Jpeg(p) => self.jpeg = p,
        }
    }
}

/// File produced by one encoder invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
}

/// Status of a compression request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompressionStatus {
    Pending,
    Succeeded,
    Failed { reason: String },
}

/// Outcome of one compression request for a (session, format) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    pub format: FormatId,
    /// Present only when the request succeeded
    pub artifact: Option<Artifact>,
    pub parameters: EncoderParameters,
    pub generation: Generation,
    pub status: CompressionStatus,
}

impl CompressionResult {
    pub fn succeeded(parameters: EncoderParameters, generation: Generation, artifact: Artifact) -> Self {
        Self {
            format: parameters.format(),
            artifact: Some(artifact),
            parameters,
            generation,
            status: CompressionStatus::Succeeded,
        }
    }

    pub fn failed(parameters: EncoderParameters, generation: Generation, reason: impl Into<String>) -> Self {
        Self {
            format: parameters.format(),
            artifact: None,
            parameters,
            generation,
            status: CompressionStatus::Failed { reason: reason.into() },
        }
    }

    pub fn artifact_size(&self) -> Option<u64> {
        self.artifact.as_ref().map(|a| a.size)
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, CompressionStatus::Succeeded)
    }
}
