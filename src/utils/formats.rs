use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::utils::EngineError;

/// The three output formats the engine drives an encoder for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatId {
    /// Lossless-indexed PNG via pngquant
    Png,
    /// Lossy WebP via cwebp
    Webp,
    /// Lossy progressive JPEG via mozjpeg's cjpeg
    Jpeg,
}

impl FormatId {
    pub const ALL: [FormatId; 3] = [Self::Png, Self::Webp, Self::Jpeg];

    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Png => &["png"],
            Self::Webp => &["webp"],
            Self::Jpeg => &["jpg", "jpeg"],
        }
    }

    /// Extension used for artifacts and saved copies
    pub fn canonical_extension(&self) -> &'static str {
        self.extensions()[0]
    }

    /// Name of the encoder program looked up when no explicit path is configured
    pub fn default_program(&self) -> &'static str {
        match self {
            Self::Png => "pngquant",
            Self::Webp => "cwebp",
            Self::Jpeg => "cjpeg",
        }
    }

    /// Package that provides the encoder, used in the missing dependency hint
    pub fn package_name(&self) -> &'static str {
        match self {
            Self::Png => "pngquant",
            Self::Webp => "webp",
            Self::Jpeg => "mozjpeg",
        }
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
        };
        f.write_str(name)
    }
}

impl FromStr for FormatId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.to_lowercase();
        match s.as_str() {
            "png" | "pngquant" => Ok(Self::Png),
            "webp" | "cwebp" => Ok(Self::Webp),
            "jpg" | "jpeg" | "cjpeg" | "mozjpeg" => Ok(Self::Jpeg),
            _ => Err(EngineError::validation(format!(
                "Unsupported format: {}", s
            ))),
        }
    }
}
