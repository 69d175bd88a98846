use std::ffi::OsString;
use std::path::{Path, PathBuf};
use crate::core::{CwebpParams, EncoderParameters};
use crate::utils::{EncodeError, FormatId};
use super::Encoder;

/// Maximum compression effort (0-6)
const EFFORT: &str = "6";

/// Lossy WebP through cwebp, multi-threaded at maximum effort.
pub struct Cwebp {
    program: PathBuf,
}

impl Cwebp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn build(&self, input: &Path, output: &Path, params: &CwebpParams) -> Vec<OsString> {
        // cwebp requires -preset to come before any other option
        vec![
            "-preset".into(),
            params.preset.as_str().into(),
            "-q".into(),
            params.quality.to_string().into(),
            "-mt".into(),
            "-m".into(),
            EFFORT.into(),
            input.into(),
            "-o".into(),
            output.into(),
        ]
    }
}

impl Encoder for Cwebp {
    fn format(&self) -> FormatId {
        FormatId::Webp
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, input: &Path, output: &Path, params: &EncoderParameters) -> Result<Vec<OsString>, EncodeError> {
        match params {
            EncoderParameters::Webp(p) => Ok(self.build(input, output, p)),
            other => Err(EncodeError::WrongFormat { expected: FormatId::Webp, given: other.format() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WebpPreset;

    #[test]
    fn preset_leads_the_argument_list() {
        let encoder = Cwebp::new("/usr/local/opt/webp/bin/cwebp");
        let params = EncoderParameters::Webp(CwebpParams { quality: 82, preset: WebpPreset::Drawing });
        let args: Vec<String> = encoder
            .args(Path::new("in.png"), Path::new("out.webp"), &params)
            .unwrap()
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            ["-preset", "drawing", "-q", "82", "-mt", "-m", "6", "in.png", "-o", "out.webp"]
        );
    }
}
