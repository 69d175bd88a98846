use std::ffi::OsString;
use std::path::{Path, PathBuf};
use crate::core::{EncoderParameters, PngquantParams};
use crate::utils::{EncodeError, FormatId};
use super::Encoder;

/// Slowest speed setting, best quality per byte
const SPEED: &str = "--speed=1";

/// Lossless-indexed PNG through pngquant.
pub struct Pngquant {
    program: PathBuf,
}

impl Pngquant {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn build(&self, input: &Path, output: &Path, params: &PngquantParams) -> Vec<OsString> {
        // quality Q is passed as the acceptance range 0-Q so pngquant never
        // refuses to write an image for falling below a minimum
        let mut args: Vec<OsString> = vec![format!("--quality=0-{}", params.quality).into()];
        if let Some(dither) = params.dither {
            args.push(format!("--floyd={}", dither).into());
        }
        args.push(SPEED.into());
        args.push("--output".into());
        args.push(output.into());
        args.push("--".into());
        args.push(input.into());
        args
    }
}

impl Encoder for Pngquant {
    fn format(&self) -> FormatId {
        FormatId::Png
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, input: &Path, output: &Path, params: &EncoderParameters) -> Result<Vec<OsString>, EncodeError> {
        match params {
            EncoderParameters::Png(p) => Ok(self.build(input, output, p)),
            other => Err(EncodeError::WrongFormat { expected: FormatId::Png, given: other.format() }),
        }
    }
}
