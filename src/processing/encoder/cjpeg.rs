use std::ffi::OsString;
use std::path::{Path, PathBuf};
use crate::core::{CjpegParams, EncoderParameters};
use crate::utils::{EncodeError, FormatId};
use super::Encoder;

/// Progressive JPEG through mozjpeg's cjpeg.
pub struct Cjpeg {
    program: PathBuf,
}

impl Cjpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn build(&self, input: &Path, output: &Path, params: &CjpegParams) -> Vec<OsString> {
        vec![
            "-quality".into(),
            params.quality.to_string().into(),
            "-progressive".into(),
            "-outfile".into(),
            output.into(),
            input.into(),
        ]
    }
}

impl Encoder for Cjpeg {
    fn format(&self) -> FormatId {
        FormatId::Jpeg
    }

    fn program(&self) -> &Path {
        &self.program
    }

    fn args(&self, input: &Path, output: &Path, params: &EncoderParameters) -> Result<Vec<OsString>, EncodeError> {
        match params {
            EncoderParameters::Jpeg(p) => Ok(self.build(input, output, p)),
            other => Err(EncodeError::WrongFormat { expected: FormatId::Jpeg, given: other.format() }),
        }
    }
}
