use std::path::Path;
use crate::core::{EncoderParameters, FormatParameters};
use crate::utils::{EngineResult, ValidationError, FormatId};

/// Validates the source image path of a new session
pub fn validate_input_path(path: &Path) -> EngineResult<()> {
    if !path.exists() {
        return Err(ValidationError::path_not_found(path).into());
    }

    if !path.is_file() {
        return Err(ValidationError::not_a_file(path).into());
    }

    Ok(())
}

/// Validates one encoder parameter set against its declared ranges
pub fn validate_parameters(params: &EncoderParameters) -> EngineResult<()> {
    let quality = params.quality();
    if quality == 0 || quality > 100 {
        return Err(ValidationError::parameters(format!(
            "Invalid {} quality value: {}. Must be between 1 and 100", params.format(), quality
        )).into());
    }

    if let EncoderParameters::Png(png) = params {
        if let Some(dither) = png.dither {
            if !dither.is_finite() || !(0.0..=1.0).contains(&dither) {
                return Err(ValidationError::parameters(format!(
                    "Invalid dither value: {}. Must be between 0 and 1", dither
                )).into());
            }
        }
    }

    Ok(())
}

/// Validates every format's parameters
pub fn validate_format_parameters(params: &FormatParameters) -> EngineResult<()> {
    for format in FormatId::ALL {
        validate_parameters(&params.get(format))?;
    }
    Ok(())
}
