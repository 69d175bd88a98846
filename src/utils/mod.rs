pub mod error;
pub mod validation;
pub mod formats;
pub mod fs;

pub use error::{EngineError, EngineResult, EncodeError, PathError, ValidationError};
pub use validation::{validate_input_path, validate_parameters, validate_format_parameters};
pub use formats::FormatId;
pub use fs::{
    get_file_size,
    file_fingerprint,
    remove_if_exists,
    link_or_copy,
    get_extension,
    extract_filename,
};
