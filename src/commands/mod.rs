//! Command handlers for a display layer.
//!
//! - [`open_image`]: Start a session and compress to every format
//! - [`update_parameters`]: Debounced recompression of one format
//! - [`session_snapshot`]: Accepted results and savings
//! - [`save_image`]: Copy accepted artifacts next to the original
//! - [`close_image`] / [`shutdown`]: Release artifacts

mod session;

pub use session::*;
