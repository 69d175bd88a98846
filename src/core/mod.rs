//! Core engine types and state management.
//!
//! - [`Engine`]: owns the adapters, the scheduler and every open session
//! - [`SessionState`]: sessions and their generation fences
//! - [`CompressionRequest`] / [`CompressionResult`]: one encoder run and its outcome
//! - [`SessionEvent`]: what a display layer is told about accepted results

mod config;
mod progress;
mod savings;
mod session;
mod state;
mod task;
mod types;

pub use config::EngineConfig;
pub use progress::SessionEvent;
pub use savings::{savings, Savings};
pub use session::{FormatSnapshot, ImageSession, SessionSnapshot, SessionState, Submission};
pub use state::{Engine, EventReceiver};
pub use task::CompressionRequest;
pub use types::{
    Artifact, CjpegParams, CompressionResult, CompressionStatus, CwebpParams, EncoderParameters,
    FormatParameters, Generation, PngquantParams, SessionId, WebpPreset,
};
