// Module declarations in dependency order
pub mod utils;
pub mod core;
pub mod processing;
pub mod debouncer;
pub mod commands;

#[cfg(test)]
mod test_helpers;

// Public exports for external consumers
pub use crate::core::{
    Engine, EngineConfig, EventReceiver, EncoderParameters, FormatParameters, SessionEvent,
    SessionId, SessionSnapshot,
};
pub use crate::utils::{EngineError, EngineResult, FormatId};
pub use crate::processing::{preflight, DependencyReport, SaveReport};
pub use crate::commands::*;

// This library file is the public API of the engine.
// The command line driver is in main.rs.
