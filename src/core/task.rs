//! Compression request definition.

use serde::Serialize;
use crate::core::types::{EncoderParameters, Generation, SessionId};
use crate::utils::FormatId;

/// A single compression request issued by the scheduler.
///
/// Carries its own copy of the parameters and the generation it was tagged
/// with, so the result can be fenced when it comes back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionRequest {
    pub session: SessionId,
    pub generation: Generation,
    pub parameters: EncoderParameters,
}

impl CompressionRequest {
    pub fn format(&self) -> FormatId {
        self.parameters.format()
    }
}
