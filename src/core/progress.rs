use serde::Serialize;
use crate::core::savings::Savings;
use crate::core::types::{CompressionResult, CompressionStatus, Generation, SessionId};
use crate::utils::FormatId;

/// Notification sent to the display layer whenever a result is accepted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub format: FormatId,
    pub generation: Generation,
    pub status: CompressionStatus,
    /// Artifact size in bytes, when the request succeeded
    #[serde(default)]
    pub artifact_size: Option<u64>,
    #[serde(default)]
    pub savings: Option<Savings>,
    /// Output is not smaller than the original
    pub warning: bool,
    /// Encoder diagnostics for a failed request
    #[serde(default)]
    pub diagnostics: Option<String>,
}

impl SessionEvent {
    pub fn accepted(session_id: SessionId, original_size: u64, result: &CompressionResult) -> Self {
        let artifact_size = result.artifact_size();
        let savings = artifact_size.and_then(|size| crate::core::savings::savings(original_size, size));
        let diagnostics = match &result.status {
            CompressionStatus::Failed { reason } => Some(reason.clone()),
            _ => None,
        };

        Self {
            session_id,
            format: result.format,
            generation: result.generation,
            status: result.status.clone(),
            artifact_size,
            savings,
            warning: savings.is_some_and(|s| s.warning),
            diagnostics,
        }
    }

    /// One line summary for logs and the command line driver
    pub fn summary(&self) -> String {
        match (&self.status, self.artifact_size, self.savings) {
            (CompressionStatus::Succeeded, Some(size), Some(savings)) => {
                let flag = if self.warning { " (larger than original)" } else { "" };
                format!("{} {} bytes, {}{}", self.format, size, savings, flag)
            }
            (CompressionStatus::Failed { reason }, _, _) => {
                format!("{} failed: {}", self.format, reason)
            }
            _ => format!("{} {}", self.format, self.generation),
        }
    }
}
