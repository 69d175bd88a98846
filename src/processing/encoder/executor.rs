//! Runs one encoder process and checks what it produced.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::core::Artifact;
use crate::utils::{EncodeError, FormatId};

/// Spawns `program args`, waits at most `timeout`, and returns the artifact at `output`.
///
/// The child is killed if the timeout elapses. Captured stderr and stdout are
/// attached to every failure.
pub async fn run_encoder(
    format: FormatId,
    program: &Path,
    args: &[OsString],
    output: &Path,
    timeout: Duration,
) -> Result<Artifact, EncodeError> {
    debug!("Running {} {:?}", program.display(), args);

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => EncodeError::MissingDependency {
                format,
                program: program.to_path_buf(),
            },
            _ => EncodeError::Spawn {
                program: program.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

    // Dropping the wait future on timeout drops the child, which kills it
    let output_result = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| EncodeError::Spawn {
            program: program.to_path_buf(),
            reason: e.to_string(),
        })?,
        Err(_) => {
            warn!("{} timed out after {:?}, killed", program.display(), timeout);
            return Err(EncodeError::TimedOut {
                program: program.to_path_buf(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    let diagnostics = collect_diagnostics(&output_result.stderr, &output_result.stdout);

    if !output_result.status.success() {
        debug!("{} failed: {}", program.display(), diagnostics);
        return Err(EncodeError::NonZeroExit {
            program: program.to_path_buf(),
            status: output_result.status.to_string(),
            diagnostics,
        });
    }

    match tokio::fs::metadata(output).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(Artifact {
            path: output.to_path_buf(),
            size: meta.len(),
        }),
        Ok(_) => Err(EncodeError::MissingOutput {
            path: output.to_path_buf(),
            diagnostics: join_reason("empty output", &diagnostics),
        }),
        Err(e) => Err(EncodeError::MissingOutput {
            path: output.to_path_buf(),
            diagnostics: join_reason(&e.to_string(), &diagnostics),
        }),
    }
}

fn collect_diagnostics(stderr: &[u8], stdout: &[u8]) -> String {
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = String::from_utf8_lossy(stdout);
    [stderr.trim(), stdout.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_reason(reason: &str, diagnostics: &str) -> String {
    if diagnostics.is_empty() {
        reason.to_string()
    } else {
        format!("{reason}; {diagnostics}")
    }
}
