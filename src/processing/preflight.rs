//! Startup check that the encoder programs can be found.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::core::EngineConfig;
use crate::utils::FormatId;

/// Which encoders were found, and where.
#[derive(Debug, Clone, Default)]
pub struct DependencyReport {
    resolved: BTreeMap<FormatId, PathBuf>,
    missing: BTreeMap<FormatId, PathBuf>,
}

impl DependencyReport {
    pub fn is_available(&self, format: FormatId) -> bool {
        self.resolved.contains_key(&format)
    }

    pub fn resolved(&self, format: FormatId) -> Option<&Path> {
        self.resolved.get(&format).map(PathBuf::as_path)
    }

    /// Install hint naming the packages to add, e.g. `brew install webp mozjpeg`.
    pub fn install_hint(&self) -> Option<String> {
        if self.missing.is_empty() {
            return None;
        }
        let packages: Vec<&str> = self.missing.keys().map(FormatId::package_name).collect();
        Some(format!(
            "Missing dependencies, please run `brew install {}`",
            packages.join(" ")
        ))
    }
}

/// Resolves every configured encoder program and reports the missing ones once.
pub fn preflight(config: &EngineConfig) -> DependencyReport {
    let mut report = DependencyReport::default();
    for format in FormatId::ALL {
        let program = config.program(format);
        match resolve_program(program) {
            Some(path) => {
                debug!("{} encoder: {}", format, path.display());
                report.resolved.insert(format, path);
            }
            None => {
                report.missing.insert(format, program.to_path_buf());
            }
        }
    }

    if let Some(hint) = report.install_hint() {
        for (format, program) in &report.missing {
            error!("{} encoder not found: {}", format, program.display());
        }
        error!("{}", hint);
    }

    report
}

/// Finds `program`: paths with a directory part are checked as given, bare
/// names are searched on `PATH`.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
