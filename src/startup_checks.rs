//! Startup requirement validation for ps-census.
//!
//! This module validates that the census has the permissions and /proc
//! layout it needs before the first cycle.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(proc_root: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_proc_root(proc_root)?;
    check_proc_access(proc_root)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - status documents of other users' processes may be unreadable");
        warn!("   Recommendation: Run as root for a complete census");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

fn check_proc_root(proc_root: &Path) -> Result<(), ValidationError> {
    match fs::read_dir(proc_root) {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("❌ Cannot list process registry {}: {}", proc_root.display(), e);
            Err(ValidationError::ProcUnavailable(format!(
                "{}: {}",
                proc_root.display(),
                e
            )))
        }
    }
}

/// Check per-process document access using pid 1 (init)
fn check_proc_access(proc_root: &Path) -> Result<(), ValidationError> {
    let init = proc_root.join("1");

    if let Err(e) = fs::read_to_string(init.join("cgroup")) {
        warn!("⚠️  Could not read {}: {}", init.join("cgroup").display(), e);
    }

    let status = init.join("status");
    match fs::metadata(&status) {
        Ok(_) => {
            info!("✅ /proc access: Can read process status documents");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", status.display());
            error!("   Only user-owned processes will carry memory counters!");
            error!("   Solution: run as root or grant cap_dac_read_search,cap_sys_ptrace");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test /proc access: {}", e);
            Ok(()) // Continue but warn
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("Process registry unavailable: {0}")]
    ProcUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_proc_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_requirements(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ValidationError::ProcUnavailable(_)));
    }

    #[test]
    fn test_fake_proc_root_passes() {
        let dir = tempfile::tempdir().unwrap();
        let init = dir.path().join("1");
        fs::create_dir(&init).unwrap();
        fs::write(init.join("cgroup"), "1:pids:/init.scope\n").unwrap();
        fs::write(init.join("status"), "Name:\tinit\n").unwrap();
        assert!(validate_requirements(dir.path()).is_ok());
    }
}
