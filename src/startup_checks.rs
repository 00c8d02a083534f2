//! Startup requirement validation for herakles-conntrack-exporter.
//!
//! This module validates that the exporter has all necessary permissions
//! and system requirements before starting.

use nix::unistd::geteuid;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

/// Validate all runtime requirements
pub fn validate_requirements(conntrack_path: &Path) -> Result<(), ValidationError> {
    info!("🔍 Validating runtime requirements...");

    check_user_privileges();
    check_conntrack_access(conntrack_path)?;

    info!("✅ All runtime requirements validated");
    Ok(())
}

/// Check if running with sufficient privileges
fn check_user_privileges() {
    if !geteuid().is_root() {
        warn!("⚠️  Not running as root - the conntrack table may only be readable by root");
        warn!("   Recommendation: Run as root or grant CAP_NET_ADMIN");
    } else {
        info!("✅ Running as root (uid=0)");
    }
}

/// Check that the connection tracking table exists and can be opened
fn check_conntrack_access(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        error!("❌ {} not found - nf_conntrack is not loaded", path.display());
        error!("   Solution: modprobe nf_conntrack");
        return Err(ValidationError::ConntrackMissing(
            path.display().to_string(),
        ));
    }

    match fs::File::open(path) {
        Ok(_) => {
            info!("✅ Conntrack access: {} is readable", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            error!("❌ Cannot read {} - insufficient permissions", path.display());
            error!("   Every scrape will fail until this is fixed.");
            error!("");
            error!("   Solutions:");
            error!("   1. Run as root:");
            error!("      sudo systemctl edit herakles-conntrack-exporter");
            error!("      Then add these lines in the editor:");
            error!("      [Service]");
            error!("      User=root");
            error!("      Group=root");
            error!("");
            error!("   2. Grant capabilities:");
            error!("      setcap cap_net_admin+ep /path/to/binary");
            Err(ValidationError::InsufficientPermissions(e.to_string()))
        }
        Err(e) => {
            warn!("⚠️  Could not test conntrack access: {}", e);
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Insufficient permissions: {0}")]
    InsufficientPermissions(String),

    #[error("Connection tracking table not found at {0}")]
    ConntrackMissing(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_conntrack_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nf_conntrack");
        assert!(matches!(
            validate_requirements(&missing),
            Err(ValidationError::ConntrackMissing(_))
        ));
    }

    #[test]
    fn test_readable_conntrack_table_passes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ipv4     2 udp      17 28 src=10.0.0.2 dst=10.0.0.53 sport=5353 dport=53 src=10.0.0.53 dst=10.0.0.2 sport=53 dport=5353 mark=0 use=2").unwrap();
        assert!(validate_requirements(file.path()).is_ok());
    }
}
