/*!
 * Domain Fingerprint
 *
 * Identifies which processes this one may exchange memory with. Cross-memory
 * attach is governed by a ptrace access check whose main requirement is
 * matching credentials, so the fingerprint combines the boot id with the
 * effective user and group ids. Real and saved-set ids are not included.
 */

use super::worker::{CopyEngine, CopyRegion};
use crate::core::config::ContextConfig;
use crate::core::errors::ContextError;
use crate::core::types::current_pid;
use nix::unistd::{getegid, geteuid};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Comparison-only token for "these two processes may copy each other"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainFingerprint(String);

impl DomainFingerprint {
    /// Build the fingerprint for the calling process
    pub fn generate(channel_name: &str, boot_id_path: &Path) -> Result<Self, ContextError> {
        let boot_id = read_boot_id(boot_id_path)?;
        Ok(Self(format!(
            "{}:{}/{}/{}",
            channel_name,
            boot_id,
            geteuid().as_raw(),
            getegid().as_raw()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a peer advertising `other` can be reached
    pub fn is_compatible(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for DomainFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn read_boot_id(path: &Path) -> Result<String, ContextError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ContextError::BootId {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let boot_id = raw.trim();
    if boot_id.is_empty() {
        return Err(ContextError::BootId {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        });
    }
    Ok(boot_id.to_string())
}

/// Whether cross-memory attach can work in this process
///
/// Yama scope 2 (admin only) and 3 (disabled) rule it out; scope 1 only
/// allows reading descendants, which is accepted with a warning. The final
/// word is a real copy from this process into itself.
pub(crate) fn probe_viability(config: &ContextConfig, engine: &dyn CopyEngine) -> bool {
    match std::fs::read_to_string(&config.ptrace_scope_path) {
        Ok(raw) => match raw.trim().parse::<u32>() {
            Ok(0) => {}
            Ok(1) => warn!(
                "Yama ptrace_scope is 1; only descendant processes can be read"
            ),
            Ok(scope) => {
                debug!(scope, "Yama ptrace_scope forbids cross-memory attach");
                return false;
            }
            Err(_) => warn!(value = raw.trim(), "Unrecognized ptrace_scope value"),
        },
        Err(_) => debug!("No Yama ptrace_scope, skipping check"),
    }

    let source: [u8; 8] = *b"cmaprobe";
    let mut target = [0u8; 8];
    let region = CopyRegion {
        remote_pid: current_pid(),
        remote_addr: source.as_ptr() as u64,
        local_addr: target.as_mut_ptr() as usize,
        length: source.len(),
    };

    match engine.copy(&region) {
        Ok(n) if n == source.len() && target == source => true,
        Ok(n) => {
            debug!(copied = n, "Self-copy probe came up short");
            false
        }
        Err(errno) => {
            debug!(error = %errno, "Self-copy probe failed");
            false
        }
    }
}
