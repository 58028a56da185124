//! Process identity used to recognise this process's own claims.
//!
//! A claim stores the claimer's fingerprint; on start-up a queue clears
//! every claim carrying its fingerprint, so the identity must be stable
//! across restarts of the same deployment and distinct between
//! deployments that share a table.

use sha2::{Digest, Sha256};

/// Length in bytes of a stored claim fingerprint.
pub const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Derive a fingerprint from an arbitrary identity string.
    pub fn from_identity(identity: &str) -> Self {
        let digest = Sha256::digest(identity.as_bytes());
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&digest[..FINGERPRINT_LEN]);
        Self(bytes)
    }

    /// Fingerprint of the running deployment: host name plus the directory
    /// the executable was started from.
    pub fn deployment() -> Self {
        Self::from_deployment(&host_name(), &base_dir())
    }

    /// Fingerprint of a deployment given its host name and base directory.
    pub fn from_deployment(host: &str, base_dir: &str) -> Self {
        Self::from_identity(&format!("{host}|{base_dir}"))
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::deployment()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
        })
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn base_dir() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.display().to_string()))
        .unwrap_or_default()
}
