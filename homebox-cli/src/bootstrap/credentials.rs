//! SSH key generation and passphrase persistence
//!
//! Existing key files are never touched. New keys are encrypted with the
//! diceware passphrase, which is then written next to them with owner
//! read-only permissions.

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::passphrase::Passphrase;
use crate::error::{Result, WritePassphraseSnafu};
use crate::exec::{CommandRunner, Invocation, succeeds};

pub const PASSPHRASE_FILE: &str = "passphrase";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    Dsa,
    Rsa,
    Ecdsa,
    Ed25519,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::Dsa => "dsa",
            KeyType::Rsa => "rsa",
            KeyType::Ecdsa => "ecdsa",
            KeyType::Ed25519 => "ed25519",
        }
    }

    /// Bit length passed to `ssh-keygen -b`; ed25519 has a fixed size.
    pub fn default_bits(self) -> Option<u32> {
        match self {
            KeyType::Dsa => Some(1024),
            KeyType::Rsa => Some(4096),
            KeyType::Ecdsa => Some(521),
            KeyType::Ed25519 => None,
        }
    }

    /// `id_<type>` under `key_dir`.
    pub fn key_path(self, key_dir: &Path) -> PathBuf {
        key_dir.join(format!("id_{}", self.as_str()))
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    pub kind: KeyType,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
}

impl KeySpec {
    pub fn new(kind: KeyType, enabled: bool) -> Self {
        Self {
            kind,
            enabled,
            bits: None,
        }
    }

    /// Configured size, else the type's default; `None` for fixed-size types.
    pub fn effective_bits(&self) -> Option<u32> {
        self.kind.default_bits().and(self.bits.or(self.kind.default_bits()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialResult {
    AlreadyPresent,
    Created,
    Failed,
}

/// True when at least one key was generated this run.
pub fn any_created(results: &BTreeMap<KeyType, CredentialResult>) -> bool {
    results.values().any(|r| *r == CredentialResult::Created)
}

fn keygen_invocation(spec: &KeySpec, passphrase: &Passphrase, comment: &str, path: &Path) -> Invocation {
    let mut inv = Invocation::new("ssh-keygen").args(["-q", "-t", spec.kind.as_str()]);
    if let Some(bits) = spec.effective_bits() {
        inv = inv.arg("-b").arg(bits.to_string());
    }
    inv.arg("-N")
        .secret_arg(passphrase.expose())
        .arg("-C")
        .arg(comment)
        .arg("-f")
        .arg(path.to_string_lossy())
}

fn generate_key(
    runner: &dyn CommandRunner,
    spec: &KeySpec,
    key_dir: &Path,
    passphrase: &Passphrase,
    comment: &str,
) -> CredentialResult {
    let key_file = spec.kind.key_path(key_dir);
    if key_file.exists() {
        info!("SSH key \"{}\" exists, skipping.", key_file.display());
        return CredentialResult::AlreadyPresent;
    }

    info!("Generating {} SSH key...", spec.kind);
    let inv = keygen_invocation(spec, passphrase, comment, &key_file);
    if succeeds(runner, &inv) {
        info!("SSH key \"{}\" successfully created!", key_file.display());
        CredentialResult::Created
    } else {
        error!("SSH key \"{}\" was not created.", key_file.display());
        CredentialResult::Failed
    }
}

/// Generate every enabled key type that does not exist yet.
pub fn provision(
    runner: &dyn CommandRunner,
    key_specs: &[KeySpec],
    key_dir: &Path,
    passphrase: &Passphrase,
    comment: &str,
) -> BTreeMap<KeyType, CredentialResult> {
    key_specs
        .iter()
        .filter(|spec| spec.enabled)
        .map(|spec| {
            let result = generate_key(runner, spec, key_dir, passphrase, comment);
            (spec.kind, result)
        })
        .collect()
}

/// Write the passphrase to `<key_dir>/passphrase` and make it owner
/// read-only. Failing to tighten permissions only warns.
pub fn persist_passphrase(key_dir: &Path, passphrase: &Passphrase) -> Result<PathBuf> {
    let path = key_dir.join(PASSPHRASE_FILE);

    // a previous run leaves the file 0400
    if path.exists() {
        if let Err(e) = set_mode(&path, 0o600) {
            warn!("Unable to make {} writable: {e}", path.display());
        }
    }

    fs::write(&path, passphrase.expose()).context(WritePassphraseSnafu { path: &path })?;
    info!("Wrote file: {}", path.display());

    if let Err(e) = set_mode(&path, 0o400) {
        warn!("Unable to change permissions on passphrase file: {e}");
    }
    Ok(path)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}
