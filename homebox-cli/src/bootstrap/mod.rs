//! Provisioning stages for a freshly installed client
//!
//! Each stage is idempotent and reports a tri-state `StageResult`:
//! - Platform probing (OS family + version)
//! - Diceware passphrase and SSH key generation
//! - Package manager bootstrap (Homebrew on Mac)
//! - Puppet agent install, per OS family
//! - Puppet environment (modules + HomeBox manifests)

pub mod agent;
pub mod credentials;
pub mod environment;
pub mod package_manager;
pub mod passphrase;
pub mod platform;
pub mod report;
pub mod skeleton;
pub mod strategy;
pub mod version_probe;

use std::fmt;
use tracing::debug;

use crate::config::{HomePaths, HomeboxConfig};
use crate::error::BootstrapError;
use crate::exec::{CommandRunner, Invocation};
use crate::fetch::Fetcher;

pub use agent::install_agent;
pub use credentials::{CredentialResult, KeySpec, KeyType, persist_passphrase, provision};
pub use environment::build_environment;
pub use package_manager::ensure_homebrew;
pub use passphrase::{Dictionary, Passphrase, build_dictionary, generate};
pub use platform::{OsDescriptor, OsFamily, PlatformProber, SystemProber};
pub use strategy::{ProvisioningStrategy, strategy_for};
pub use version_probe::{VersionProbe, probe_download};

/// Orchestrator stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Probe,
    Credentials,
    PackageManager,
    Agent,
    Environment,
}

impl Stage {
    /// Banner printed when the stage starts.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Probe => "Probing for OS",
            Stage::Credentials => "Generating SSH Keys",
            Stage::PackageManager => "Installing Package Manager",
            Stage::Agent => "Installing Puppet",
            Stage::Environment => "Building Puppet Environment",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Probe => "platform probe",
            Stage::Credentials => "credential provisioning",
            Stage::PackageManager => "package manager install",
            Stage::Agent => "agent install",
            Stage::Environment => "environment build",
        };
        f.write_str(name)
    }
}

/// Uniform outcome of every provisioning stage.
#[derive(Debug)]
pub enum StageResult {
    /// Already satisfied; nothing was done.
    Skipped(String),
    Succeeded,
    Failed(BootstrapError),
}

impl StageResult {
    pub fn from_result(result: Result<(), BootstrapError>) -> Self {
        match result {
            Ok(()) => StageResult::Succeeded,
            Err(e) => StageResult::Failed(e),
        }
    }
}

/// Local user and host, used for key comments and module paths.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: String,
    pub fqdn: String,
}

impl Identity {
    pub fn current(runner: &dyn CommandRunner) -> Self {
        Self {
            user: whoami::username(),
            fqdn: resolve_fqdn(runner),
        }
    }

    /// FQDN with a trailing `.local` label dropped (`mbp.local` -> `mbp`).
    pub fn hostname(&self) -> &str {
        let mut labels = self.fqdn.split('.');
        let first = labels.next().unwrap_or(&self.fqdn);
        match labels.next() {
            None | Some("local") => first,
            Some(_) => &self.fqdn,
        }
    }

    /// `user@host` comment stamped on generated keys.
    pub fn key_comment(&self) -> String {
        format!("{}@{}", self.user, self.hostname())
    }
}

/// Fully qualified name from `hostname -f`, else the short host name.
pub fn resolve_fqdn(runner: &dyn CommandRunner) -> String {
    match runner.output(&Invocation::new("hostname").arg("-f")) {
        Ok(out) if out.success() && !out.stdout.trim().is_empty() => {
            return out.stdout.trim().to_string();
        }
        Ok(out) => debug!(code = out.code, "hostname -f failed"),
        Err(e) => debug!(error = %e, "hostname -f failed"),
    }
    whoami::fallible::hostname().unwrap_or_else(|_| "localhost".to_string())
}

/// Shared, read-only inputs handed to every stage.
pub struct StageContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn Fetcher,
    pub config: &'a HomeboxConfig,
    pub paths: &'a HomePaths,
    pub identity: &'a Identity,
    pub os: &'a OsDescriptor,
}
