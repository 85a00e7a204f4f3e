//! Error taxonomy for the bootstrap pipeline
//!
//! Detection and idempotency checks resolve locally; everything that can
//! actually go wrong while provisioning ends up as a `BootstrapError`, either
//! carried inside a failed stage result or returned from the orchestrator.

use snafu::Snafu;
use std::fmt;
use std::path::PathBuf;

use crate::bootstrap::Stage;

/// Step of the Ruby gem install chain used on RedHat-family hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    GpgImport,
    RuntimeInstall,
    VersionManagerInstall,
    RuntimeBuild,
    AgentGemInstall,
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainStep::GpgImport => "gpg-import",
            ChainStep::RuntimeInstall => "runtime-install",
            ChainStep::VersionManagerInstall => "version-manager-install",
            ChainStep::RuntimeBuild => "runtime-build",
            ChainStep::AgentGemInstall => "agent-gem-install",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BootstrapError {
    #[snafu(display("unsupported platform: {detail}"))]
    UnsupportedPlatform { detail: String },

    #[snafu(display("dictionary is empty, cannot draw a passphrase"))]
    EmptyDictionary,

    #[snafu(display("failed to read word list {}", path.display()))]
    ReadWordList {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to execute `{program}`"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("`{command}` exited with status {code}"))]
    ToolFailed { command: String, code: i32 },

    #[snafu(display("ssh-keygen failed for: {key_types}"))]
    KeyGeneration { key_types: String },

    #[snafu(display("request to {url} failed"))]
    Download { url: String, source: reqwest::Error },

    #[snafu(display("{url} returned HTTP {status}"))]
    HttpStatus { url: String, status: u16 },

    #[snafu(display(
        "no artifact found for {major}.x after {attempts} attempts (started at {major}.{start_minor})"
    ))]
    DownloadExhausted {
        major: u32,
        start_minor: u32,
        attempts: u32,
    },

    #[snafu(display("cannot parse a major.minor version from {version:?}"))]
    UnparsableVersion { version: String },

    #[snafu(display("unable to write {}", path.display()))]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("unable to write passphrase file {}", path.display()))]
    WritePassphrase {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to create directory {}", path.display()))]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("path exists but is not a directory: {}", path.display()))]
    NotADirectory { path: PathBuf },

    #[snafu(display("unable to extract {} into {}", archive.display(), target.display()))]
    Archive {
        archive: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("no installed runtime found under {}", dir.display()))]
    NoRuntime { dir: PathBuf },

    #[snafu(display("no installer package found in {}", dir.display()))]
    NoInstallerPackage { dir: PathBuf },

    #[snafu(display("{step} failed: {source}"))]
    AgentStep {
        step: ChainStep,
        #[snafu(source(from(BootstrapError, Box::new)))]
        source: Box<BootstrapError>,
    },

    #[snafu(display("cannot determine the home directory"))]
    NoHomeDirectory,

    #[snafu(display("failed to load configuration"))]
    LoadConfig { source: confy::ConfyError },

    #[snafu(display("failed to read configuration {}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse configuration {}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("password prompt failed: {message}"))]
    PasswordPrompt { message: String },

    #[snafu(display("{stage} failed: {source}"))]
    StageFailed {
        stage: Stage,
        #[snafu(source(from(BootstrapError, Box::new)))]
        source: Box<BootstrapError>,
    },
}

impl BootstrapError {
    /// True when the failure is rooted in an unsupported operating system.
    pub fn is_unsupported_platform(&self) -> bool {
        match self {
            BootstrapError::UnsupportedPlatform { .. } => true,
            BootstrapError::StageFailed { source, .. }
            | BootstrapError::AgentStep { source, .. } => source.is_unsupported_platform(),
            _ => false,
        }
    }

    /// Process exit status for a fatal failure.
    pub fn exit_code(&self) -> u8 {
        if self.is_unsupported_platform() { 2 } else { 1 }
    }
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
