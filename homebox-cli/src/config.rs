//! Runtime configuration
//!
//! Defaults reproduce a stock HomeBox bootstrap; `~/.config/homebox/config.toml`
//! (written by confy on first run) or an explicit `--config` file can
//! override any of them.

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

use crate::bootstrap::credentials::{KeySpec, KeyType};
use crate::error::{LoadConfigSnafu, NoHomeDirectorySnafu, ParseConfigSnafu, ReadConfigSnafu, Result};

pub const APP_NAME: &str = "homebox";

/// Where the Mac agent comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentSource {
    /// `brew install --cask puppet-agent`
    Homebrew,
    /// Version-probed disk image from the vendor's download site.
    Download,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeboxConfig {
    pub word_source: PathBuf,
    pub passphrase_words: usize,
    pub min_word_length: usize,
    pub max_word_length: usize,

    /// Relative to the home directory.
    pub ssh_dir: PathBuf,
    /// Relative to the home directory.
    pub config_dir: PathBuf,
    pub key_types: Vec<KeySpec>,

    pub homebrew_url: String,
    pub homebrew_interpreter: String,

    pub gpg_keyserver: String,
    pub rvm_gpg_keys: Vec<String>,
    pub rvm_url: String,
    pub ruby_version: String,

    pub agent_source: AgentSource,
    pub agent_download_template: String,

    pub modules: Vec<String>,
    pub optional_modules: Vec<String>,
    pub manifest_url: String,
    pub manifest_branch: String,

    pub log_dir: PathBuf,
}

impl Default for HomeboxConfig {
    fn default() -> Self {
        Self {
            word_source: PathBuf::from("/usr/share/dict/words"),
            passphrase_words: 5,
            min_word_length: 3,
            max_word_length: 8,
            ssh_dir: PathBuf::from(".ssh"),
            config_dir: PathBuf::from(".config/homebox"),
            key_types: vec![
                KeySpec::new(KeyType::Dsa, false),
                KeySpec::new(KeyType::Rsa, true),
                KeySpec::new(KeyType::Ecdsa, false),
                KeySpec::new(KeyType::Ed25519, true),
            ],
            homebrew_url: "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh"
                .to_string(),
            homebrew_interpreter: "/bin/bash".to_string(),
            gpg_keyserver: "hkp://keys.gnupg.net".to_string(),
            rvm_gpg_keys: vec![
                "409B6B1796C275462A1703113804BB82D39DC0E3".to_string(),
                "7D2BAF1CF37B13E2069D6956105BD0E739499BDB".to_string(),
            ],
            rvm_url: "https://get.rvm.io".to_string(),
            ruby_version: "ruby".to_string(),
            agent_source: AgentSource::Homebrew,
            agent_download_template:
                "https://downloads.puppetlabs.com/mac/puppet/{major}.{minor}/x86_64/puppet-agent-latest.dmg"
                    .to_string(),
            modules: vec![
                "puppetlabs-vcsrepo".to_string(),
                "thekevjames-homebrew".to_string(),
            ],
            optional_modules: vec!["puppetlabs-stdlib".to_string()],
            manifest_url: "https://github.com/bradleyfrank/HomeBox/archive".to_string(),
            manifest_branch: "alpha".to_string(),
            log_dir: PathBuf::from("."),
        }
    }
}

impl HomeboxConfig {
    /// Load from the confy-managed location, creating it with defaults.
    pub fn load() -> Result<Self> {
        confy::load(APP_NAME, "config").context(LoadConfigSnafu)
    }

    /// Load from an explicit TOML file.
    pub fn load_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        toml::from_str(&content).context(ParseConfigSnafu { path })
    }
}

/// Absolute locations derived from the home directory.
#[derive(Debug, Clone)]
pub struct HomePaths {
    pub home: PathBuf,
    pub ssh_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl HomePaths {
    pub fn discover(config: &HomeboxConfig) -> Result<Self> {
        let home = dirs::home_dir().context(NoHomeDirectorySnafu)?;
        Ok(Self::rooted(home, config))
    }

    pub fn rooted(home: impl Into<PathBuf>, config: &HomeboxConfig) -> Self {
        let home = home.into();
        Self {
            ssh_dir: home.join(&config.ssh_dir),
            config_dir: home.join(&config.config_dir),
            home,
        }
    }
}
