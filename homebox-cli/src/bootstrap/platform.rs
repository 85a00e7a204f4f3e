//! Operating system detection
//!
//! Mac hosts are identified from `sw_vers`; Linux hosts from `/etc/os-release`
//! with a fallback to the legacy `/etc/*-release` banners
//! (`Fedora release 39 (Thirty Nine)`, `CentOS Linux release 7.9.2009 (Core)`).

use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::error::{BootstrapError, Result};
use crate::exec::{CommandRunner, Invocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    MacLike,
    FedoraLike,
    CentOsLike,
    Unsupported,
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OsFamily::MacLike => "Mac",
            OsFamily::FedoraLike => "Fedora",
            OsFamily::CentOsLike => "CentOS",
            OsFamily::Unsupported => "Unsupported",
        };
        f.write_str(name)
    }
}

/// OS family and version, probed once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsDescriptor {
    pub family: OsFamily,
    pub version: String,
}

impl OsDescriptor {
    pub fn new(family: OsFamily, version: impl Into<String>) -> Self {
        Self {
            family,
            version: version.into(),
        }
    }
}

impl fmt::Display for OsDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.version)
    }
}

pub trait PlatformProber {
    fn probe(&self) -> Result<OsDescriptor>;
}

/// Probes the running machine.
pub struct SystemProber<'a> {
    runner: &'a dyn CommandRunner,
    kernel: String,
    release_dir: PathBuf,
}

impl<'a> SystemProber<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            kernel: std::env::consts::OS.to_string(),
            release_dir: PathBuf::from("/etc"),
        }
    }

    /// Probe as if running on `kernel` (`macos`, `linux`, ...), reading
    /// release files from `release_dir`.
    pub fn with_root(runner: &'a dyn CommandRunner, kernel: &str, release_dir: &Path) -> Self {
        Self {
            runner,
            kernel: kernel.to_string(),
            release_dir: release_dir.to_path_buf(),
        }
    }

    fn probe_darwin(&self) -> Option<OsDescriptor> {
        let output = self.runner.output(&Invocation::new("sw_vers")).ok()?;
        debug!("sw_vers returned: {}", output.stdout.trim());
        if !output.success() {
            return None;
        }
        parse_sw_vers(&output.stdout)
    }

    fn probe_linux(&self) -> Option<OsDescriptor> {
        let os_release = self.release_dir.join("os-release");
        if let Ok(content) = fs::read_to_string(&os_release) {
            debug!("Searching release file: {}", os_release.display());
            if let Some(found) = parse_os_release(&content) {
                return Some(found);
            }
        }

        for path in legacy_release_files(&self.release_dir) {
            debug!("Searching release file: {}", path.display());
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if let Some(found) = parse_release_banner(&content) {
                return Some(found);
            }
        }
        None
    }
}

impl PlatformProber for SystemProber<'_> {
    fn probe(&self) -> Result<OsDescriptor> {
        debug!("Platform: {}", self.kernel);

        let found = match self.kernel.as_str() {
            "macos" => self.probe_darwin(),
            "linux" => self.probe_linux(),
            _ => None,
        };

        match found {
            Some(os) => {
                debug!("Detected {os}");
                Ok(os)
            }
            None => {
                error!("Operating System not supported.");
                Err(BootstrapError::UnsupportedPlatform {
                    detail: format!("no supported release found on {}", self.kernel),
                })
            }
        }
    }
}

/// `sw_vers` output must name a Mac product and carry a dotted version.
pub fn parse_sw_vers(output: &str) -> Option<OsDescriptor> {
    let dotted = Regex::new(r"\b(\d+\.\d+(?:\.\d+)?)\b").ok()?;
    let mut product = None;
    let mut version = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "ProductName" => product = Some(value),
            "ProductVersion" => {
                version = dotted
                    .captures(value)
                    .and_then(|cap| cap.get(1))
                    .map(|m| m.as_str().to_string());
            }
            _ => {}
        }
    }

    let is_mac = product.is_some_and(|p| p.to_ascii_lowercase().contains("mac"));
    match (is_mac, version) {
        (true, Some(version)) => Some(OsDescriptor::new(OsFamily::MacLike, version)),
        _ => None,
    }
}

/// Key/value grammar of `/etc/os-release`.
pub fn parse_os_release(content: &str) -> Option<OsDescriptor> {
    let mut id = None;
    let mut id_like = String::new();
    let mut version_id = None;

    for line in content.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        match key {
            "ID" => id = Some(value.to_ascii_lowercase()),
            "ID_LIKE" => id_like = value.to_ascii_lowercase(),
            "VERSION_ID" => version_id = Some(value.to_string()),
            _ => {}
        }
    }

    let family = match id.as_deref()? {
        "fedora" => OsFamily::FedoraLike,
        "centos" | "rhel" | "rocky" | "almalinux" => OsFamily::CentOsLike,
        _ if id_like.split_whitespace().any(|l| l == "rhel" || l == "centos") => {
            OsFamily::CentOsLike
        }
        _ => return None,
    };
    Some(OsDescriptor::new(family, version_id?))
}

/// Distribution name followed by `release <version>`.
pub fn parse_release_banner(content: &str) -> Option<OsDescriptor> {
    let banner = Regex::new(r"(?m)^(Fedora|CentOS)\b[^\n]*?\brelease\s+(\d+(?:\.\d+)*)").ok()?;
    let cap = banner.captures(content)?;
    let family = match &cap[1] {
        "Fedora" => OsFamily::FedoraLike,
        _ => OsFamily::CentOsLike,
    };
    Some(OsDescriptor::new(family, &cap[2]))
}

/// `*-release` files other than `os-release`, in name order.
fn legacy_release_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("-release") && n != "os-release")
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}
