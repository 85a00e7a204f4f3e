//! Downward minor-version search for installer artifacts
//!
//! Vendors publish per-`major.minor` paths and lag behind the newest OS
//! release, so the search starts at the detected version and walks the
//! minor number down to 0. It never leaves the starting major version.

use regex::Regex;
use snafu::{OptionExt, ResultExt};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{DownloadExhaustedSnafu, Result, UnparsableVersionSnafu, WriteFileSnafu};
use crate::fetch::Fetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionProbe {
    pub major: u32,
    pub minor: u32,
}

impl VersionProbe {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Leading `major.minor` of a dotted version (`14.5.1` -> 14, 5). A
    /// bare major (`15`) starts at minor 0.
    pub fn parse(version: &str) -> Result<Self> {
        let re = Regex::new(r"^\s*(\d+)(?:\.(\d+))?").ok().context(UnparsableVersionSnafu { version })?;
        let cap = re.captures(version).context(UnparsableVersionSnafu { version })?;

        let major: u32 = cap[1].parse().ok().context(UnparsableVersionSnafu { version })?;
        let minor: u32 = match cap.get(2) {
            Some(m) => m.as_str().parse().ok().context(UnparsableVersionSnafu { version })?,
            None => 0,
        };
        Ok(Self { major, minor })
    }

    /// Substitute `{major}` and `{minor}` into `template`.
    pub fn url(&self, template: &str) -> String {
        template
            .replace("{major}", &self.major.to_string())
            .replace("{minor}", &self.minor.to_string())
    }
}

impl fmt::Display for VersionProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Artifact located by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHit {
    pub version: VersionProbe,
    pub url: String,
    pub path: PathBuf,
    pub attempts: u32,
}

fn try_version(fetcher: &dyn Fetcher, url: &str, dest: &Path) -> Result<bool> {
    let status = fetcher.status(url)?;
    info!("Server returned: {status}");
    if !(200..300).contains(&status) {
        return Ok(false);
    }

    let body = fetcher.fetch(url)?;
    fs::write(dest, body).context(WriteFileSnafu { path: dest })?;
    Ok(true)
}

/// Probe `template` from `start` downward and download the first reachable
/// artifact to `dest`. Makes at most `start.minor + 1` attempts.
pub fn probe_download(
    fetcher: &dyn Fetcher,
    template: &str,
    start: VersionProbe,
    dest: &Path,
) -> Result<ProbeHit> {
    let mut probe = start;
    let mut attempts = 0;

    loop {
        attempts += 1;
        let url = probe.url(template);
        info!("Trying download with version {probe}");
        debug!("Artifact URL: {url}");

        match try_version(fetcher, &url, dest) {
            Ok(true) => {
                info!("Downloaded {} to {}", url, dest.display());
                return Ok(ProbeHit {
                    version: probe,
                    url,
                    path: dest.to_path_buf(),
                    attempts,
                });
            }
            Ok(false) => {}
            Err(e) => debug!(error = %e, "probe attempt failed"),
        }

        if probe.minor == 0 {
            return DownloadExhaustedSnafu {
                major: start.major,
                start_minor: start.minor,
                attempts,
            }
            .fail();
        }
        probe.minor -= 1;
    }
}
