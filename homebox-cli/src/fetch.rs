//! HTTP downloads
//!
//! Installer scripts, the manifest archive and the agent disk image are all
//! fetched through a `Fetcher`, which keeps the network out of unit tests.

use snafu::{ResultExt, ensure};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DownloadSnafu, HttpStatusSnafu, Result, WriteFileSnafu};

pub trait Fetcher {
    /// Status code of a HEAD request against `url`.
    fn status(&self, url: &str) -> Result<u16>;

    /// Body of a successful GET against `url`.
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// `Fetcher` over a blocking reqwest client.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("homebox/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context(DownloadSnafu { url: String::new() })?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .head(url)
            .send()
            .context(DownloadSnafu { url })?;
        Ok(response.status().as_u16())
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .context(DownloadSnafu { url })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                url,
                status: status.as_u16(),
            }
        );

        let body = response.bytes().context(DownloadSnafu { url })?;
        Ok(body.to_vec())
    }
}

/// Download `url` into memory, logging the attempt the way every stage does.
pub fn download(fetcher: &dyn Fetcher, name: &str, url: &str) -> Result<Vec<u8>> {
    info!("Downloading {name} from: {url}");
    let body = fetcher.fetch(url)?;
    info!("Successfully downloaded {name}.");
    debug!(bytes = body.len(), "download size");
    Ok(body)
}

/// Download `url` and write it to `dest`.
pub fn download_to(fetcher: &dyn Fetcher, name: &str, url: &str, dest: &Path) -> Result<()> {
    let body = download(fetcher, name, url)?;
    fs::write(dest, body).context(WriteFileSnafu { path: dest })?;
    info!("Wrote file: {}", dest.display());
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory fetcher: known URLs answer 200 with a body, everything else 404.
    #[derive(Default)]
    pub struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn serve(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        pub fn requests(&self) -> Vec<String> {
            self.requests.borrow().clone()
        }
    }

    impl Fetcher for FakeFetcher {
        fn status(&self, url: &str) -> Result<u16> {
            self.requests.borrow_mut().push(url.to_string());
            Ok(if self.bodies.contains_key(url) { 200 } else { 404 })
        }

        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requests.borrow_mut().push(url.to_string());
            match self.bodies.get(url) {
                Some(body) => Ok(body.clone()),
                None => HttpStatusSnafu { url, status: 404u16 }.fail(),
            }
        }
    }
}
