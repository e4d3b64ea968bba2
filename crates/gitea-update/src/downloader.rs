// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Binary downloader with optional SHA256 verification

use crate::error::{Result, UpdaterError};
use crate::registry::Service;
use semver::Version;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub const USER_AGENT: &str = concat!("gitea-update/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client; every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| UpdaterError::Network(format!("Failed to build HTTP client: {e}")))
}

/// Substitute `{bin}` and `{version}` in a URL template
pub fn expand_template(template: &str, bin_name: &str, version: &Version) -> String {
    template
        .replace("{bin}", bin_name)
        .replace("{version}", &version.to_string())
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::from_client(build_client(timeout)?))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url`; transport failures and non-2xx statuses are network errors
    pub async fn fetch(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| UpdaterError::Network(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(UpdaterError::Network(format!(
                "GET {url} returned status {}",
                response.status()
            )));
        }

        Ok(response)
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.fetch(url)
            .await?
            .text()
            .await
            .map_err(|e| UpdaterError::Network(format!("Failed to read {url}: {e}")))
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .fetch(url)
            .await?
            .bytes()
            .await
            .map_err(|e| UpdaterError::Network(format!("Failed to download {url}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Download the binary of `service` at `version`, verifying its SHA-256
    /// when the service publishes a checksum file.
    pub async fn download_binary(&self, service: &Service, version: &Version) -> Result<Vec<u8>> {
        let url = expand_template(&service.urls.download, &service.bin_name, version);
        tracing::debug!(service = %service.bin_name, "Downloading {version} from {url}");

        let bytes = self.fetch_bytes(&url).await?;
        if bytes.is_empty() {
            return Err(UpdaterError::MalformedResponse {
                url,
                reason: "empty body".to_string(),
            });
        }

        if let Some(ref template) = service.urls.checksum {
            let checksum_url = expand_template(template, &service.bin_name, version);
            let content = self.fetch_text(&checksum_url).await?;
            let file_name = url.rsplit('/').next().unwrap_or(&service.bin_name);
            let expected = parse_sha256_file(&content, file_name).ok_or_else(|| {
                UpdaterError::MalformedResponse {
                    url: checksum_url.clone(),
                    reason: format!("no SHA-256 entry for {file_name}"),
                }
            })?;

            let actual = sha256_hex(&bytes);
            if actual != expected {
                return Err(UpdaterError::ChecksumMismatch { expected, actual });
            }
            tracing::debug!(service = %service.bin_name, "Checksum verified: {actual}");
        }

        tracing::debug!(
            service = %service.bin_name,
            "Downloaded {} bytes",
            bytes.len()
        );
        Ok(bytes)
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Find the hash for `file_name` in `sha256sum` output.
///
/// A file holding a single bare hash is accepted as well.
pub fn parse_sha256_file(content: &str, file_name: &str) -> Option<String> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty()).peekable();

    let mut bare = None;
    while let Some(line) = lines.next() {
        let is_last = lines.peek().is_none();
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [hash, name, ..] if name.trim_start_matches('*') == file_name => {
                return Some(hash.to_lowercase());
            }
            [hash] if bare.is_none() && is_last => {
                bare = Some(hash.to_lowercase());
            }
            _ => {}
        }
    }

    bare.filter(|h| h.len() == 64 && h.chars().all(|c| c.is_ascii_hexdigit()))
}
