use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::StatusCode;

use crate::error::{AuditError, Result};

pub const DEFAULT_NPM_BASE_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_PYPI_BASE_URL: &str = "https://pypi.org";

/// Where the evidence for one artifact lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceLocator<'a> {
    Npm {
        name: &'a str,
        version: &'a str,
    },
    Pypi {
        name: &'a str,
        version: &'a str,
        filename: &'a str,
    },
}

/// Published provenance evidence, fetched by locator.
pub trait AttestationSource: Send + Sync {
    /// `Ok(None)` when the source has no evidence for the artifact.
    fn fetch(&self, locator: &EvidenceLocator<'_>) -> Result<Option<serde_json::Value>>;
}

/// The npm registry attestations endpoint and the PyPI integrity API.
pub struct HttpAttestationSource {
    client: HttpClient,
    npm_base_url: String,
    pypi_base_url: String,
}

impl HttpAttestationSource {
    pub fn new(npm_base_url: &str, pypi_base_url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(concat!("mcp-provenance/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            npm_base_url: npm_base_url.trim_end_matches('/').to_string(),
            pypi_base_url: pypi_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, locator: &EvidenceLocator<'_>) -> String {
        match locator {
            EvidenceLocator::Npm { name, version } => {
                format!("{}/-/npm/v1/attestations/{name}@{version}", self.npm_base_url)
            }
            EvidenceLocator::Pypi {
                name,
                version,
                filename,
            } => format!(
                "{}/integrity/{name}/{version}/{filename}/provenance",
                self.pypi_base_url
            ),
        }
    }
}

impl AttestationSource for HttpAttestationSource {
    fn fetch(&self, locator: &EvidenceLocator<'_>) -> Result<Option<serde_json::Value>> {
        let url = self.url_for(locator);
        tracing::debug!(%url, "fetching provenance evidence");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| AuditError::Transport {
                message: format!("GET {url} failed"),
                source: Some(e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::FORBIDDEN && matches!(locator, EvidenceLocator::Pypi { .. }) {
            return Err(AuditError::transport(format!(
                "access to provenance is temporarily disabled by PyPI administrators ({url})"
            )));
        }
        if !status.is_success() {
            return Err(AuditError::transport(format!("GET {url} returned {status}")));
        }

        let body = response.json::<serde_json::Value>().map_err(|e| AuditError::Transport {
            message: format!("GET {url} returned an unreadable body"),
            source: Some(e),
        })?;
        Ok(Some(body))
    }
}
