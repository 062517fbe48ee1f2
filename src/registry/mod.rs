//! MCP server registry feed.
//!
//! The registry's seed file lists servers, each with a source repository and
//! the packages it ships. Only npm and PyPI packages are auditable.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};
use crate::model::Ecosystem;

pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/modelcontextprotocol/registry/refs/heads/main/data/seed.json";

/// One package published by a registry server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Package registry name as written in the feed (`npm`, `pypi`, ...).
    pub registry: String,
    pub name: String,
    /// The server's source repository.
    pub repo_url: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl RegistryEntry {
    pub fn ecosystem(&self) -> Option<Ecosystem> {
        Ecosystem::from_registry_name(&self.registry)
    }
}

/// Flatten a seed document into one entry per npm/PyPI package.
///
/// Servers without packages contribute nothing; packages on other
/// registries (docker, nuget, ...) are dropped. Malformed server or package
/// objects are skipped.
pub fn sanitize(document: &serde_json::Value) -> Vec<RegistryEntry> {
    let Some(servers) = document.as_array() else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for server in servers {
        let repo_url = server
            .pointer("/repository/url")
            .and_then(|u| u.as_str())
            .map(str::to_string);
        let description = server
            .get("description")
            .and_then(|d| d.as_str())
            .unwrap_or_default();
        let Some(packages) = server.get("packages").and_then(|p| p.as_array()) else {
            continue;
        };

        for package in packages {
            let (Some(registry), Some(name)) = (
                package.get("registry_name").and_then(|r| r.as_str()),
                package.get("name").and_then(|n| n.as_str()),
            ) else {
                tracing::debug!(?package, "registry package without registry_name or name, skipping");
                continue;
            };
            if Ecosystem::from_registry_name(registry).is_none() {
                continue;
            }
            entries.push(RegistryEntry {
                registry: registry.to_string(),
                name: name.to_string(),
                repo_url: repo_url.clone(),
                description: description.to_string(),
            });
        }
    }
    entries
}

/// Load and sanitize the registry from an `http(s)://` URL or a local path.
pub fn load(source: &str, timeout: Duration) -> Result<Vec<RegistryEntry>> {
    let document: serde_json::Value = if source.starts_with("http://") || source.starts_with("https://") {
        tracing::info!(url = %source, "downloading registry");
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        client
            .get(source)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| AuditError::Transport {
                message: format!("failed to download registry from {source}"),
                source: Some(e),
            })?
    } else {
        let content = std::fs::read_to_string(Path::new(source))
            .map_err(|e| AuditError::Registry(format!("{source}: {e}")))?;
        serde_json::from_str(&content)?
    };

    if !document.is_array() {
        return Err(AuditError::Registry(format!(
            "{source}: expected a list of servers"
        )));
    }

    let entries = sanitize(&document);
    tracing::info!(entries = entries.len(), "loaded registry");
    Ok(entries)
}
