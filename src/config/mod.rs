use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::attestation::source::{DEFAULT_NPM_BASE_URL, DEFAULT_PYPI_BASE_URL};
use crate::error::{AuditError, Result};
use crate::registry::DEFAULT_REGISTRY_URL;

pub const CONFIG_FILE_NAME: &str = ".mcp-provenance.toml";

/// Top-level configuration from `.mcp-provenance.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Seed file URL or local path.
    pub url: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Version constraint requested for every registry package.
    pub version_constraint: String,
    pub npm_program: String,
    pub poetry_program: String,
    /// Python requirement of the scratch project poetry locks against.
    pub python_constraint: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            version_constraint: "*".into(),
            npm_program: "npm".into(),
            poetry_program: "poetry".into(),
            python_constraint: ">=3.13,<3.14".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    pub npm_base_url: String,
    pub pypi_base_url: String,
    /// HTTP timeout for evidence and registry downloads.
    pub timeout_secs: u64,
    /// Verification oracle program and arguments. Unset rejects all evidence.
    pub oracle_command: Option<Vec<String>>,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            npm_base_url: DEFAULT_NPM_BASE_URL.into(),
            pypi_base_url: DEFAULT_PYPI_BASE_URL.into(),
            timeout_secs: 30,
            oracle_command: None,
        }
    }
}

impl AttestationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving `packages/*.json` and `summary.json`.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("web/data"),
        }
    }
}

impl Config {
    /// Load config from a TOML file. Returns default if file doesn't exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.attestation.timeout_secs == 0 {
            return Err(AuditError::Config(
                "attestation.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.resolver.version_constraint.trim().is_empty() {
            return Err(AuditError::Config(
                "resolver.version_constraint must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Generate a starter config file.
    pub fn starter_toml() -> &'static str {
        r#"# mcp-provenance configuration

[registry]
# Registry seed file: URL or local path.
url = "https://raw.githubusercontent.com/modelcontextprotocol/registry/refs/heads/main/data/seed.json"

[resolver]
# Version constraint requested for every registry package.
version_constraint = "*"
npm_program = "npm"
poetry_program = "poetry"
python_constraint = ">=3.13,<3.14"

[attestation]
npm_base_url = "https://registry.npmjs.org"
pypi_base_url = "https://pypi.org"
timeout_secs = 30
# External verifier: reads an evidence bundle as JSON on stdin and prints
# the verified certificate claims as JSON. Without it every attestation is
# reported as a verification failure.
# oracle_command = ["sigstore-oracle", "--json"]

[output]
dir = "web/data"
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load(Path::new("/nonexistent/.mcp-provenance.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.resolver.version_constraint, "*");
        assert_eq!(config.attestation.timeout(), Duration::from_secs(30));
        assert_eq!(config.registry.url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn starter_toml_parses_to_defaults() {
        let config: Config = toml::from_str(Config::starter_toml()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
[attestation]
timeout_secs = 5
oracle_command = ["verify-bundle", "--strict"]

[output]
dir = "out"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.attestation.timeout_secs, 5);
        assert_eq!(
            config.attestation.oracle_command,
            Some(vec!["verify-bundle".to_string(), "--strict".to_string()])
        );
        assert_eq!(config.attestation.npm_base_url, DEFAULT_NPM_BASE_URL);
        assert_eq!(config.output.dir, PathBuf::from("out"));
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[attestation]\ntimeout_secs = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AuditError::Config(_))));
    }
}
