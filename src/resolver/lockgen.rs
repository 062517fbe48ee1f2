//! Lockfile synthesis through external package managers.
//!
//! Each call creates a throwaway project in its own temporary directory,
//! asks the package manager to lock it, and returns the raw lockfile bytes.
//! Nothing is installed.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{AuditError, Result};
use crate::model::Ecosystem;

/// Produces an ecosystem-native lockfile for a single requested package.
pub trait LockfileGenerator: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Lock `name` at `constraint` and return the lockfile contents.
    fn generate(&self, name: &str, constraint: &str) -> Result<Vec<u8>>;
}

/// `npm install --package-lock-only` in a scratch project.
#[derive(Debug, Clone)]
pub struct NpmLockGenerator {
    pub program: String,
}

impl Default for NpmLockGenerator {
    fn default() -> Self {
        Self {
            program: "npm".into(),
        }
    }
}

impl LockfileGenerator for NpmLockGenerator {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn generate(&self, name: &str, constraint: &str) -> Result<Vec<u8>> {
        let work = tempfile::Builder::new().prefix("npm-lock-").tempdir()?;

        let mut deps = serde_json::Map::new();
        deps.insert(name.to_string(), constraint.into());
        let manifest = serde_json::json!({
            "name": "example-project",
            "version": "1.0.0",
            "dependencies": deps,
        });
        std::fs::write(
            work.path().join("package.json"),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        let mut cmd = Command::new(&self.program);
        cmd.args(["install", "--package-lock-only"]);
        run_tool(Ecosystem::Npm, cmd, work.path())?;

        Ok(std::fs::read(work.path().join("package-lock.json"))?)
    }
}

/// `poetry lock` in a scratch project.
#[derive(Debug, Clone)]
pub struct PoetryLockGenerator {
    pub program: String,
    /// Python requirement written into the scratch project.
    pub python: String,
}

impl Default for PoetryLockGenerator {
    fn default() -> Self {
        Self {
            program: "poetry".into(),
            python: ">=3.13,<3.14".into(),
        }
    }
}

impl PoetryLockGenerator {
    fn pyproject(&self, name: &str, constraint: &str) -> Result<String> {
        let mut deps = toml::Table::new();
        deps.insert("python".into(), self.python.clone().into());
        deps.insert(Ecosystem::Pypi.normalize_name(name), constraint.into());

        let mut poetry = toml::Table::new();
        poetry.insert("name".into(), "example-project".into());
        poetry.insert("version".into(), "0.1.0".into());
        poetry.insert("dependencies".into(), toml::Value::Table(deps));

        let mut tool = toml::Table::new();
        tool.insert("poetry".into(), toml::Value::Table(poetry));

        let mut build = toml::Table::new();
        build.insert(
            "requires".into(),
            toml::Value::Array(vec!["poetry-core>=1.0.0".into()]),
        );
        build.insert("build-backend".into(), "poetry.core.masonry.api".into());

        let mut doc = toml::Table::new();
        doc.insert("tool".into(), toml::Value::Table(tool));
        doc.insert("build-system".into(), toml::Value::Table(build));

        toml::to_string(&doc).map_err(|e| AuditError::Resolver {
            ecosystem: Ecosystem::Pypi,
            message: format!("rendering pyproject.toml: {e}"),
        })
    }
}

impl LockfileGenerator for PoetryLockGenerator {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn generate(&self, name: &str, constraint: &str) -> Result<Vec<u8>> {
        let work = tempfile::Builder::new().prefix("poetry-lock-").tempdir()?;

        std::fs::write(
            work.path().join("pyproject.toml"),
            self.pyproject(name, constraint)?,
        )?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("lock");
        run_tool(Ecosystem::Pypi, cmd, work.path())?;

        Ok(std::fs::read(work.path().join("poetry.lock"))?)
    }
}

/// Run a package-manager command inside `dir`, turning failures into
/// `AuditError::Resolver` with the tail of its stderr.
fn run_tool(ecosystem: Ecosystem, mut cmd: Command, dir: &Path) -> Result<()> {
    tracing::debug!(%ecosystem, dir = %dir.display(), "running lockfile generator");

    let output = cmd
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| AuditError::Resolver {
            ecosystem,
            message: format!("failed to start {:?}: {e}", cmd.get_program()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(AuditError::Resolver {
            ecosystem,
            message: format!(
                "{:?} exited with {}: {}",
                cmd.get_program(),
                output.status,
                tail.join(" | ")
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyproject_declares_folded_dependency() {
        let generator = PoetryLockGenerator::default();
        let text = generator.pyproject("oceanbase_mcp_server", "*").unwrap();
        let value: toml::Value = toml::from_str(&text).unwrap();
        let deps = &value["tool"]["poetry"]["dependencies"];
        assert_eq!(deps["oceanbase-mcp-server"].as_str(), Some("*"));
        assert_eq!(deps["python"].as_str(), Some(">=3.13,<3.14"));
        assert_eq!(value["tool"]["poetry"]["name"].as_str(), Some("example-project"));
    }

    #[test]
    fn missing_program_is_a_resolver_error() {
        let generator = NpmLockGenerator {
            program: "definitely-not-a-real-npm-binary".into(),
        };
        match generator.generate("left-pad", "*") {
            Err(AuditError::Resolver { ecosystem, .. }) => assert_eq!(ecosystem, Ecosystem::Npm),
            other => panic!("expected resolver error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_resolver_error() {
        let generator = PoetryLockGenerator {
            program: "false".into(),
            ..PoetryLockGenerator::default()
        };
        assert!(matches!(
            generator.generate("requests", "*"),
            Err(AuditError::Resolver { .. })
        ));
    }
}
