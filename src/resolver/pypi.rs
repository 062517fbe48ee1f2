use serde::Deserialize;

use super::lockgen::LockfileGenerator;
use super::{check_generator, hash, ordered_keys, PackageResolver};
use crate::error::{AuditError, Result};
use crate::model::{Artifact, Ecosystem, Package, Packages};

/// PyPI resolver: `poetry.lock` from a lockfile generator.
pub struct PypiResolver {
    generator: Box<dyn LockfileGenerator>,
}

impl PypiResolver {
    /// Fails when `generator` locks another ecosystem.
    pub fn new(generator: impl LockfileGenerator + 'static) -> Result<Self> {
        check_generator(Ecosystem::Pypi, &generator)?;
        Ok(Self {
            generator: Box::new(generator),
        })
    }
}

impl PackageResolver for PypiResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn resolve(&self, name: &str, constraint: &str) -> Result<Packages> {
        let lock = self.generator.generate(name, constraint)?;
        parse_poetry_lock(&lock)
    }
}

#[derive(Deserialize)]
struct PoetryLock {
    #[serde(default)]
    package: Vec<LockPackage>,
}

#[derive(Deserialize)]
struct LockPackage {
    name: String,
    version: String,
    #[serde(default, deserialize_with = "ordered_keys")]
    dependencies: Vec<String>,
    #[serde(default)]
    files: Vec<LockFile>,
}

#[derive(Deserialize)]
struct LockFile {
    file: String,
    hash: String,
}

/// Parse `poetry.lock` into the flat package map.
///
/// Each listed distribution file (wheel or sdist) becomes one artifact.
pub fn parse_poetry_lock(data: &[u8]) -> Result<Packages> {
    let text = std::str::from_utf8(data).map_err(|e| lock_error(format!("not UTF-8: {e}")))?;
    let lock: PoetryLock = toml::from_str(text).map_err(|e| lock_error(e.to_string()))?;

    let mut packages = Packages::new();
    for pkg in lock.package {
        let name = Ecosystem::Pypi.normalize_name(&pkg.name);

        let artifacts = pkg
            .files
            .into_iter()
            .map(|f| {
                let digest = hash::parse_canonical(&f.hash)?;
                Ok(Artifact::new(f.file, digest.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let dependencies = pkg
            .dependencies
            .iter()
            .map(|d| Ecosystem::Pypi.normalize_name(d))
            .collect();

        if packages.contains_key(&name) {
            tracing::debug!(package = %name, version = %pkg.version, "duplicate lock entry, keeping the last one");
        }
        packages.insert(
            name,
            Package {
                ecosystem: Ecosystem::Pypi,
                version: pkg.version,
                artifacts,
                dependencies,
            },
        );
    }

    Ok(packages)
}

fn lock_error(message: impl Into<String>) -> AuditError {
    AuditError::Lockfile {
        ecosystem: Ecosystem::Pypi,
        message: message.into(),
    }
}
