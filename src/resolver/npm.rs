use std::collections::BTreeMap;

use serde::Deserialize;

use super::lockgen::LockfileGenerator;
use super::{check_generator, hash, ordered_keys, PackageResolver};
use crate::error::{AuditError, Result};
use crate::model::{Artifact, Ecosystem, Package, Packages};

/// npm resolver: `package-lock.json` (lockfile v2/v3) from a lockfile generator.
pub struct NpmResolver {
    generator: Box<dyn LockfileGenerator>,
}

impl NpmResolver {
    /// Fails when `generator` locks another ecosystem.
    pub fn new(generator: impl LockfileGenerator + 'static) -> Result<Self> {
        check_generator(Ecosystem::Npm, &generator)?;
        Ok(Self {
            generator: Box::new(generator),
        })
    }
}

impl PackageResolver for NpmResolver {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn resolve(&self, name: &str, constraint: &str) -> Result<Packages> {
        let lock = self.generator.generate(name, constraint)?;
        parse_npm_lock(&lock)
    }
}

#[derive(Deserialize)]
struct PackageLock {
    packages: Option<BTreeMap<String, LockEntry>>,
}

#[derive(Deserialize)]
struct LockEntry {
    version: Option<String>,
    integrity: Option<String>,
    #[serde(default)]
    link: bool,
    #[serde(default, deserialize_with = "ordered_keys")]
    dependencies: Vec<String>,
}

/// Parse `package-lock.json` into the flat package map.
///
/// The root project entry (`""`) is skipped and symlinked workspace entries
/// carry no tarball, so they are skipped too. Every other entry gets exactly
/// one artifact, located as `pkg:npm/<name>@<version>`.
pub fn parse_npm_lock(data: &[u8]) -> Result<Packages> {
    let lock: PackageLock = serde_json::from_slice(data).map_err(|e| lock_error(e.to_string()))?;
    let entries = lock
        .packages
        .ok_or_else(|| lock_error("no \"packages\" section (lockfileVersion 1 is not supported)"))?;

    let mut packages = Packages::new();
    for (path, entry) in entries {
        if path.is_empty() || entry.link {
            continue;
        }

        // Nested installs keep their path (`express/node_modules/zod`) so they
        // stay distinct from the hoisted copy of the same package.
        let name = path.strip_prefix("node_modules/").unwrap_or(&path).to_string();
        let version = entry
            .version
            .ok_or_else(|| lock_error(format!("{name}: missing version")))?;
        let integrity = entry.integrity.ok_or_else(|| {
            AuditError::UnsupportedEncoding(format!("{name}@{version}: no integrity hash"))
        })?;
        let digest = hash::normalize_sri(&integrity)?;

        let locator = format!("pkg:npm/{name}@{version}");
        packages.insert(
            name,
            Package {
                ecosystem: Ecosystem::Npm,
                version,
                artifacts: vec![Artifact::new(locator, digest.to_string())],
                dependencies: entry.dependencies,
            },
        );
    }

    Ok(packages)
}

fn lock_error(message: impl Into<String>) -> AuditError {
    AuditError::Lockfile {
        ecosystem: Ecosystem::Npm,
        message: message.into(),
    }
}
