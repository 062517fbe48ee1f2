//! Batch audit over registry entries.
//!
//! For each entry: resolve the package, verify every artifact of every
//! package in its tree, then persist the `PackageInfo` record. A failing
//! entry is logged and skipped; nothing aborts the batch.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::attestation::{
    verify_cached, ArtifactRequest, AttestationSource, AttestationVerifier, CommandOracle,
    EvidenceOracle, HttpAttestationSource, NpmVerifier, PypiVerifier, VerificationCache,
};
use crate::config::Config;
use crate::error::{AuditError, Result};
use crate::model::{Ecosystem, Package, PackageInfo};
use crate::registry::RegistryEntry;
use crate::resolver::lockgen::{NpmLockGenerator, PoetryLockGenerator};
use crate::resolver::{resolve_info, NpmResolver, PackageResolver, PypiResolver};

/// Outcome counters of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: String,
    /// Entries persisted.
    pub processed: usize,
    /// Entries that failed and were skipped.
    pub failed: usize,
    /// Entries of ecosystems without a resolver/verifier pair.
    pub skipped: usize,
    /// Distinct verification results cached during the run.
    pub cache_entries: usize,
}

pub struct Pipeline {
    resolvers: BTreeMap<Ecosystem, Box<dyn PackageResolver>>,
    verifiers: BTreeMap<Ecosystem, Box<dyn AttestationVerifier>>,
    cache: VerificationCache,
    constraint: String,
    out_dir: PathBuf,
    run_id: String,
}

impl Pipeline {
    /// An empty pipeline writing under `out_dir`. Register collaborators
    /// with `with_resolver` and `with_verifier`.
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            resolvers: BTreeMap::new(),
            verifiers: BTreeMap::new(),
            cache: VerificationCache::new(),
            constraint: "*".into(),
            out_dir: out_dir.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The npm + PyPI pipeline backed by external package managers, the
    /// public attestation endpoints and the configured oracle.
    pub fn from_config(config: &Config, out_dir: impl Into<PathBuf>) -> Result<Self> {
        let source: Arc<dyn AttestationSource> = Arc::new(HttpAttestationSource::new(
            &config.attestation.npm_base_url,
            &config.attestation.pypi_base_url,
            config.attestation.timeout(),
        )?);
        let oracle: Arc<dyn EvidenceOracle> =
            Arc::new(CommandOracle::new(config.attestation.oracle_command.clone()));

        Ok(Self::new(out_dir)
            .with_constraint(&config.resolver.version_constraint)
            .with_resolver(NpmResolver::new(NpmLockGenerator {
                program: config.resolver.npm_program.clone(),
            })?)
            .with_resolver(PypiResolver::new(PoetryLockGenerator {
                program: config.resolver.poetry_program.clone(),
                python: config.resolver.python_constraint.clone(),
            })?)
            .with_verifier(NpmVerifier::new(Arc::clone(&source), Arc::clone(&oracle)))
            .with_verifier(PypiVerifier::new(source, oracle)))
    }

    pub fn with_resolver(mut self, resolver: impl PackageResolver + 'static) -> Self {
        self.resolvers.insert(resolver.ecosystem(), Box::new(resolver));
        self
    }

    pub fn with_verifier(mut self, verifier: impl AttestationVerifier + 'static) -> Self {
        self.verifiers.insert(verifier.ecosystem(), Box::new(verifier));
        self
    }

    pub fn with_constraint(mut self, constraint: &str) -> Self {
        self.constraint = constraint.to_string();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Directory holding one JSON record per processed entry.
    pub fn packages_dir(&self) -> PathBuf {
        self.out_dir.join("packages")
    }

    fn supports(&self, ecosystem: Ecosystem) -> bool {
        self.resolvers.contains_key(&ecosystem) && self.verifiers.contains_key(&ecosystem)
    }

    /// Process `entries` in order until `limit` records have been persisted.
    ///
    /// Records from earlier runs are removed first. Only failing to prepare
    /// the output directory is an error; per-entry failures are counted in
    /// the report.
    pub fn run(&self, entries: &[RegistryEntry], limit: Option<usize>) -> Result<RunReport> {
        std::fs::create_dir_all(self.packages_dir())?;
        self.clear_records()?;

        let mut report = RunReport {
            run_id: self.run_id.clone(),
            ..RunReport::default()
        };

        for entry in entries {
            if limit.is_some_and(|limit| report.processed >= limit) {
                tracing::info!(limit = ?limit, "entry limit reached");
                break;
            }

            let Some(ecosystem) = entry.ecosystem().filter(|e| self.supports(*e)) else {
                tracing::debug!(registry = %entry.registry, package = %entry.name, "unsupported ecosystem, skipping");
                report.skipped += 1;
                continue;
            };

            let span = tracing::info_span!("entry", %ecosystem, package = %entry.name);
            let _guard = span.enter();
            tracing::info!("processing registry entry");

            let outcome = self
                .process_entry(entry, ecosystem)
                .and_then(|info| self.persist(ecosystem, &info));
            match outcome {
                Ok(path) => {
                    report.processed += 1;
                    tracing::info!(path = %path.display(), "persisted package record");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "failed to process registry entry, skipping");
                }
            }
        }

        report.cache_entries = self.cache.len();
        tracing::info!(
            run_id = %report.run_id,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            cache_entries = report.cache_entries,
            cache_hits = self.cache.hits(),
            "batch run finished"
        );
        Ok(report)
    }

    /// Remove records left by earlier runs so the directory holds this run only.
    fn clear_records(&self) -> Result<()> {
        let mut removed = 0;
        for entry in std::fs::read_dir(self.packages_dir())? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "cleared package records of a previous run");
        }
        Ok(())
    }

    /// Resolve one entry and attach attestations to every artifact.
    ///
    /// The entry's repository is only expected of the root package.
    pub fn process_entry(&self, entry: &RegistryEntry, ecosystem: Ecosystem) -> Result<PackageInfo> {
        let resolver = self
            .resolvers
            .get(&ecosystem)
            .ok_or_else(|| unsupported(ecosystem))?;
        let verifier = self
            .verifiers
            .get(&ecosystem)
            .ok_or_else(|| unsupported(ecosystem))?;

        let mut info = resolve_info(resolver.as_ref(), &entry.name, &self.constraint)?;
        let root = info.name.clone();

        for (name, package) in info.packages.iter_mut() {
            let expected_repo_url = if *name == root {
                entry.repo_url.as_deref()
            } else {
                None
            };
            self.verify_package(verifier.as_ref(), name, package, expected_repo_url)?;
        }

        Ok(info)
    }

    fn verify_package(
        &self,
        verifier: &dyn AttestationVerifier,
        name: &str,
        package: &mut Package,
        expected_repo_url: Option<&str>,
    ) -> Result<()> {
        let Package {
            version, artifacts, ..
        } = package;

        for artifact in artifacts.iter_mut() {
            let request = ArtifactRequest {
                package: name,
                version: version.as_str(),
                artifact: &artifact.name,
                hash: &artifact.hash,
                expected_repo_url,
            };
            let attestations = verify_cached(&self.cache, verifier, &request)?;
            tracing::debug!(
                artifact = %artifact.name,
                attestations = attestations.len(),
                errors = attestations.iter().filter(|a| a.error_code().is_some()).count(),
                "verified artifact"
            );
            artifact.attestations = attestations;
        }
        Ok(())
    }

    /// Write the record next to its final path, then rename it into place.
    fn persist(&self, ecosystem: Ecosystem, info: &PackageInfo) -> Result<PathBuf> {
        let dir = self.packages_dir();
        let path = dir.join(format!("{}.json", ecosystem.record_stem(&info.name)));
        write_json_atomic(&dir, &path, info)?;
        Ok(path)
    }
}

/// Serialize `value` as pretty JSON into `path` via a temp file in `dir`.
pub(crate) fn write_json_atomic<T: Serialize>(dir: &Path, path: &Path, value: &T) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.persist(path).map_err(|e| AuditError::Io(e.error))?;
    Ok(())
}

fn unsupported(ecosystem: Ecosystem) -> AuditError {
    AuditError::Config(format!("no resolver/verifier registered for {ecosystem}"))
}
