//! mcp-provenance: build-provenance auditor for MCP server packages.
//!
//! Reads the MCP server registry, resolves each npm/PyPI package into its
//! full dependency tree, verifies published build attestations for every
//! artifact in the tree, and summarizes the results.
//!
//! # Quick Start
//!
//! ```no_run
//! use mcp_provenance::{collect, CollectOptions};
//!
//! let options = CollectOptions {
//!     limit: Some(2),
//!     ..CollectOptions::default()
//! };
//! let report = mcp_provenance::collect(&options).unwrap();
//! println!("processed: {}, failed: {}", report.run.processed, report.run.failed);
//! ```

pub mod attestation;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod summary;

use std::path::PathBuf;

use config::{Config, CONFIG_FILE_NAME};
use error::Result;
use model::PackageSummaries;
use pipeline::{Pipeline, RunReport};
use registry::RegistryEntry;

/// Options for a collect invocation. Unset fields fall back to config.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// Path to config file (defaults to `.mcp-provenance.toml`).
    pub config_path: Option<PathBuf>,
    /// Output directory override.
    pub out_dir: Option<PathBuf>,
    /// Registry URL or path override.
    pub registry: Option<String>,
    /// Stop after this many persisted entries.
    pub limit: Option<usize>,
}

/// Result of a complete collect run.
#[derive(Debug)]
pub struct CollectReport {
    pub run: RunReport,
    pub summaries: PackageSummaries,
    pub summary_path: PathBuf,
}

/// Run a complete audit: load registry, resolve, verify, persist, summarize.
pub fn collect(options: &CollectOptions) -> Result<CollectReport> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    let config = Config::load(&config_path)?;

    let out_dir = options
        .out_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());
    let source = options
        .registry
        .clone()
        .unwrap_or_else(|| config.registry.url.clone());

    let entries = registry::load(&source, config.attestation.timeout())?;
    let pipeline = Pipeline::from_config(&config, out_dir)?;
    run_and_summarize(&pipeline, &entries, options.limit)
}

/// Run `pipeline` over `entries`, then summarize its records into
/// `summary.json` beside the `packages/` directory.
pub fn run_and_summarize(
    pipeline: &Pipeline,
    entries: &[RegistryEntry],
    limit: Option<usize>,
) -> Result<CollectReport> {
    let run = pipeline.run(entries, limit)?;

    let mut summaries = summary::summarize_dir(&pipeline.packages_dir())?;
    summaries.run_id = Some(run.run_id.clone());

    let summary_path = pipeline.out_dir().join("summary.json");
    summary::write_summaries(&summaries, &summary_path)?;
    tracing::info!(path = %summary_path.display(), packages = summaries.packages.len(), "wrote summary");

    Ok(CollectReport {
        run,
        summaries,
        summary_path,
    })
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::attestation::fakes::{FakeOracle, FakeSource};
    use crate::attestation::{NpmVerifier, PypiVerifier};
    use crate::error::AuditError;
    use crate::model::{Ecosystem, ErrorCode, PackageInfo};
    use crate::resolver::lockgen::LockfileGenerator;
    use crate::resolver::{NpmResolver, PypiResolver};

    const GITHUB_ISSUER: &str = "https://token.actions.githubusercontent.com";

    /// Hands out canned lockfiles by requested package name.
    struct CannedLocks {
        ecosystem: Ecosystem,
        locks: HashMap<String, Vec<u8>>,
    }

    impl CannedLocks {
        fn new(ecosystem: Ecosystem) -> Self {
            Self {
                ecosystem,
                locks: HashMap::new(),
            }
        }

        fn with(mut self, name: &str, lock: impl Into<Vec<u8>>) -> Self {
            self.locks.insert(name.to_string(), lock.into());
            self
        }
    }

    impl LockfileGenerator for CannedLocks {
        fn ecosystem(&self) -> Ecosystem {
            self.ecosystem
        }

        fn generate(&self, name: &str, _constraint: &str) -> Result<Vec<u8>> {
            self.locks.get(name).cloned().ok_or_else(|| AuditError::Resolver {
                ecosystem: self.ecosystem,
                message: format!("No matching version found for {name}"),
            })
        }
    }

    /// `package-lock.json` with the given `(name, version, deps)` entries.
    fn npm_lock(entries: Vec<(&str, &str, Vec<&str>)>) -> Vec<u8> {
        let mut packages = serde_json::Map::new();
        packages.insert("".into(), json!({"name": "example-project", "version": "1.0.0"}));
        for (name, version, deps) in entries {
            let deps: serde_json::Map<String, serde_json::Value> =
                deps.iter().map(|d| (d.to_string(), json!("*"))).collect();
            packages.insert(
                format!("node_modules/{name}"),
                json!({"version": version, "integrity": "sha512-AQID", "dependencies": deps}),
            );
        }
        serde_json::to_vec(&json!({"lockfileVersion": 3, "packages": packages})).unwrap()
    }

    fn npm_provenance(issuer: &str) -> serde_json::Value {
        json!({"attestations": [
            {"predicateType": "https://slsa.dev/provenance/v1", "bundle": {"issuer": issuer}}
        ]})
    }

    fn npm_entry(name: &str, repo: Option<&str>) -> RegistryEntry {
        RegistryEntry {
            registry: "npm".into(),
            name: name.into(),
            repo_url: repo.map(str::to_string),
            description: String::new(),
        }
    }

    fn npm_pipeline(out: &std::path::Path, locks: CannedLocks, source: Arc<FakeSource>) -> Pipeline {
        Pipeline::new(out)
            .with_resolver(NpmResolver::new(locks).unwrap())
            .with_verifier(NpmVerifier::new(source, Arc::new(FakeOracle)))
    }

    fn read_record(pipeline: &Pipeline, stem: &str) -> PackageInfo {
        let path = pipeline.packages_dir().join(format!("{stem}.json"));
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn attested_leaf_package_end_to_end() {
        let out = tempfile::tempdir().unwrap();
        let locks = CannedLocks::new(Ecosystem::Npm).with("left-pad", npm_lock(vec![("left-pad", "1.3.0", vec![])]));
        let source = Arc::new(FakeSource::default().with("left-pad@1.3.0", npm_provenance(GITHUB_ISSUER)));
        let pipeline = npm_pipeline(out.path(), locks, source);

        let report = run_and_summarize(&pipeline, &[npm_entry("left-pad", None)], None).unwrap();

        assert_eq!(report.run.processed, 1);
        assert_eq!(report.run.failed, 0);
        let info = read_record(&pipeline, "npm_left-pad");
        let artifact = &info.packages["left-pad"].artifacts[0];
        assert_eq!(artifact.name, "pkg:npm/left-pad@1.3.0");
        assert_eq!(artifact.hash, "sha512:010203");
        assert_eq!(artifact.attestations[0].issuer(), Some(GITHUB_ISSUER));

        let summary = &report.summaries.packages[0];
        assert_eq!(summary.name, "left-pad");
        assert_eq!(summary.deps, 0);
        assert!(!summary.has_error);
        assert_eq!(summary.attestation_issuers, vec![GITHUB_ISSUER]);
        assert_eq!(report.summaries.run_id.as_deref(), Some(report.run.run_id.as_str()));

        let written: PackageSummaries =
            serde_json::from_str(&std::fs::read_to_string(&report.summary_path).unwrap()).unwrap();
        assert_eq!(written, report.summaries);
    }

    #[test]
    fn cyclic_entry_is_skipped_and_batch_continues() {
        let out = tempfile::tempdir().unwrap();
        let locks = CannedLocks::new(Ecosystem::Npm)
            .with("loop-a", npm_lock(vec![("loop-a", "1.0.0", vec!["loop-b"]), ("loop-b", "1.0.0", vec!["loop-a"])]))
            .with("left-pad", npm_lock(vec![("left-pad", "1.3.0", vec![])]));
        let pipeline = npm_pipeline(out.path(), locks, Arc::new(FakeSource::default()));

        let report = run_and_summarize(
            &pipeline,
            &[npm_entry("loop-a", None), npm_entry("unknown-pkg", None), npm_entry("left-pad", None)],
            None,
        )
        .unwrap();

        assert_eq!((report.run.processed, report.run.failed), (1, 2));
        assert!(!pipeline.packages_dir().join("npm_loop-a.json").exists());
        let names: Vec<&str> = report.summaries.packages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["left-pad"]);
    }

    #[test]
    fn missing_attestations_flag_root_and_dependencies() {
        let out = tempfile::tempdir().unwrap();
        let locks = CannedLocks::new(Ecosystem::Npm).with(
            "@scope/server",
            npm_lock(vec![
                ("@scope/server", "2.0.0", vec!["zod", "ghost"]),
                ("zod", "3.23.8", vec![]),
            ]),
        );
        let source = Arc::new(FakeSource::default().with("zod@3.23.8", npm_provenance(GITHUB_ISSUER)));
        let pipeline = npm_pipeline(out.path(), locks, source);

        let report = run_and_summarize(&pipeline, &[npm_entry("@scope/server", None)], None).unwrap();

        let info = read_record(&pipeline, "npm_@scope@server");
        assert_eq!(
            info.packages["@scope/server"].artifacts[0].attestations[0].error_code(),
            Some(ErrorCode::Missing)
        );
        assert_eq!(info.unresolved.len(), 1);
        assert_eq!(info.unresolved[0].dependency, "ghost");

        let summary = &report.summaries.packages[0];
        assert!(summary.has_error);
        assert_eq!(summary.deps, 1);
        assert_eq!(summary.deps_errors, 0);
        assert!(summary.attestation_issuers.is_empty());
    }

    #[test]
    fn shared_dependencies_are_verified_once_per_run() {
        let out = tempfile::tempdir().unwrap();
        let locks = CannedLocks::new(Ecosystem::Npm)
            .with("a", npm_lock(vec![("a", "1.0.0", vec!["zod"]), ("zod", "3.23.8", vec![])]))
            .with("b", npm_lock(vec![("b", "1.0.0", vec!["zod"]), ("zod", "3.23.8", vec![])]));
        let source = Arc::new(FakeSource::default());
        let pipeline = npm_pipeline(out.path(), locks, Arc::clone(&source));

        let report = pipeline.run(&[npm_entry("a", None), npm_entry("b", None)], None).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(source.fetches(), 3);
        assert_eq!(report.cache_entries, 3);
    }

    #[test]
    fn limit_counts_persisted_entries() {
        let out = tempfile::tempdir().unwrap();
        let locks = CannedLocks::new(Ecosystem::Npm)
            .with("a", npm_lock(vec![("a", "1.0.0", vec![])]))
            .with("b", npm_lock(vec![("b", "1.0.0", vec![])]))
            .with("c", npm_lock(vec![("c", "1.0.0", vec![])]));
        let pipeline = npm_pipeline(out.path(), locks, Arc::new(FakeSource::default()));

        let entries = [
            npm_entry("broken", None),
            npm_entry("a", None),
            npm_entry("b", None),
            npm_entry("c", None),
        ];
        let report = pipeline.run(&entries, Some(2)).unwrap();

        assert_eq!((report.processed, report.failed), (2, 1));
        assert!(pipeline.packages_dir().join("npm_b.json").exists());
        assert!(!pipeline.packages_dir().join("npm_c.json").exists());
    }

    const POETRY_LOCK: &str = r#"
[[package]]
name = "oceanbase-mcp-server"
version = "0.1.2"
files = [
    {file = "oceanbase_mcp_server-0.1.2-py3-none-any.whl", hash = "sha256:aa"},
]

[package.dependencies]
mcp = ">=1.0"

[[package]]
name = "mcp"
version = "1.9.4"
files = [
    {file = "mcp-1.9.4-py3-none-any.whl", hash = "sha256:bb"},
]
"#;

    fn pypi_provenance(repository: &str) -> serde_json::Value {
        json!({"version": 1, "attestation_bundles": [{
            "publisher": {"kind": "GitHub", "repository": repository, "workflow": "publish.yml"},
            "attestations": [{"issuer": GITHUB_ISSUER, "statement": {"_type": "https://in-toto.io/Statement/v1"}}],
        }]})
    }

    #[test]
    fn pypi_repository_mismatch_only_checks_the_root() {
        let out = tempfile::tempdir().unwrap();
        let source = Arc::new(
            FakeSource::default()
                .with("oceanbase_mcp_server-0.1.2-py3-none-any.whl", pypi_provenance("someone/fork"))
                .with("mcp-1.9.4-py3-none-any.whl", pypi_provenance("modelcontextprotocol/python-sdk")),
        );
        let pipeline = Pipeline::new(out.path())
            .with_resolver(
                PypiResolver::new(
                    CannedLocks::new(Ecosystem::Pypi).with("oceanbase_mcp_server", POETRY_LOCK),
                )
                .unwrap(),
            )
            .with_verifier(PypiVerifier::new(source, Arc::new(FakeOracle)));

        let entry = RegistryEntry {
            registry: "pypi".into(),
            name: "oceanbase_mcp_server".into(),
            repo_url: Some("https://github.com/oceanbase/mcp-oceanbase".into()),
            description: "OceanBase".into(),
        };
        let report = run_and_summarize(&pipeline, &[entry], None).unwrap();
        assert_eq!(report.run.processed, 1);

        let info = read_record(&pipeline, "pypi_oceanbase-mcp-server");
        let root_attestations = &info.packages["oceanbase-mcp-server"].artifacts[0].attestations;
        assert_eq!(root_attestations.len(), 1);
        assert_eq!(root_attestations[0].error_code(), Some(ErrorCode::Verification));

        let dep_attestations = &info.packages["mcp"].artifacts[0].attestations;
        assert_eq!(dep_attestations[0].issuer(), Some(GITHUB_ISSUER));
        assert!(dep_attestations[0].statement().is_some());

        let summary = &report.summaries.packages[0];
        assert!(summary.has_error);
        assert_eq!(summary.deps, 1);
        assert_eq!(summary.deps_errors, 0);
    }

    #[test]
    fn collect_reads_registry_file_and_config() {
        let work = tempfile::tempdir().unwrap();
        let registry = work.path().join("seed.json");
        std::fs::write(
            &registry,
            json!([{"repository": {"url": "https://github.com/x/y"}, "packages": [{"registry_name": "docker", "name": "x"}]}])
                .to_string(),
        )
        .unwrap();
        let out = work.path().join("out");

        let report = collect(&CollectOptions {
            config_path: Some(work.path().join("absent.toml")),
            out_dir: Some(out.clone()),
            registry: Some(registry.to_string_lossy().into_owned()),
            limit: None,
        })
        .unwrap();

        assert_eq!(report.run.processed, 0);
        assert!(report.summaries.packages.is_empty());
        assert_eq!(report.summary_path, out.join("summary.json"));
        assert!(report.summary_path.exists());
    }

    #[test]
    fn summary_only_covers_records_of_the_current_run() {
        let out = tempfile::tempdir().unwrap();
        let stale = out.path().join("packages/npm_retired-server.json");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "{}").unwrap();

        let locks = CannedLocks::new(Ecosystem::Npm).with("leaf", npm_lock(vec![("leaf", "1.0.0", vec![])]));
        let source = Arc::new(FakeSource::default());
        let pipeline = npm_pipeline(out.path(), locks, source);
        let report = run_and_summarize(&pipeline, &[npm_entry("leaf", None)], None).unwrap();

        assert!(!stale.exists());
        let names: Vec<&str> = report.summaries.packages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["leaf"]);
        assert_eq!(report.summaries.run_id.as_deref(), Some(pipeline.run_id()));
    }

    #[test]
    fn resolver_rejects_a_generator_of_another_ecosystem() {
        let result = NpmResolver::new(CannedLocks::new(Ecosystem::Pypi));
        assert!(matches!(result, Err(AuditError::Config(_))));
        assert!(PypiResolver::new(CannedLocks::new(Ecosystem::Pypi)).is_ok());
    }
}
