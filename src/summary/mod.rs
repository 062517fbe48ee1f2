use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{AuditError, Result};
use crate::model::{PackageInfo, PackageSummaries, PackageSummary};

/// Condense one package record into its audit summary.
pub fn summarize_package_info(info: &PackageInfo) -> Result<PackageSummary> {
    let root = info.root().ok_or_else(|| {
        AuditError::Summary(format!(
            "root package {} missing from its own package map",
            info.name
        ))
    })?;

    let deps_errors = info
        .packages
        .iter()
        .filter(|(name, pkg)| **name != info.name && pkg.has_error())
        .count();

    let attestation_issuers: BTreeSet<&str> = root
        .artifacts
        .iter()
        .flat_map(|a| &a.attestations)
        .filter_map(|a| a.issuer())
        .collect();

    Ok(PackageSummary {
        name: info.name.clone(),
        version: root.version.clone(),
        ecosystem: root.ecosystem,
        attestation_issuers: attestation_issuers.into_iter().map(str::to_string).collect(),
        deps: info.packages.len().saturating_sub(1),
        has_error: root.has_error(),
        deps_errors,
    })
}

/// Summarize every `*.json` record in `dir`, in path order.
///
/// Records that cannot be read or summarized are logged and left out.
pub fn summarize_dir(dir: &Path) -> Result<PackageSummaries> {
    let dir_str = dir
        .to_str()
        .ok_or_else(|| AuditError::Summary(format!("{} is not valid UTF-8", dir.display())))?;
    let pattern = format!("{}/*.json", glob::Pattern::escape(dir_str));

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| AuditError::Summary(format!("bad pattern {pattern}: {e}")))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable directory entry, skipping");
                None
            }
        })
        .collect();
    paths.sort();

    let mut packages = Vec::with_capacity(paths.len());
    for path in &paths {
        match summarize_file(path) {
            Ok(summary) => packages.push(summary),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping package record"),
        }
    }
    tracing::info!(records = paths.len(), summarized = packages.len(), "summarized package records");

    Ok(PackageSummaries {
        generated_at: Some(chrono::Utc::now()),
        run_id: None,
        packages,
    })
}

fn summarize_file(path: &Path) -> Result<PackageSummary> {
    let content = std::fs::read_to_string(path)?;
    let info: PackageInfo = serde_json::from_str(&content)?;
    summarize_package_info(&info)
}

/// Write summaries as pretty JSON, creating the parent directory if needed.
pub fn write_summaries(summaries: &PackageSummaries, output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    crate::pipeline::write_json_atomic(parent, output, summaries)
}
