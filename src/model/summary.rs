use serde::{Deserialize, Serialize};

use super::{Ecosystem, PackageName};

/// Compact audit view over one persisted `PackageInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: PackageName,
    pub version: String,
    #[serde(rename = "type")]
    pub ecosystem: Ecosystem,
    /// Distinct issuers seen on the root package's artifacts.
    #[serde(default)]
    pub attestation_issuers: Vec<String>,
    /// Number of dependencies (every package in the map except the root).
    #[serde(default)]
    pub deps: usize,
    /// Whether the root package has an error attestation.
    #[serde(default)]
    pub has_error: bool,
    /// Number of dependencies with an error attestation.
    #[serde(default)]
    pub deps_errors: usize,
}

/// The summary document written next to the per-package records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummaries {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageSummary>,
}
