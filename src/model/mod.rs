//! Data model shared by resolvers, verifiers, the pipeline and the summarizer.
//!
//! Resolvers produce a `PackageInfo`. Verifiers fill in artifact attestations.
//! The summarizer only ever reads persisted `PackageInfo` documents.

pub mod attestation;
pub mod summary;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use attestation::{Attestation, Claims, ErrorCode};
pub use summary::{PackageSummaries, PackageSummary};

/// Package name, normalized per ecosystem.
pub type PackageName = String;

/// Flat map of every package discovered while resolving one root package.
pub type Packages = BTreeMap<PackageName, Package>;

/// Package ecosystem backing a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    Pypi,
}

impl Ecosystem {
    /// Map a registry's `registry_name` onto a supported ecosystem.
    pub fn from_registry_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "npm" => Some(Self::Npm),
            "pypi" => Some(Self::Pypi),
            _ => None,
        }
    }

    /// Normalize a package name the way this ecosystem's lockfiles key it.
    ///
    /// npm names (including `@scope/name`) are kept verbatim; PyPI folds
    /// `_` to `-`.
    pub fn normalize_name(&self, name: &str) -> String {
        match self {
            Self::Npm => name.to_string(),
            Self::Pypi => name.replace('_', "-"),
        }
    }

    /// File stem used when persisting a package record.
    pub fn record_stem(&self, name: &str) -> String {
        format!("{}_{}", self, name.replace('/', "@"))
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Npm => write!(f, "npm"),
            Self::Pypi => write!(f, "pypi"),
        }
    }
}

/// One distributable file of a package version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Stable identifier: `pkg:npm/<name>@<version>` or a PyPI dist filename.
    pub name: String,
    /// Canonical `algorithm:hex` digest.
    pub hash: String,
    /// Attestations in discovery order. Empty until verification runs.
    #[serde(default)]
    pub attestations: Vec<Attestation>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            attestations: Vec::new(),
        }
    }

    /// Whether any attestation on this artifact is an error record.
    pub fn has_error(&self) -> bool {
        self.attestations.iter().any(|a| a.error_code().is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "type")]
    pub ecosystem: Ecosystem,
    pub version: String,
    pub artifacts: Vec<Artifact>,
    /// Declared dependency names. May reference names absent from the map.
    pub dependencies: Vec<PackageName>,
}

impl Package {
    pub fn has_error(&self) -> bool {
        self.artifacts.iter().any(Artifact::has_error)
    }
}

/// Node of the unfolded dependency tree. The same name may recur in
/// different branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTreeNode {
    pub name: PackageName,
    #[serde(default)]
    pub dependencies: Vec<DependencyTreeNode>,
}

impl DependencyTreeNode {
    pub fn leaf(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .dependencies
            .iter()
            .map(DependencyTreeNode::node_count)
            .sum::<usize>()
    }
}

/// A dependency name that could not be found in the resolved package map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionGap {
    /// Package declaring the dependency.
    pub package: PackageName,
    /// Dependency name missing from the map.
    pub dependency: PackageName,
}

/// Everything known about one registry entry's package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: PackageName,
    pub packages: Packages,
    pub tree: DependencyTreeNode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<ResolutionGap>,
}

impl PackageInfo {
    /// The root package record, if present in the map.
    pub fn root(&self) -> Option<&Package> {
        self.packages.get(&self.name)
    }
}
