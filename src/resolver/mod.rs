pub mod hash;
pub mod lockgen;
pub mod npm;
pub mod pypi;
pub mod tree;

use std::fmt;

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::Deserializer;

use crate::error::{AuditError, Result};
use crate::model::{Ecosystem, PackageInfo, Packages};

pub use npm::NpmResolver;
pub use pypi::PypiResolver;

/// A resolver turns a requested package into the flat map of everything it
/// transitively depends on, itself included.
pub trait PackageResolver: Send + Sync {
    /// The ecosystem this resolver handles.
    fn ecosystem(&self) -> Ecosystem;

    /// Resolve `name` at `constraint` into a flat package map.
    fn resolve(&self, name: &str, constraint: &str) -> Result<Packages>;
}

/// Fail unless `generator` locks projects of `expected`.
fn check_generator(expected: Ecosystem, generator: &dyn lockgen::LockfileGenerator) -> Result<()> {
    let actual = generator.ecosystem();
    if actual != expected {
        return Err(AuditError::Config(format!(
            "{expected} resolver cannot use a {actual} lockfile generator"
        )));
    }
    Ok(())
}

/// Resolve a package and unfold its dependency tree.
///
/// A root that is missing from its own resolution is an error; dependency
/// names missing from the map are kept as `unresolved` gaps.
pub fn resolve_info(
    resolver: &dyn PackageResolver,
    name: &str,
    constraint: &str,
) -> Result<PackageInfo> {
    let ecosystem = resolver.ecosystem();
    let root = ecosystem.normalize_name(name);
    let packages = resolver.resolve(name, constraint)?;

    let built = tree::build_tree(&packages, &root)?.ok_or_else(|| AuditError::RootNotResolved {
        ecosystem,
        package: root.clone(),
    })?;

    for gap in &built.gaps {
        tracing::warn!(
            %ecosystem,
            root = %root,
            package = %gap.package,
            dependency = %gap.dependency,
            "dependency missing from resolved packages, branch truncated"
        );
    }

    tracing::debug!(
        %ecosystem,
        root = %root,
        packages = packages.len(),
        nodes = built.tree.node_count(),
        "resolved dependency tree"
    );

    Ok(PackageInfo {
        name: root,
        packages,
        tree: built.tree,
        unresolved: built.gaps,
    })
}

/// Deserialize a map's keys in document order, ignoring the values.
///
/// Lockfiles declare dependencies as `name -> requirement` maps; only the
/// names matter and their order decides child order in the tree.
pub(crate) fn ordered_keys<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct KeysVisitor;

    impl<'de> Visitor<'de> for KeysVisitor {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of dependency names")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut keys = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, _)) = map.next_entry::<String, IgnoredAny>()? {
                keys.push(key);
            }
            Ok(keys)
        }
    }

    deserializer.deserialize_map(KeysVisitor)
}
