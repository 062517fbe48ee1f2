//! Dependency tree construction and display.
//!
//! The flat package map is unfolded from the root into a tree. Shared
//! dependencies are repeated under every parent that declares them; a name
//! appearing twice on one root-to-leaf path is a cycle.
//!
//! ```text
//! mcp-server==1.2.0 (1 artifacts)
//!   zod==3.23.8 (1 artifacts)
//!   express==4.19.2 (1 artifacts)
//!     body-parser==1.20.2 (1 artifacts)
//! ```

use crate::error::{AuditError, Result};
use crate::model::{DependencyTreeNode, PackageInfo, Packages, ResolutionGap};

/// Result of unfolding a package map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeBuild {
    pub tree: DependencyTreeNode,
    /// Declared dependencies that were missing from the map, in discovery order.
    pub gaps: Vec<ResolutionGap>,
}

/// Unfold `packages` into a tree rooted at `root`.
///
/// Returns `Ok(None)` when `root` itself is not in the map. Dependency
/// names missing from the map end their branch and are reported as gaps.
pub fn build_tree(packages: &Packages, root: &str) -> Result<Option<TreeBuild>> {
    if !packages.contains_key(root) {
        return Ok(None);
    }

    let mut path: Vec<&str> = Vec::new();
    let mut gaps = Vec::new();
    let tree = build_node(packages, root, &mut path, &mut gaps)?;

    Ok(Some(TreeBuild { tree, gaps }))
}

fn build_node<'a>(
    packages: &'a Packages,
    name: &'a str,
    path: &mut Vec<&'a str>,
    gaps: &mut Vec<ResolutionGap>,
) -> Result<DependencyTreeNode> {
    if path.contains(&name) {
        let mut cycle: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        cycle.push(name.to_string());
        return Err(AuditError::CircularDependency {
            package: name.to_string(),
            path: cycle,
        });
    }

    // Callers only descend into names present in the map.
    let Some(pkg) = packages.get(name) else {
        return Ok(DependencyTreeNode::leaf(name));
    };

    path.push(name);
    let mut children = Vec::with_capacity(pkg.dependencies.len());
    for dep in &pkg.dependencies {
        if packages.contains_key(dep.as_str()) {
            children.push(build_node(packages, dep, path, gaps)?);
        } else {
            gaps.push(ResolutionGap {
                package: name.to_string(),
                dependency: dep.clone(),
            });
        }
    }
    path.pop();

    Ok(DependencyTreeNode {
        name: name.to_string(),
        dependencies: children,
    })
}

/// Render a package's tree, one `name==version (N artifacts)` line per node.
pub fn render_tree(info: &PackageInfo) -> String {
    let mut out = String::new();
    render_node(&mut out, &info.tree, &info.packages, 0);
    out
}

fn render_node(out: &mut String, node: &DependencyTreeNode, packages: &Packages, indent: usize) {
    let prefix = " ".repeat(indent);
    match packages.get(&node.name) {
        Some(pkg) => out.push_str(&format!(
            "{prefix}{}=={} ({} artifacts)\n",
            node.name,
            pkg.version,
            pkg.artifacts.len()
        )),
        None => out.push_str(&format!("{prefix}{} (unresolved)\n", node.name)),
    }

    for child in &node.dependencies {
        render_node(out, child, packages, indent + 2);
    }
}
