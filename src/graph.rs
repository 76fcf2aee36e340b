//! Graphviz rendering of the dependency graph walked by the resolver.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::closure::ClosureReport;

fn node_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render the edges of `report` as a DOT digraph.
///
/// The root is a blue box, external libraries are orange, other resolved
/// libraries grey, and unresolved references red diamonds.
pub fn render_dot(report: &ClosureReport, title: &str) -> String {
    let mut out = String::new();
    let mut declared: HashSet<String> = HashSet::new();
    let mut edges: Vec<(String, String)> = Vec::new();

    out.push_str(&format!("digraph {} {{\n", quote(title)));
    out.push_str("  rankdir=LR;\n");

    let root = node_name(&report.root);
    out.push_str(&format!(
        "  {} [shape=box, style=filled, color=lightblue];\n",
        quote(&root)
    ));
    declared.insert(root);

    for edge in &report.edges {
        let from = node_name(&edge.from);
        let (to, attrs) = match &edge.resolved {
            Some(resolved) if edge.external => (node_name(resolved), "style=filled, color=orange"),
            Some(resolved) => (node_name(resolved), "style=filled, color=lightgrey"),
            None => (
                format!("Unresolved: {}", node_name(Path::new(&edge.reference))),
                "shape=diamond, style=filled, color=red",
            ),
        };
        if declared.insert(to.clone()) {
            out.push_str(&format!("  {} [{}];\n", quote(&to), attrs));
        }
        if !edges.contains(&(from.clone(), to.clone())) {
            edges.push((from, to));
        }
    }

    for (from, to) in &edges {
        out.push_str(&format!("  {} -> {};\n", quote(from), quote(to)));
    }
    out.push_str("}\n");
    out
}

/// Write the DOT rendering of `report` to `path`.
pub fn write_dot(report: &ClosureReport, title: &str, path: &Path) -> Result<()> {
    fs::write(path, render_dot(report, title))
        .with_context(|| format!("Failed to write dependency graph: {}", path.display()))
}
