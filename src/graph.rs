//! Dependency-graph projection.
//!
//! Maps a snapshot's hierarchy and extracted dependencies onto graph
//! topology for visualization: one node per directory and file, one
//! `External` node per unresolved dependency target, containment edges
//! from the tree, and import/manifest edges from the dependency list.
//! Import targets are resolved to repository files by simple textual
//! mapping (dotted modules, relative paths); anything that doesn't map
//! stays an external node. Layout is a visualization concern and is not
//! computed here.
//!
//! The projection is pure: regenerated on demand from the current
//! snapshot, carrying no state of its own.

use std::collections::{HashMap, HashSet};

use crate::hierarchy::walk;
use crate::models::{
    DepKind, DependencyGraph, EdgeKind, GraphEdge, GraphNode, KnowledgeIndex, Lang, NodeKind,
};

/// Project a snapshot into graph topology.
pub fn build_graph(index: &KnowledgeIndex) -> DependencyGraph {
    let lang_by_path: HashMap<&str, Lang> = index
        .files
        .iter()
        .map(|f| (f.path.as_str(), f.language))
        .collect();
    let file_paths: HashSet<&str> = lang_by_path.keys().copied().collect();

    let mut nodes = Vec::new();
    let mut edges = Vec::new();

    // The synthetic root (empty path) is not drawn; top-level entries
    // simply have no containment parent.
    walk(&index.hierarchy, &mut |node| {
        if node.path.is_empty() {
            return;
        }
        nodes.push(GraphNode {
            id: node.path.clone(),
            label: node.name.clone(),
            kind: if node.is_dir {
                NodeKind::Directory
            } else {
                NodeKind::File
            },
            path: Some(node.path.clone()),
            language: (!node.is_dir)
                .then(|| lang_by_path.get(node.path.as_str()))
                .flatten()
                .map(|l| l.as_str().to_string()),
            summary: None,
        });
        for child in &node.children {
            edges.push(GraphEdge {
                from: node.path.clone(),
                to: child.path.clone(),
                kind: EdgeKind::Contains,
            });
        }
    });

    let mut externals: HashSet<String> = HashSet::new();

    for dep in &index.dependencies {
        let edge_kind = match dep.kind {
            DepKind::Import => EdgeKind::Import,
            DepKind::ManifestDependency => EdgeKind::ManifestDependency,
        };

        let resolved = match dep.kind {
            DepKind::Import => resolve_import(&dep.source_file, &dep.target, &file_paths),
            DepKind::ManifestDependency => None,
        };

        let to = match resolved {
            Some(path) => path,
            None => {
                let ext_id = format!("ext:{}", dep.target);
                if externals.insert(ext_id.clone()) {
                    nodes.push(GraphNode {
                        id: ext_id.clone(),
                        label: dep.target.clone(),
                        kind: NodeKind::External,
                        path: None,
                        language: None,
                        summary: None,
                    });
                }
                ext_id
            }
        };

        edges.push(GraphEdge {
            from: dep.source_file.clone(),
            to,
            kind: edge_kind,
        });
    }

    DependencyGraph { nodes, edges }
}

/// Map an import target onto a repository file, if a simple textual
/// interpretation finds one.
fn resolve_import(source: &str, target: &str, files: &HashSet<&str>) -> Option<String> {
    let source_dir = source.rsplit_once('/').map(|(d, _)| d).unwrap_or("");

    let mut candidates: Vec<String> = Vec::new();

    if target.starts_with("./") || target.starts_with("../") {
        if let Some(joined) = join_relative(source_dir, target) {
            push_with_extensions(&mut candidates, &joined, source);
        }
    } else if target.starts_with('.') {
        // Python-style relative module: `.utils` / `..pkg.mod`.
        let trimmed = target.trim_start_matches('.');
        let ups = target.len() - trimmed.len() - 1;
        let mut base = source_dir.to_string();
        for _ in 0..ups {
            base = base.rsplit_once('/').map(|(d, _)| d).unwrap_or("").to_string();
        }
        let path = trimmed.replace('.', "/");
        let joined = if base.is_empty() { path } else { format!("{base}/{path}") };
        candidates.push(format!("{joined}.py"));
        candidates.push(format!("{joined}/__init__.py"));
    } else {
        candidates.push(target.to_string());
        let slashed = target.replace('.', "/");
        candidates.push(format!("{slashed}.py"));
        candidates.push(format!("{slashed}/__init__.py"));
        // Bare names can be sibling modules (`mod parser;`, `#include "x.h"`).
        if !target.contains(['/', ':']) {
            let prefix = if source_dir.is_empty() {
                String::new()
            } else {
                format!("{source_dir}/")
            };
            candidates.push(format!("{prefix}{target}"));
            candidates.push(format!("{prefix}{target}.rs"));
            candidates.push(format!("{prefix}{target}/mod.rs"));
        }
    }

    candidates.into_iter().find(|c| files.contains(c.as_str()))
}

fn push_with_extensions(candidates: &mut Vec<String>, joined: &str, source: &str) {
    candidates.push(joined.to_string());
    let source_ext = source.rsplit('.').next().unwrap_or("");
    for ext in [source_ext, "js", "ts", "jsx", "tsx", "py"] {
        if !ext.is_empty() {
            candidates.push(format!("{joined}.{ext}"));
        }
    }
    for ext in ["js", "ts"] {
        candidates.push(format!("{joined}/index.{ext}"));
    }
}

/// Join a `./`/`../` path against a directory, rejecting escapes above
/// the repository root.
fn join_relative(dir: &str, rel: &str) -> Option<String> {
    let mut segments: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for seg in rel.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    use crate::deps::extract_dependencies;
    use crate::hierarchy::build_hierarchy;
    use crate::models::{Dependency, FileRecord};

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            content: content.to_string(),
            size_bytes: content.len() as u64,
            line_count: content.lines().count() as u64,
            language: Lang::from_path(path),
            is_binary: false,
        }
    }

    fn index_of(files: Vec<FileRecord>, dependencies: Vec<Dependency>) -> KnowledgeIndex {
        KnowledgeIndex {
            fingerprint: "fp".to_string(),
            hierarchy: build_hierarchy(&files),
            files,
            dependencies,
            chunks: Vec::new(),
            embeddings: Vec::new(),
            language_stats: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_nodes_and_containment_edges() {
        let files = vec![record("src/app.py", ""), record("README.md", "")];
        let graph = build_graph(&index_of(files, Vec::new()));

        let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert!(ids.contains("src"));
        assert!(ids.contains("src/app.py"));
        assert!(ids.contains("README.md"));

        assert!(graph
            .edges
            .iter()
            .any(|e| e.from == "src" && e.to == "src/app.py" && e.kind == EdgeKind::Contains));
        // Top-level entries have no containment parent.
        assert!(!graph.edges.iter().any(|e| e.to == "src" && e.kind == EdgeKind::Contains));
    }

    #[test]
    fn test_import_resolved_to_repository_file() {
        let files = vec![
            record("app.py", "from services.rag import build\n"),
            record("services/rag.py", "x = 1\n"),
        ];
        let deps = extract_dependencies(&files);
        let graph = build_graph(&index_of(files, deps));

        assert!(graph.edges.iter().any(|e| e.from == "app.py"
            && e.to == "services/rag.py"
            && e.kind == EdgeKind::Import));
    }

    #[test]
    fn test_unresolved_import_becomes_external_node() {
        let files = vec![record("app.py", "import flask\n")];
        let deps = extract_dependencies(&files);
        let graph = build_graph(&index_of(files, deps));

        let ext = graph
            .nodes
            .iter()
            .find(|n| n.kind == NodeKind::External)
            .unwrap();
        assert_eq!(ext.label, "flask");
        assert!(graph
            .edges
            .iter()
            .any(|e| e.from == "app.py" && e.to == ext.id && e.kind == EdgeKind::Import));
    }

    #[test]
    fn test_relative_js_import_resolution() {
        let files = vec![
            record("src/index.ts", "import { x } from './util';\n"),
            record("src/util.ts", "export const x = 1;\n"),
        ];
        let deps = extract_dependencies(&files);
        let graph = build_graph(&index_of(files, deps));

        assert!(graph
            .edges
            .iter()
            .any(|e| e.from == "src/index.ts" && e.to == "src/util.ts"));
    }

    #[test]
    fn test_manifest_dependencies_are_external() {
        let files = vec![record("package.json", r#"{"dependencies":{"react":"18"}}"#)];
        let deps = extract_dependencies(&files);
        let graph = build_graph(&index_of(files, deps));

        assert!(graph.edges.iter().any(|e| {
            e.from == "package.json"
                && e.to == "ext:react"
                && e.kind == EdgeKind::ManifestDependency
        }));
    }

    #[test]
    fn test_external_nodes_deduplicated() {
        let files = vec![
            record("a.py", "import requests\n"),
            record("b.py", "import requests\n"),
        ];
        let deps = extract_dependencies(&files);
        let graph = build_graph(&index_of(files, deps));

        let externals = graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::External)
            .count();
        assert_eq!(externals, 1);
        let import_edges = graph
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Import)
            .count();
        assert_eq!(import_edges, 2);
    }

    #[test]
    fn test_regeneration_is_pure() {
        let files = vec![
            record("src/a.py", "import os\n"),
            record("src/b.py", "from .a import x\n"),
        ];
        let deps = extract_dependencies(&files);
        let index = index_of(files, deps);
        let g1 = build_graph(&index);
        let g2 = build_graph(&index);
        assert_eq!(g1.nodes.len(), g2.nodes.len());
        assert_eq!(g1.edges.len(), g2.edges.len());
    }
}
