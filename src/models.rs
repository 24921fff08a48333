//! Core data models used throughout RepoLens.
//!
//! These types represent the file records, chunks, embeddings, and derived
//! graph data that flow through the indexing and retrieval pipeline. A full
//! repository snapshot is held in a [`KnowledgeIndex`], which is immutable
//! once built and is replaced wholesale on re-ingestion — never mutated in
//! place. All snapshot types serialize wholesale with serde so an index can
//! be persisted and restored as one record per fingerprint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Language tag inferred from a file's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Python,
    JavaScript,
    TypeScript,
    Java,
    C,
    Cpp,
    CSharp,
    Go,
    Rust,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    Html,
    Css,
    Markdown,
    Json,
    Yaml,
    Toml,
    Xml,
    Sql,
    Shell,
    Unknown,
}

impl Lang {
    /// Infer the language from a repository-relative path.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        // A name without a dot has no extension.
        if !name.contains('.') {
            return Lang::Unknown;
        }
        let ext = name.rsplit('.').next().unwrap_or("");
        match ext.to_ascii_lowercase().as_str() {
            "py" => Lang::Python,
            "js" | "jsx" | "mjs" | "cjs" => Lang::JavaScript,
            "ts" | "tsx" => Lang::TypeScript,
            "java" => Lang::Java,
            "c" | "h" => Lang::C,
            "cpp" | "cc" | "cxx" | "hpp" => Lang::Cpp,
            "cs" => Lang::CSharp,
            "go" => Lang::Go,
            "rs" => Lang::Rust,
            "php" => Lang::Php,
            "rb" => Lang::Ruby,
            "swift" => Lang::Swift,
            "kt" | "kts" => Lang::Kotlin,
            "scala" => Lang::Scala,
            "html" | "htm" => Lang::Html,
            "css" | "scss" | "less" => Lang::Css,
            "md" | "markdown" => Lang::Markdown,
            "json" => Lang::Json,
            "yaml" | "yml" => Lang::Yaml,
            "toml" => Lang::Toml,
            "xml" => Lang::Xml,
            "sql" => Lang::Sql,
            "sh" | "bash" | "zsh" => Lang::Shell,
            _ => Lang::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::Python => "python",
            Lang::JavaScript => "javascript",
            Lang::TypeScript => "typescript",
            Lang::Java => "java",
            Lang::C => "c",
            Lang::Cpp => "cpp",
            Lang::CSharp => "csharp",
            Lang::Go => "go",
            Lang::Rust => "rust",
            Lang::Php => "php",
            Lang::Ruby => "ruby",
            Lang::Swift => "swift",
            Lang::Kotlin => "kotlin",
            Lang::Scala => "scala",
            Lang::Html => "html",
            Lang::Css => "css",
            Lang::Markdown => "markdown",
            Lang::Json => "json",
            Lang::Yaml => "yaml",
            Lang::Toml => "toml",
            Lang::Xml => "xml",
            Lang::Sql => "sql",
            Lang::Shell => "shell",
            Lang::Unknown => "unknown",
        }
    }
}

/// Coarse file category used for corpus statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Source,
    Documentation,
    Configuration,
    Web,
    Script,
    Other,
}

impl FileKind {
    pub fn from_lang(lang: Lang) -> Self {
        match lang {
            Lang::Python
            | Lang::JavaScript
            | Lang::TypeScript
            | Lang::Java
            | Lang::C
            | Lang::Cpp
            | Lang::CSharp
            | Lang::Go
            | Lang::Rust
            | Lang::Php
            | Lang::Ruby
            | Lang::Swift
            | Lang::Kotlin
            | Lang::Scala => FileKind::Source,
            Lang::Markdown => FileKind::Documentation,
            Lang::Json | Lang::Yaml | Lang::Toml | Lang::Xml => FileKind::Configuration,
            Lang::Html | Lang::Css => FileKind::Web,
            Lang::Shell | Lang::Sql => FileKind::Script,
            Lang::Unknown => FileKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Source => "source",
            FileKind::Documentation => "documentation",
            FileKind::Configuration => "configuration",
            FileKind::Web => "web",
            FileKind::Script => "script",
            FileKind::Other => "other",
        }
    }
}

/// One source file reconstructed from the ingestion dump.
///
/// Created once per parse pass and immutable thereafter. `path` is
/// normalized (forward slashes, no `..` segments) and unique within a
/// snapshot. Binary files are metadata-only stubs with empty content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: String,
    pub size_bytes: u64,
    pub line_count: u64,
    pub language: Lang,
    pub is_binary: bool,
}

impl FileRecord {
    pub fn kind(&self) -> FileKind {
        FileKind::from_lang(self.language)
    }
}

/// Directory or file node in the tree reconstructed from record paths.
///
/// Children are sorted by name, so two builds over the same record list
/// are structurally equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Final path segment (`""` for the synthetic root).
    pub name: String,
    /// Full repository-relative path (`""` for the root).
    pub path: String,
    pub is_dir: bool,
    pub children: Vec<HierarchyNode>,
}

/// What kind of relationship a [`Dependency`] declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepKind {
    Import,
    ManifestDependency,
}

/// A declared relationship extracted from import statements or manifests.
///
/// `target` is the identifier as written (module path, package name);
/// unresolved targets are retained as-is with no resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub source_file: String,
    pub target: String,
    pub kind: DepKind,
}

/// A retrievable unit of file text.
///
/// Chunks from one file are non-overlapping runs of whole lines;
/// concatenating them in `ordinal` order reproduces the file content
/// byte-for-byte. `id` is deterministic for fixed (path, ordinal, text).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub source_file: String,
    /// 1-based, inclusive.
    pub start_line: u64,
    /// 1-based, inclusive.
    pub end_line: u64,
    pub text: String,
    /// Within-file order, starting at 0.
    pub ordinal: u64,
}

/// An embedding vector for one chunk.
///
/// At most one per chunk per snapshot; all vectors in a snapshot share one
/// dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
}

/// Immutable snapshot of everything known about one ingested repository.
///
/// Built once per fingerprint, shared as `Arc<KnowledgeIndex>`, and
/// replaced (never merged) on re-ingestion. The fingerprint is a content
/// hash of the dump, so identical content across re-fetches reuses the
/// resident snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeIndex {
    pub fingerprint: String,
    pub files: Vec<FileRecord>,
    pub hierarchy: HierarchyNode,
    pub dependencies: Vec<Dependency>,
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<EmbeddingRecord>,
    /// Files per language label.
    pub language_stats: BTreeMap<String, u64>,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeIndex {
    /// True when some chunks have no embedding (isolated upstream
    /// failures). A partial index is still queryable.
    pub fn is_partial(&self) -> bool {
        self.embeddings.len() < self.chunks.len()
    }
}

/// Node kind in the derived dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Directory,
    File,
    /// An unresolved dependency target, e.g. an external package.
    External,
}

/// Edge kind in the derived dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Contains,
    Import,
    ManifestDependency,
}

/// Read-only graph node projected from the hierarchy and dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Repository path for file/directory nodes; `None` for externals.
    pub path: Option<String>,
    pub language: Option<String>,
    /// Reserved for a generated description; layout and summaries are a
    /// visualization concern.
    pub summary: Option<String>,
}

/// Read-only graph edge projected from the hierarchy and dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Graph topology handed to the visualization layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub chunk: Chunk,
    pub score: f32,
}

/// A grounded, source-attributed answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_text: String,
    /// `path:start-end` references cited by the answer.
    pub cited_sources: Vec<String>,
    /// Top retrieval score, clamped to `[0, 1]`. Not the model's own
    /// claim.
    pub confidence: f32,
    /// False when retrieval found nothing above threshold and the
    /// inference service was never invoked.
    pub grounded: bool,
}

/// Outcome of one ingestion attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub fingerprint: String,
    pub status: IngestStatus,
    pub file_count: usize,
    pub chunk_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// All chunks embedded.
    Ready,
    /// Index built but some embeddings are missing.
    Partial,
    /// The fingerprint was already resident; no work performed.
    Unchanged,
}

/// Observable state of a fingerprint's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Building { embedded: usize, total: usize },
    Ready,
    Partial,
    Evicted,
    NotFound,
}

/// Corpus statistics derived from a snapshot. Counts only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub fingerprint: String,
    pub file_count: usize,
    pub chunk_count: usize,
    pub embedded_count: usize,
    pub dependency_count: usize,
    pub languages: BTreeMap<String, u64>,
    pub file_kinds: BTreeMap<String, u64>,
}
