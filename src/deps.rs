//! Declared-dependency extraction.
//!
//! Best-effort text pattern matching over import statements and known
//! manifest files — not parsing. Extraction is keyed by language tag
//! through a strategy table; unrecognized languages contribute nothing,
//! malformed source never errors, unmatched lines are skipped.

use crate::models::{DepKind, Dependency, FileRecord, Lang};

type Extractor = fn(&str, &str, &mut Vec<Dependency>);

/// Extract every declared dependency from a parsed snapshot.
pub fn extract_dependencies(files: &[FileRecord]) -> Vec<Dependency> {
    let mut deps = Vec::new();
    for file in files {
        if file.is_binary || file.content.is_empty() {
            continue;
        }
        if let Some(extract) = manifest_extractor(&file.path) {
            extract(&file.path, &file.content, &mut deps);
            continue;
        }
        if let Some(extract) = extractor_for(file.language) {
            extract(&file.path, &file.content, &mut deps);
        }
    }
    deps
}

/// Strategy table: language tag → import extractor.
fn extractor_for(lang: Lang) -> Option<Extractor> {
    match lang {
        Lang::Python => Some(extract_python),
        Lang::JavaScript | Lang::TypeScript => Some(extract_javascript),
        Lang::Rust => Some(extract_rust),
        Lang::Go => Some(extract_go),
        Lang::Java => Some(extract_java),
        Lang::Ruby => Some(extract_ruby),
        Lang::C | Lang::Cpp => Some(extract_c_include),
        _ => None,
    }
}

/// Known manifest filenames → manifest extractor.
fn manifest_extractor(path: &str) -> Option<Extractor> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name {
        "package.json" => Some(extract_package_json),
        "requirements.txt" => Some(extract_requirements_txt),
        "Cargo.toml" => Some(extract_cargo_toml),
        "go.mod" => Some(extract_go_mod),
        _ => None,
    }
}

fn push_import(deps: &mut Vec<Dependency>, source: &str, target: &str) {
    let target = target.trim();
    if !target.is_empty() {
        deps.push(Dependency {
            source_file: source.to_string(),
            target: target.to_string(),
            kind: DepKind::Import,
        });
    }
}

fn push_manifest(deps: &mut Vec<Dependency>, source: &str, target: &str) {
    let target = target.trim();
    if !target.is_empty() {
        deps.push(Dependency {
            source_file: source.to_string(),
            target: target.to_string(),
            kind: DepKind::ManifestDependency,
        });
    }
}

// ============ Import extractors ============

fn extract_python(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("import ") {
            // `import a.b, c as d` declares a.b and c.
            for part in rest.split(',') {
                let module = part.split_whitespace().next().unwrap_or("");
                push_import(deps, path, module);
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            if let Some(module) = rest.split_whitespace().next() {
                push_import(deps, path, module);
            }
        }
    }
}

fn extract_javascript(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if line.starts_with("import ") || line.starts_with("export ") {
            if let Some(rest) = line.split(" from ").nth(1) {
                push_import(deps, path, quoted(rest));
            } else if let Some(rest) = line.strip_prefix("import ") {
                // Side-effect import: `import './polyfill'`.
                let q = quoted(rest);
                if !q.is_empty() {
                    push_import(deps, path, q);
                }
            }
        } else if let Some(pos) = line.find("require(") {
            push_import(deps, path, quoted(&line[pos + "require(".len()..]));
        }
    }
}

fn extract_rust(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("use ") {
            let target = rest
                .trim_end_matches(';')
                .split([' ', '{'])
                .next()
                .unwrap_or("")
                .trim_end_matches("::");
            push_import(deps, path, target);
        } else if let Some(rest) = line.strip_prefix("extern crate ") {
            push_import(deps, path, rest.trim_end_matches(';'));
        } else if let Some(rest) = line.strip_prefix("mod ") {
            if let Some(name) = rest.strip_suffix(';') {
                push_import(deps, path, name);
            }
        }
    }
}

fn extract_go(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    let mut in_block = false;
    for line in content.lines() {
        let line = line.trim();
        if in_block {
            if line.starts_with(')') {
                in_block = false;
            } else {
                push_import(deps, path, quoted(line));
            }
        } else if line.starts_with("import (") {
            in_block = true;
        } else if let Some(rest) = line.strip_prefix("import ") {
            push_import(deps, path, quoted(rest));
        }
    }
}

fn extract_java(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("import ") {
            let rest = rest.strip_prefix("static ").unwrap_or(rest);
            push_import(deps, path, rest.trim_end_matches(';'));
        }
    }
}

fn extract_ruby(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if let Some(rest) = line
            .strip_prefix("require_relative ")
            .or_else(|| line.strip_prefix("require "))
        {
            push_import(deps, path, quoted(rest));
        }
    }
}

fn extract_c_include(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("#include") {
            let rest = rest.trim();
            let target = if rest.starts_with('<') {
                rest.trim_start_matches('<').split('>').next().unwrap_or("")
            } else {
                quoted(rest)
            };
            push_import(deps, path, target);
        }
    }
}

/// First single- or double-quoted token in `s`, or `""`.
fn quoted(s: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(start) = s.find(quote) {
            if let Some(len) = s[start + 1..].find(quote) {
                return &s[start + 1..start + 1 + len];
            }
        }
    }
    ""
}

// ============ Manifest extractors ============

fn extract_package_json(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(content) else {
        return;
    };
    for section in ["dependencies", "devDependencies"] {
        if let Some(map) = json.get(section).and_then(|v| v.as_object()) {
            for name in map.keys() {
                push_manifest(deps, path, name);
            }
        }
    }
}

fn extract_requirements_txt(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
            continue;
        }
        let name = line
            .split(['=', '>', '<', '~', '!', '[', ';', ' '])
            .next()
            .unwrap_or("");
        push_manifest(deps, path, name);
    }
}

fn extract_cargo_toml(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    let Ok(value) = content.parse::<toml::Value>() else {
        return;
    };
    let tables = [
        &["dependencies"][..],
        &["dev-dependencies"],
        &["build-dependencies"],
        &["workspace", "dependencies"],
    ];
    for table_path in tables {
        let mut cur = Some(&value);
        for key in table_path {
            cur = cur.and_then(|v| v.get(key));
        }
        if let Some(table) = cur.and_then(|v| v.as_table()) {
            for name in table.keys() {
                push_manifest(deps, path, name);
            }
        }
    }
}

fn extract_go_mod(path: &str, content: &str, deps: &mut Vec<Dependency>) {
    let mut in_block = false;
    for line in content.lines() {
        let line = line.trim();
        if in_block {
            if line.starts_with(')') {
                in_block = false;
            } else if let Some(module) = line.split_whitespace().next() {
                push_manifest(deps, path, module);
            }
        } else if line.starts_with("require (") {
            in_block = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some(module) = rest.split_whitespace().next() {
                push_manifest(deps, path, module);
            }
        }
    }
}
