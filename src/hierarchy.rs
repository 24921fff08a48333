//! Directory-tree reconstruction from parsed file paths.
//!
//! Every file path maps to exactly one leaf; ancestor directories are
//! inserted as synthetic nodes even when the dump never lists them.
//! Children are sorted by name, so building twice over the same records
//! yields structurally equal trees.

use std::collections::BTreeMap;

use crate::models::{FileRecord, HierarchyNode};

/// Build the hierarchy tree for a parsed snapshot.
pub fn build_hierarchy(files: &[FileRecord]) -> HierarchyNode {
    let mut root = DirBuilder::default();
    for file in files {
        root.insert(&file.path);
    }
    root.into_node(String::new(), String::new())
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: BTreeMap<String, ()>,
}

impl DirBuilder {
    fn insert(&mut self, path: &str) {
        match path.split_once('/') {
            Some((dir, rest)) => self.dirs.entry(dir.to_string()).or_default().insert(rest),
            None => {
                self.files.insert(path.to_string(), ());
            }
        }
    }

    fn into_node(self, name: String, path: String) -> HierarchyNode {
        let join = |child: &str| {
            if path.is_empty() {
                child.to_string()
            } else {
                format!("{path}/{child}")
            }
        };

        // BTreeMap iteration keeps both groups name-sorted; directories
        // listed before files, the way the ingestion tree renders them.
        let mut children: Vec<HierarchyNode> = Vec::new();
        for (dir_name, builder) in self.dirs {
            let child_path = join(&dir_name);
            children.push(builder.into_node(dir_name, child_path));
        }
        for (file_name, ()) in self.files {
            let child_path = join(&file_name);
            children.push(HierarchyNode {
                name: file_name,
                path: child_path,
                is_dir: false,
                children: Vec::new(),
            });
        }

        HierarchyNode {
            name,
            path,
            is_dir: true,
            children,
        }
    }
}

/// Depth-first walk over every node in the tree, root included.
pub fn walk<'a>(node: &'a HierarchyNode, visit: &mut dyn FnMut(&'a HierarchyNode)) {
    visit(node);
    for child in &node.children {
        walk(child, visit);
    }
}
