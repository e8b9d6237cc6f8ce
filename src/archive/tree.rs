//! Path-segment trie over archive member paths

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Node {
    children: BTreeMap<String, Node>,
    is_file: bool,
}

/// Directory structure of an archive, built from its member paths
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileTree {
    root: Node,
}

/// Split a member path into segments, dropping empty and `.` segments
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from file paths
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tree = Self::new();
        for path in paths {
            tree.insert(path.as_ref());
        }
        tree
    }

    /// Insert a file path, creating intermediate directories
    pub fn insert(&mut self, path: &str) {
        let mut node = &mut self.root;
        let mut any = false;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
            any = true;
        }
        if any {
            node.is_file = true;
        }
    }

    /// Whether `path` names a file or directory in the tree
    pub fn contains(&self, path: &str) -> bool {
        let mut node = &self.root;
        let mut any = false;
        for segment in segments(path) {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => return false,
            }
            any = true;
        }
        any
    }

    /// Top-level entries in sorted order
    pub fn top_level(&self) -> impl Iterator<Item = &str> {
        self.root.children.keys().map(String::as_str)
    }

    /// All file paths, sorted
    pub fn files(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<(String, &Node)> = vec![(String::new(), &self.root)];
        while let Some((prefix, node)) = stack.pop() {
            if node.is_file && !prefix.is_empty() {
                out.push(prefix.clone());
            }
            for (name, child) in node.children.iter().rev() {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                stack.push((path, child));
            }
        }
        out.sort();
        out
    }
}
