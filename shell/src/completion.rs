//! Prefix index over command names, used for Tab completion.

use crate::external::is_executable;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<char, TrieNode>,
    terminal: bool,
}

/// Outcome of completing a command-name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Exactly one name matches. Holds the text to append, trailing space included.
    Unique(String),
    /// Several names match and share a longer common prefix. Holds the text
    /// to append to reach it.
    Extend(String),
    /// Several names match and the prefix cannot grow. Holds them, sorted.
    Ambiguous(Vec<String>),
    NoMatch,
}

/// Trie of every name the shell can run by bare name.
#[derive(Debug, Default)]
pub struct ExecutableIndex {
    root: TrieNode,
    len: usize,
}

impl ExecutableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the index from the executables in each directory of a `PATH`
    /// value plus some extra names (the builtins). Unreadable directories are
    /// skipped.
    pub fn from_search_path<'a>(
        search_paths: &OsStr,
        extra: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let mut index = Self::new();
        for name in extra {
            index.insert(name);
        }
        for dir in std::env::split_paths(search_paths) {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !is_executable(&path) {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    index.insert(name);
                }
            }
        }
        log::debug!("indexed {} command names", index.len());
        index
    }

    pub fn insert(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        let mut node = &mut self.root;
        for ch in name.chars() {
            node = node.children.entry(ch).or_default();
        }
        if !node.terminal {
            node.terminal = true;
            self.len += 1;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some_and(|node| node.terminal)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn find(&self, prefix: &str) -> Option<&TrieNode> {
        let mut node = &self.root;
        for ch in prefix.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }

    /// All names starting with `prefix`, in sorted order.
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(node) = self.find(prefix) {
            let mut current = prefix.to_string();
            collect(node, &mut current, &mut out);
        }
        out
    }

    pub fn complete(&self, prefix: &str) -> Completion {
        let mut matches = self.completions(prefix);
        match matches.len() {
            0 => Completion::NoMatch,
            1 => {
                let mut suffix = matches.remove(0).split_off(prefix.len());
                suffix.push(' ');
                Completion::Unique(suffix)
            }
            _ => {
                let common = longest_common_prefix(&matches);
                if common.len() > prefix.len() {
                    Completion::Extend(common[prefix.len()..].to_string())
                } else {
                    Completion::Ambiguous(matches)
                }
            }
        }
    }
}

// BTreeMap iteration keeps the output sorted.
fn collect(node: &TrieNode, current: &mut String, out: &mut Vec<String>) {
    if node.terminal {
        out.push(current.clone());
    }
    for (ch, child) in &node.children {
        current.push(*ch);
        collect(child, current, out);
        current.pop();
    }
}

fn longest_common_prefix(names: &[String]) -> &str {
    let Some(first) = names.first() else {
        return "";
    };
    let mut end = first.len();
    for name in &names[1..] {
        end = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, a), _)| i + a.len_utf8())
            .min(end);
    }
    &first[..end]
}
