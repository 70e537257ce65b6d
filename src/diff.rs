//! Version-to-version diffs
//!
//! A diff is an ordered list of per-path changes: structural entries
//! (added, removed, moved nodes) plus a line-level text diff for every
//! changed introduction, conclusion or extract body. Used to show authors
//! what changed between two versions.

use crate::tree::{NodeKind, Tree, ROOT};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Which text field of a node changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Introduction,
    Conclusion,
    Text,
}

/// One changed line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "line")]
pub enum LineChange {
    /// Line present in the old text only (old-side line number, content)
    Removed(usize, String),
    /// Line present in the new text only (new-side line number, content)
    Added(usize, String),
}

/// One per-path change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "change")]
pub enum DiffEntry {
    Added {
        path: String,
    },
    Removed {
        path: String,
    },
    Moved {
        from: String,
        to: String,
    },
    /// Same parent, different position among siblings
    Reordered {
        path: String,
        old_position: usize,
        new_position: usize,
    },
    TextChanged {
        path: String,
        field: TextField,
        lines: Vec<LineChange>,
    },
}

/// Ordered sequence of per-path changes between two versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub entries: Vec<DiffEntry>,
}

impl VersionDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct PathInfo {
    title: String,
    slug: String,
    position: usize,
    parent: String,
    texts: Vec<(TextField, String)>,
}

fn collect(tree: &Tree) -> AHashMap<String, PathInfo> {
    let mut out = AHashMap::new();
    let mut stack = vec![(ROOT, String::new())];
    while let Some((id, prefix)) = stack.pop() {
        let node = tree.node(id);
        if let NodeKind::Container { children, .. } = &node.kind {
            for (position, &child) in children.iter().enumerate() {
                let node = tree.node(child);
                let path = if prefix.is_empty() {
                    node.slug.clone()
                } else {
                    format!("{}/{}", prefix, node.slug)
                };
                let texts = match &node.kind {
                    NodeKind::Container {
                        introduction,
                        conclusion,
                        ..
                    } => {
                        let mut t = Vec::new();
                        if let Some(intro) = introduction {
                            t.push((TextField::Introduction, intro.clone()));
                        }
                        if let Some(concl) = conclusion {
                            t.push((TextField::Conclusion, concl.clone()));
                        }
                        t
                    }
                    NodeKind::Extract { text } => vec![(TextField::Text, text.clone())],
                };
                out.insert(
                    path.clone(),
                    PathInfo {
                        title: node.title.clone(),
                        slug: node.slug.clone(),
                        position,
                        parent: prefix.clone(),
                        texts,
                    },
                );
                stack.push((child, path));
            }
        }
    }
    out
}

/// Compute the diff between two trees
pub fn diff_trees(old: &Tree, new: &Tree) -> VersionDiff {
    let old_nodes = collect(old);
    let new_nodes = collect(new);
    let mut entries = Vec::new();

    // Root texts live at the empty path
    diff_root_texts(old, new, &mut entries);

    let mut removed: Vec<String> = old_nodes
        .keys()
        .filter(|p| !new_nodes.contains_key(*p))
        .cloned()
        .collect();
    let mut added: Vec<String> = new_nodes
        .keys()
        .filter(|p| !old_nodes.contains_key(*p))
        .cloned()
        .collect();
    removed.sort();
    added.sort();

    // A node that disappeared at one path and reappeared at another with the
    // same slug and title was moved, not rewritten
    let mut matched_adds: Vec<String> = Vec::new();
    let mut matched_removes: Vec<String> = Vec::new();
    for r in &removed {
        let info = &old_nodes[r];
        let candidate = added.iter().find(|a| {
            !matched_adds.contains(*a)
                && new_nodes[a.as_str()].slug == info.slug
                && new_nodes[a.as_str()].title == info.title
        });
        if let Some(a) = candidate {
            entries.push(DiffEntry::Moved {
                from: r.clone(),
                to: a.clone(),
            });
            matched_adds.push(a.clone());
            matched_removes.push(r.clone());
        }
    }
    for r in &removed {
        if !matched_removes.contains(r) {
            entries.push(DiffEntry::Removed { path: r.clone() });
        }
    }
    for a in &added {
        if !matched_adds.contains(a) {
            entries.push(DiffEntry::Added { path: a.clone() });
        }
    }

    // Paths present on both sides: reorders and text edits
    let mut shared: Vec<String> = old_nodes
        .keys()
        .filter(|p| new_nodes.contains_key(*p))
        .cloned()
        .collect();
    shared.sort();
    for path in &shared {
        let before = &old_nodes[path];
        let after = &new_nodes[path];
        if before.parent == after.parent && before.position != after.position {
            entries.push(DiffEntry::Reordered {
                path: path.clone(),
                old_position: before.position,
                new_position: after.position,
            });
        }
        for (field, old_text) in &before.texts {
            if let Some((_, new_text)) = after.texts.iter().find(|(f, _)| f == field) {
                if old_text != new_text {
                    entries.push(DiffEntry::TextChanged {
                        path: path.clone(),
                        field: *field,
                        lines: diff_lines(old_text, new_text),
                    });
                }
            }
        }
    }

    VersionDiff { entries }
}

fn diff_root_texts(old: &Tree, new: &Tree, entries: &mut Vec<DiffEntry>) {
    let fields = |tree: &Tree| -> Vec<(TextField, String)> {
        match &tree.node(ROOT).kind {
            NodeKind::Container {
                introduction,
                conclusion,
                ..
            } => {
                let mut t = Vec::new();
                if let Some(intro) = introduction {
                    t.push((TextField::Introduction, intro.clone()));
                }
                if let Some(concl) = conclusion {
                    t.push((TextField::Conclusion, concl.clone()));
                }
                t
            }
            NodeKind::Extract { .. } => Vec::new(),
        }
    };
    let old_fields = fields(old);
    for (field, new_text) in fields(new) {
        match old_fields.iter().find(|(f, _)| *f == field) {
            Some((_, old_text)) if old_text != &new_text => {
                entries.push(DiffEntry::TextChanged {
                    path: String::new(),
                    field,
                    lines: diff_lines(old_text, &new_text),
                });
            }
            None => {
                entries.push(DiffEntry::TextChanged {
                    path: String::new(),
                    field,
                    lines: diff_lines("", &new_text),
                });
            }
            _ => {}
        }
    }
}

/// Line-level diff of two texts (LCS over lines)
///
/// Returns removed lines with their old-side numbers and added lines with
/// their new-side numbers, both 1-based.
pub fn diff_lines(old: &str, new: &str) -> Vec<LineChange> {
    let old_lines: Vec<&str> = if old.is_empty() { Vec::new() } else { old.lines().collect() };
    let new_lines: Vec<&str> = if new.is_empty() { Vec::new() } else { new.lines().collect() };

    let n = old_lines.len();
    let m = new_lines.len();

    // LCS length table
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old_lines[i] == new_lines[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut changes = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old_lines[i] == new_lines[j] {
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            changes.push(LineChange::Removed(i + 1, old_lines[i].to_string()));
            i += 1;
        } else {
            changes.push(LineChange::Added(j + 1, new_lines[j].to_string()));
            j += 1;
        }
    }
    while i < n {
        changes.push(LineChange::Removed(i + 1, old_lines[i].to_string()));
        i += 1;
    }
    while j < m {
        changes.push(LineChange::Added(j + 1, new_lines[j].to_string()));
        j += 1;
    }
    changes
}
