//! In-memory content tree
//!
//! A content is a tree of containers and extracts. Containers group children
//! (a "part" or "chapter"), extracts are leaves holding one text body. The
//! tree is stored as an arena of nodes addressed by integer ids, with a
//! path index (slug path -> node id) built once per load and refreshed after
//! every structural change.
//!
//! Invariants enforced here, before anything reaches the version store:
//! - container nesting depth is bounded (`max_container_depth`);
//! - a container holds either containers or extracts, never both;
//! - extracts sit directly under the root only for flat (article) contents;
//! - sibling slugs are unique (numeric suffix on collision).

use crate::error::{RepositoryError, Result};
use crate::slug::unique_slug;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Node identifier inside one loaded tree (arena index)
pub type NodeId = usize;

/// Top-level content kind
///
/// Articles are flat: extracts hang directly under the root and no container
/// may be created. Tutorials are structured: the root holds containers and
/// extracts live inside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentKind {
    Article,
    Tutorial,
}

/// Node payload: container or extract
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container {
        introduction: Option<String>,
        conclusion: Option<String>,
        children: Vec<NodeId>,
    },
    Extract {
        text: String,
    },
}

impl NodeKind {
    fn is_container(&self) -> bool {
        matches!(self, NodeKind::Container { .. })
    }
}

/// One tree node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub title: String,
    pub slug: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
}

/// Where to place a node among its new siblings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    First,
    Last,
    /// Before the sibling at this slug path
    Before(String),
    /// After the sibling at this slug path
    After(String),
}

/// Edit payload for [`Tree::edit_node`]; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct NodeEdit {
    pub title: Option<String>,
    pub introduction: Option<String>,
    pub conclusion: Option<String>,
    pub text: Option<String>,
}

/// A content tree
///
/// The root is always a container representing the content itself. Removed
/// nodes stay in the arena as detached slots; everything walks from the root
/// so they are unreachable.
#[derive(Debug, Clone)]
pub struct Tree {
    kind: ContentKind,
    max_container_depth: usize,
    slug_max_length: usize,
    nodes: Vec<Node>,
    index: AHashMap<String, NodeId>,
}

pub const ROOT: NodeId = 0;

impl Tree {
    /// Create a new tree with a root container
    pub fn new(
        kind: ContentKind,
        title: impl Into<String>,
        slug: impl Into<String>,
        introduction: Option<String>,
        conclusion: Option<String>,
        max_container_depth: usize,
        slug_max_length: usize,
    ) -> Self {
        let root = Node {
            title: title.into(),
            slug: slug.into(),
            parent: None,
            kind: NodeKind::Container {
                introduction,
                conclusion,
                children: Vec::new(),
            },
        };
        let mut tree = Tree {
            kind,
            max_container_depth,
            slug_max_length,
            nodes: vec![root],
            index: AHashMap::new(),
        };
        tree.rebuild_index();
        tree
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Resolve a slug path ("part/chapter/extract") to a node id
    ///
    /// The empty path resolves to the root.
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(ROOT);
        }
        self.index
            .get(path)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(format!("no node at path '{}'", path)))
    }

    /// Slug path of a node, empty for the root
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            segments.push(self.nodes[current].slug.clone());
            current = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Number of container edges between the root and this node
    pub fn container_depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    fn children_of(&self, id: NodeId) -> &[NodeId] {
        match &self.nodes[id].kind {
            NodeKind::Container { children, .. } => children,
            NodeKind::Extract { .. } => &[],
        }
    }

    fn sibling_slugs(&self, parent: NodeId, exclude: Option<NodeId>) -> Vec<String> {
        self.children_of(parent)
            .iter()
            .filter(|&&c| Some(c) != exclude)
            .map(|&c| self.nodes[c].slug.clone())
            .collect()
    }

    fn has_container_children(&self, id: NodeId) -> bool {
        self.children_of(id)
            .iter()
            .any(|&c| self.nodes[c].kind.is_container())
    }

    fn has_extract_children(&self, id: NodeId) -> bool {
        self.children_of(id)
            .iter()
            .any(|&c| !self.nodes[c].kind.is_container())
    }

    /// Height of a subtree in container edges (an extract-only container is 1)
    fn container_height(&self, id: NodeId) -> usize {
        match &self.nodes[id].kind {
            NodeKind::Extract { .. } => 0,
            NodeKind::Container { children, .. } => {
                1 + children
                    .iter()
                    .map(|&c| self.container_height(c))
                    .max()
                    .unwrap_or(0)
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        let mut stack: Vec<(NodeId, String)> = vec![(ROOT, String::new())];
        while let Some((id, prefix)) = stack.pop() {
            let children: Vec<NodeId> = self.children_of(id).to_vec();
            for child in children {
                let path = if prefix.is_empty() {
                    self.nodes[child].slug.clone()
                } else {
                    format!("{}/{}", prefix, self.nodes[child].slug)
                };
                stack.push((child, path.clone()));
                self.index.insert(path, child);
            }
        }
    }

    fn check_container_parent(&self, parent: NodeId) -> Result<()> {
        if !self.nodes[parent].kind.is_container() {
            return Err(RepositoryError::InvalidParent(format!(
                "'{}' is an extract and cannot hold children",
                self.nodes[parent].slug
            )));
        }
        Ok(())
    }

    /// Add a container under `parent`
    pub fn add_container(
        &mut self,
        parent: NodeId,
        title: &str,
        introduction: Option<String>,
        conclusion: Option<String>,
    ) -> Result<NodeId> {
        self.check_container_parent(parent)?;

        if self.kind == ContentKind::Article {
            return Err(RepositoryError::InvalidParent(
                "articles are flat and cannot hold containers".to_string(),
            ));
        }

        let depth = self.container_depth(parent) + 1;
        if depth > self.max_container_depth {
            return Err(RepositoryError::DepthExceeded {
                slug: self.nodes[parent].slug.clone(),
                depth,
                max: self.max_container_depth,
            });
        }

        if self.has_extract_children(parent) {
            return Err(RepositoryError::InvalidParent(format!(
                "'{}' already holds extracts and cannot mix in containers",
                self.nodes[parent].slug
            )));
        }

        let slug = self.slug_for(title, parent, None)?;
        let id = self.push_node(Node {
            title: title.to_string(),
            slug,
            parent: Some(parent),
            kind: NodeKind::Container {
                introduction,
                conclusion,
                children: Vec::new(),
            },
        });
        self.attach(parent, id, None);
        self.rebuild_index();
        Ok(id)
    }

    /// Add an extract under `parent`
    pub fn add_extract(&mut self, parent: NodeId, title: &str, text: &str) -> Result<NodeId> {
        self.check_container_parent(parent)?;
        self.check_extract_destination(parent)?;

        let slug = self.slug_for(title, parent, None)?;
        let id = self.push_node(Node {
            title: title.to_string(),
            slug,
            parent: Some(parent),
            kind: NodeKind::Extract {
                text: text.to_string(),
            },
        });
        self.attach(parent, id, None);
        self.rebuild_index();
        Ok(id)
    }

    fn check_extract_destination(&self, parent: NodeId) -> Result<()> {
        if parent == ROOT && self.kind == ContentKind::Tutorial {
            return Err(RepositoryError::InvalidParent(
                "tutorial roots hold containers, not extracts".to_string(),
            ));
        }
        if self.has_container_children(parent) {
            return Err(RepositoryError::InvalidParent(format!(
                "'{}' already holds containers and cannot mix in extracts",
                self.nodes[parent].slug
            )));
        }
        Ok(())
    }

    /// Rename the root with an externally deduplicated slug
    ///
    /// Top-level slugs are unique across the whole store, not among siblings,
    /// so the store computes them and hands the result down.
    pub fn rename_root(&mut self, title: &str, slug: &str) {
        self.nodes[ROOT].title = title.to_string();
        self.nodes[ROOT].slug = slug.to_string();
    }

    /// Edit a node's title and texts; the slug is recomputed on title change
    pub fn edit_node(&mut self, id: NodeId, edit: NodeEdit) -> Result<()> {
        if let Some(new_title) = &edit.title {
            if new_title != &self.nodes[id].title {
                let slug = match self.nodes[id].parent {
                    Some(parent) => self.slug_for(new_title, parent, Some(id))?,
                    None => crate::slug::slugify(new_title, self.slug_max_length)
                        .ok_or_else(|| empty_title_error(new_title))?,
                };
                self.nodes[id].title = new_title.clone();
                self.nodes[id].slug = slug;
                self.rebuild_index();
            }
        }

        match &mut self.nodes[id].kind {
            NodeKind::Container {
                introduction,
                conclusion,
                ..
            } => {
                if edit.text.is_some() {
                    return Err(RepositoryError::InvalidRequest(
                        "containers have no text body".to_string(),
                    ));
                }
                if let Some(intro) = edit.introduction {
                    *introduction = Some(intro);
                }
                if let Some(concl) = edit.conclusion {
                    *conclusion = Some(concl);
                }
            }
            NodeKind::Extract { text } => {
                if edit.introduction.is_some() || edit.conclusion.is_some() {
                    return Err(RepositoryError::InvalidRequest(
                        "extracts have no introduction or conclusion".to_string(),
                    ));
                }
                if let Some(new_text) = edit.text {
                    *text = new_text;
                }
            }
        }
        Ok(())
    }

    /// Detach a node (and, for containers, all descendants) from the tree
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let parent = self.nodes[id]
            .parent
            .ok_or_else(|| RepositoryError::InvalidRequest("cannot remove the root".to_string()))?;
        if let NodeKind::Container { children, .. } = &mut self.nodes[parent].kind {
            children.retain(|&c| c != id);
        }
        self.nodes[id].parent = None;
        self.rebuild_index();
        Ok(())
    }

    /// Move a node under `target`, at `placement` among its children
    pub fn move_node(&mut self, id: NodeId, target: NodeId, placement: &Placement) -> Result<()> {
        if self.nodes[id].parent.is_none() {
            return Err(RepositoryError::InvalidMove(
                "cannot move the root".to_string(),
            ));
        }
        self.check_container_parent(target)?;

        // A container cannot be moved into its own subtree
        let mut cursor = Some(target);
        while let Some(c) = cursor {
            if c == id {
                return Err(RepositoryError::InvalidMove(format!(
                    "'{}' cannot be moved inside itself",
                    self.nodes[id].slug
                )));
            }
            cursor = self.nodes[c].parent;
        }

        match self.nodes[id].kind {
            NodeKind::Extract { .. } => {
                // Kind-mixing rules are the same as for a fresh extract,
                // except the node itself does not count as a sibling
                if target == ROOT && self.kind == ContentKind::Tutorial {
                    return Err(RepositoryError::InvalidMove(
                        "tutorial roots hold containers, not extracts".to_string(),
                    ));
                }
                if self
                    .children_of(target)
                    .iter()
                    .any(|&c| c != id && self.nodes[c].kind.is_container())
                {
                    return Err(RepositoryError::InvalidMove(format!(
                        "'{}' holds containers and cannot receive extracts",
                        self.nodes[target].slug
                    )));
                }
            }
            NodeKind::Container { .. } => {
                if self
                    .children_of(target)
                    .iter()
                    .any(|&c| c != id && !self.nodes[c].kind.is_container())
                {
                    return Err(RepositoryError::InvalidMove(format!(
                        "'{}' holds extracts and cannot receive containers",
                        self.nodes[target].slug
                    )));
                }
                // Combined check: destination depth plus the height of the
                // moved subtree must stay within the bound
                let height = self.container_height(id).max(1);
                let landing = self.container_depth(target) + height;
                if landing > self.max_container_depth {
                    return Err(RepositoryError::InvalidMove(format!(
                        "moving '{}' under '{}' would reach container depth {} (max {})",
                        self.nodes[id].slug,
                        self.nodes[target].slug,
                        landing,
                        self.max_container_depth
                    )));
                }
            }
        }

        let position = self.placement_index(target, id, placement)?;

        // Detach from the old parent
        let old_parent = self.nodes[id].parent.unwrap();
        if let NodeKind::Container { children, .. } = &mut self.nodes[old_parent].kind {
            children.retain(|&c| c != id);
        }

        // Re-slug on arrival if the new sibling set collides
        let siblings = self.sibling_slugs(target, Some(id));
        if siblings.contains(&self.nodes[id].slug) {
            let title = self.nodes[id].title.clone();
            self.nodes[id].slug = unique_slug(&title, &siblings, self.slug_max_length)
                .ok_or_else(|| empty_title_error(&title))?;
        }

        self.nodes[id].parent = Some(target);
        self.attach(target, id, Some(position));
        self.rebuild_index();
        Ok(())
    }

    /// Resolve a placement to an insertion index among `target`'s children
    /// after `moving` has been detached.
    fn placement_index(
        &self,
        target: NodeId,
        moving: NodeId,
        placement: &Placement,
    ) -> Result<usize> {
        let remaining: Vec<NodeId> = self
            .children_of(target)
            .iter()
            .copied()
            .filter(|&c| c != moving)
            .collect();

        let sibling_position = |path: &str| -> Result<usize> {
            let sibling = self.resolve_sibling(target, path)?;
            if self.nodes[sibling].parent != Some(target) {
                return Err(RepositoryError::NotFound(format!(
                    "'{}' is not a child of the move target",
                    path
                )));
            }
            if sibling == moving {
                // Degenerate self-reference: keep the current position
                let children = self.children_of(target);
                let original = children.iter().position(|&c| c == moving).unwrap_or(0);
                return Ok(children[..original].iter().filter(|&&c| c != moving).count());
            }
            remaining
                .iter()
                .position(|&c| c == sibling)
                .ok_or_else(|| RepositoryError::NotFound(format!("no sibling at '{}'", path)))
        };

        Ok(match placement {
            Placement::First => 0,
            Placement::Last => remaining.len(),
            Placement::Before(path) => sibling_position(path)?,
            Placement::After(path) => sibling_position(path)? + 1,
        })
    }

    /// Resolve a sibling reference, target-relative first, then as a full path
    fn resolve_sibling(&self, target: NodeId, path: &str) -> Result<NodeId> {
        let prefix = self.path_of(target);
        if !prefix.is_empty() {
            let qualified = format!("{}/{}", prefix, path);
            if let Ok(id) = self.resolve(&qualified) {
                return Ok(id);
            }
        }
        self.resolve(path)
    }

    fn slug_for(&self, title: &str, parent: NodeId, exclude: Option<NodeId>) -> Result<String> {
        let siblings = self.sibling_slugs(parent, exclude);
        unique_slug(title, &siblings, self.slug_max_length)
            .ok_or_else(|| empty_title_error(title))
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn attach(&mut self, parent: NodeId, id: NodeId, position: Option<usize>) {
        if let NodeKind::Container { children, .. } = &mut self.nodes[parent].kind {
            match position {
                Some(pos) => children.insert(pos.min(children.len()), id),
                None => children.push(id),
            }
        }
    }

    /// Structural equality: same shape, titles, slugs, texts and ordering
    pub fn structurally_equal(&self, other: &Tree) -> bool {
        self.to_document() == other.to_document()
    }

    /// Serialize into the canonical document form
    pub fn to_document(&self) -> TreeDocument {
        let root = &self.nodes[ROOT];
        let (introduction, conclusion) = match &root.kind {
            NodeKind::Container {
                introduction,
                conclusion,
                ..
            } => (introduction.clone(), conclusion.clone()),
            NodeKind::Extract { .. } => (None, None),
        };
        TreeDocument {
            kind: self.kind,
            title: root.title.clone(),
            slug: root.slug.clone(),
            introduction,
            conclusion,
            children: self.document_children(ROOT),
        }
    }

    fn document_children(&self, id: NodeId) -> Vec<NodeDocument> {
        self.children_of(id)
            .iter()
            .map(|&child| {
                let node = &self.nodes[child];
                match &node.kind {
                    NodeKind::Container {
                        introduction,
                        conclusion,
                        ..
                    } => NodeDocument::Container {
                        title: node.title.clone(),
                        slug: node.slug.clone(),
                        introduction: introduction.clone(),
                        conclusion: conclusion.clone(),
                        children: self.document_children(child),
                    },
                    NodeKind::Extract { text } => NodeDocument::Extract {
                        title: node.title.clone(),
                        slug: node.slug.clone(),
                        text: text.clone(),
                    },
                }
            })
            .collect()
    }

    /// Rebuild a tree from its canonical document form
    pub fn from_document(
        doc: &TreeDocument,
        max_container_depth: usize,
        slug_max_length: usize,
    ) -> Tree {
        let mut tree = Tree::new(
            doc.kind,
            doc.title.clone(),
            doc.slug.clone(),
            doc.introduction.clone(),
            doc.conclusion.clone(),
            max_container_depth,
            slug_max_length,
        );
        tree.hydrate_children(ROOT, &doc.children);
        tree.rebuild_index();
        tree
    }

    fn hydrate_children(&mut self, parent: NodeId, docs: &[NodeDocument]) {
        for doc in docs {
            match doc {
                NodeDocument::Container {
                    title,
                    slug,
                    introduction,
                    conclusion,
                    children,
                } => {
                    let id = self.push_node(Node {
                        title: title.clone(),
                        slug: slug.clone(),
                        parent: Some(parent),
                        kind: NodeKind::Container {
                            introduction: introduction.clone(),
                            conclusion: conclusion.clone(),
                            children: Vec::new(),
                        },
                    });
                    self.attach(parent, id, None);
                    self.hydrate_children(id, children);
                }
                NodeDocument::Extract { title, slug, text } => {
                    let id = self.push_node(Node {
                        title: title.clone(),
                        slug: slug.clone(),
                        parent: Some(parent),
                        kind: NodeKind::Extract { text: text.clone() },
                    });
                    self.attach(parent, id, None);
                }
            }
        }
    }

    /// All reachable paths, depth-first, children in order (root excluded)
    pub fn walk_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.walk_into(ROOT, String::new(), &mut out);
        out
    }

    fn walk_into(&self, id: NodeId, prefix: String, out: &mut Vec<String>) {
        for &child in self.children_of(id) {
            let path = if prefix.is_empty() {
                self.nodes[child].slug.clone()
            } else {
                format!("{}/{}", prefix, self.nodes[child].slug)
            };
            out.push(path.clone());
            self.walk_into(child, path, out);
        }
    }
}

fn empty_title_error(title: &str) -> RepositoryError {
    RepositoryError::InvalidTitle(format!("'{}' normalizes to an empty slug", title))
}

/// Canonical serialized form of a tree
///
/// Field order is the canonical key order: serializing the same tree twice
/// yields byte-identical JSON, which version hashing relies on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeDocument {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    pub children: Vec<NodeDocument>,
}

/// Canonical serialized form of one node
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeDocument {
    Container {
        title: String,
        slug: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        introduction: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        conclusion: Option<String>,
        children: Vec<NodeDocument>,
    },
    Extract {
        title: String,
        slug: String,
        text: String,
    },
}
