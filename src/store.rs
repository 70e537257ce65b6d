//! Content-addressed version store
//!
//! Each content owns a directory under the configured private root:
//!
//! ```text
//! <private_root>/<content-id>/
//!   meta.json            content metadata, pointers, version records
//!   versions/<hash>.json canonical tree documents, append-only
//! ```
//!
//! Version identifiers are SHA-256 hashes of the canonical tree document, so
//! identical trees produce identical identifiers and a no-op commit is
//! detected instead of persisted twice. Version files are immutable once
//! written; `meta.json` is replaced atomically (write + rename), so a reader
//! concurrent with a commit observes either the pre- or post-commit state.
//!
//! Mutations against one content are serialized through a per-content lock.
//! `try_lock_content` fails fast with `Busy`, `lock_content` blocks.

use crate::config::RepositoryConfig;
use crate::diff::{diff_trees, VersionDiff};
use crate::error::{RepositoryError, Result};
use crate::slug::{unique_slug, SlugHistoryEntry};
use crate::tree::{ContentKind, Tree, TreeDocument};
use crate::validation::ValidationRequest;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

/// Stable content identifier
pub type ContentId = u64;

/// Version identifier: hex SHA-256 of the canonical tree document
pub type VersionId = String;

/// One committed version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub id: VersionId,
    /// Version this one was committed from, `None` for the initial commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<VersionId>,
    pub created_at: DateTime<Utc>,
}

/// The named version slots of a content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionPointers {
    /// Latest author-editable version, always set after the first commit
    pub draft: Option<VersionId>,
    /// Version exposed to the beta audience
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beta: Option<VersionId>,
    /// Version bound to the open validation request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<VersionId>,
    /// Validated, publicly served version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<VersionId>,
}

/// Content metadata, persisted as `meta.json`
///
/// Carries only the fields the engine depends on; richer relational data
/// (subcategories, galleries, reactions) stays with external collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMeta {
    pub id: ContentId,
    pub slug: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub licence: Option<String>,
    pub authors: Vec<u64>,
    pub created_at: DateTime<Utc>,
    pub pointers: VersionPointers,
    pub versions: Vec<VersionRecord>,
    #[serde(default)]
    pub slug_history: Vec<SlugHistoryEntry>,
    /// Whether the beta pointer is currently exposed
    #[serde(default)]
    pub beta_active: bool,
    /// Whether the beta discussion thread has been created already
    #[serde(default)]
    pub beta_topic_created: bool,
    /// Public slug frozen at publication time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_slug: Option<String>,
    #[serde(default)]
    pub validations: Vec<ValidationRequest>,
    #[serde(default)]
    pub next_validation_id: u64,
}

impl ContentMeta {
    /// Whether the given user is one of the content's authors
    pub fn is_author(&self, user: u64) -> bool {
        self.authors.contains(&user)
    }

    /// Whether this version identifier belongs to the content's history
    pub fn has_version(&self, version: &str) -> bool {
        self.versions.iter().any(|v| v.id == version)
    }

    /// The open validation request, if any
    pub fn open_validation(&self) -> Option<&ValidationRequest> {
        self.validations.iter().find(|v| v.status.is_open())
    }

    pub fn open_validation_mut(&mut self) -> Option<&mut ValidationRequest> {
        self.validations.iter_mut().find(|v| v.status.is_open())
    }
}

/// Guard for the per-content mutation lock; released on drop
pub struct ContentLock<'a> {
    store: &'a VersionStore,
    id: ContentId,
}

impl Drop for ContentLock<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.store.in_flight.lock();
        in_flight.remove(&self.id);
        self.store.lock_released.notify_all();
    }
}

/// Content-addressed, append-only version store
pub struct VersionStore {
    config: RepositoryConfig,
    /// Contents with a mutation in flight
    in_flight: Mutex<AHashSet<ContentId>>,
    lock_released: Condvar,
    /// Current and historical top-level slugs
    slugs: Mutex<AHashMap<String, ContentId>>,
    next_id: Mutex<ContentId>,
}

impl VersionStore {
    /// Open (or initialize) a store under the configured private root
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.private_root)?;

        let mut slugs = AHashMap::new();
        let mut max_id = 0;
        for entry in std::fs::read_dir(&config.private_root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|s| s.parse::<ContentId>().ok()) else {
                continue;
            };
            max_id = max_id.max(id);
            let meta_path = entry.path().join("meta.json");
            if meta_path.exists() {
                let raw = std::fs::read_to_string(meta_path)?;
                let meta: ContentMeta = serde_json::from_str(&raw)?;
                slugs.insert(meta.slug.clone(), meta.id);
                for old in &meta.slug_history {
                    slugs.entry(old.slug.clone()).or_insert(meta.id);
                }
            }
        }

        info!(
            contents = slugs.len(),
            root = %config.private_root.display(),
            "opened version store"
        );

        Ok(VersionStore {
            config,
            in_flight: Mutex::new(AHashSet::new()),
            lock_released: Condvar::new(),
            slugs: Mutex::new(slugs),
            next_id: Mutex::new(max_id + 1),
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn content_dir(&self, id: ContentId) -> PathBuf {
        self.config.private_root.join(id.to_string())
    }

    fn meta_path(&self, id: ContentId) -> PathBuf {
        self.content_dir(id).join("meta.json")
    }

    fn version_path(&self, id: ContentId, version: &str) -> PathBuf {
        self.content_dir(id)
            .join("versions")
            .join(format!("{}.json", version))
    }

    /// Acquire the mutation lock for a content, failing fast when taken
    pub fn try_lock_content(&self, id: ContentId) -> Result<ContentLock<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(id) {
            return Err(RepositoryError::Busy(id));
        }
        Ok(ContentLock { store: self, id })
    }

    /// Acquire the mutation lock for a content, blocking until free
    pub fn lock_content(&self, id: ContentId) -> ContentLock<'_> {
        let mut in_flight = self.in_flight.lock();
        while in_flight.contains(&id) {
            self.lock_released.wait(&mut in_flight);
        }
        in_flight.insert(id);
        ContentLock { store: self, id }
    }

    /// Create a new content with its initial version
    ///
    /// The top-level slug is deduplicated against every slug the store has
    /// ever handed out, including retired ones.
    #[allow(clippy::too_many_arguments)]
    pub fn create_content(
        &self,
        kind: ContentKind,
        title: &str,
        description: Option<String>,
        licence: Option<String>,
        authors: Vec<u64>,
        introduction: Option<String>,
        conclusion: Option<String>,
    ) -> Result<ContentMeta> {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };

        // Reserve the slug in the same lock hold that computed it, so two
        // concurrent creations with the same title cannot both receive it
        let slug = {
            let mut slugs = self.slugs.lock();
            let taken: Vec<&str> = slugs.keys().map(|s| s.as_str()).collect();
            let slug = unique_slug(title, &taken, self.config.slug_max_length).ok_or_else(|| {
                RepositoryError::InvalidTitle(format!("'{}' normalizes to an empty slug", title))
            })?;
            slugs.insert(slug.clone(), id);
            slug
        };

        if let Err(e) = std::fs::create_dir_all(self.content_dir(id).join("versions")) {
            self.slugs.lock().remove(&slug);
            return Err(e.into());
        }

        let tree = Tree::new(
            kind,
            title,
            slug.clone(),
            introduction,
            conclusion,
            self.config.max_container_depth,
            self.config.slug_max_length,
        );

        let mut meta = ContentMeta {
            id,
            slug: slug.clone(),
            title: title.to_string(),
            kind,
            description,
            licence,
            authors,
            created_at: Utc::now(),
            pointers: VersionPointers::default(),
            versions: Vec::new(),
            slug_history: Vec::new(),
            beta_active: false,
            beta_topic_created: false,
            public_slug: None,
            validations: Vec::new(),
            next_validation_id: 1,
        };
        if let Err(e) = self.commit(&mut meta, &tree, None) {
            self.slugs.lock().remove(&slug);
            return Err(e);
        }

        info!(content = id, slug = %meta.slug, "created content");
        Ok(meta)
    }

    /// Load a content's metadata
    pub fn load_meta(&self, id: ContentId) -> Result<ContentMeta> {
        let path = self.meta_path(id);
        if !path.exists() {
            return Err(RepositoryError::NotFound(format!("no content {}", id)));
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist a content's metadata atomically
    pub fn save_meta(&self, meta: &ContentMeta) -> Result<()> {
        let path = self.meta_path(meta.id);
        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_vec_pretty(meta)?;
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Rename a content, retiring the old top-level slug into history
    pub fn rename_content(&self, meta: &mut ContentMeta, new_title: &str) -> Result<()> {
        let new_slug = {
            let mut slugs = self.slugs.lock();
            let taken: Vec<&str> = slugs
                .iter()
                .filter(|(_, &owner)| owner != meta.id)
                .map(|(s, _)| s.as_str())
                .collect();
            let new_slug = unique_slug(new_title, &taken, self.config.slug_max_length)
                .ok_or_else(|| {
                    RepositoryError::InvalidTitle(format!(
                        "'{}' normalizes to an empty slug",
                        new_title
                    ))
                })?;
            if new_slug != meta.slug {
                // reserved in the same lock hold that computed it
                slugs.insert(new_slug.clone(), meta.id);
            }
            new_slug
        };

        if new_slug != meta.slug {
            meta.slug_history.push(SlugHistoryEntry::new(meta.slug.clone()));
            debug!(content = meta.id, old = %meta.slug, new = %new_slug, "content renamed");
            meta.slug = new_slug;
        }
        meta.title = new_title.to_string();
        self.save_meta(meta)?;
        Ok(())
    }

    /// Resolve a top-level slug, current or historical, to a content id
    pub fn find_by_slug(&self, slug: &str) -> Result<ContentId> {
        self.slugs
            .lock()
            .get(slug)
            .copied()
            .ok_or_else(|| RepositoryError::NotFound(format!("no content under slug '{}'", slug)))
    }

    /// Load a tree, either a specific version or the current draft
    pub fn load(&self, id: ContentId, version: Option<&str>) -> Result<Tree> {
        let meta = self.load_meta(id)?;
        self.load_with_meta(&meta, version)
    }

    /// Load a tree against already-loaded metadata
    pub fn load_with_meta(&self, meta: &ContentMeta, version: Option<&str>) -> Result<Tree> {
        let version = match version {
            Some(v) => v.to_string(),
            None => meta.pointers.draft.clone().ok_or_else(|| {
                RepositoryError::VersionNotFound("content has no draft".to_string())
            })?,
        };
        if !meta.has_version(&version) {
            return Err(RepositoryError::VersionNotFound(version));
        }
        let raw = std::fs::read_to_string(self.version_path(meta.id, &version))?;
        let doc: TreeDocument = serde_json::from_str(&raw)?;
        Ok(Tree::from_document(
            &doc,
            self.config.max_container_depth,
            self.config.slug_max_length,
        ))
    }

    /// Commit a tree as a new version and advance the draft pointer
    ///
    /// The identifier is the SHA-256 of the canonical document bytes. When a
    /// version with the same identifier and parent already exists the commit
    /// is a no-op returning the existing identifier.
    pub fn commit(
        &self,
        meta: &mut ContentMeta,
        tree: &Tree,
        parent: Option<VersionId>,
    ) -> Result<VersionId> {
        let doc = tree.to_document();
        let bytes = serde_json::to_vec(&doc)?;
        let version = hex_digest(&bytes);

        let already = meta
            .versions
            .iter()
            .any(|v| v.id == version && v.parent == parent);
        if already {
            debug!(content = meta.id, version = %version, "idempotent commit, reusing version");
            meta.pointers.draft = Some(version.clone());
            self.save_meta(meta)?;
            return Ok(version);
        }

        if let Some(parent) = &parent {
            if !meta.has_version(parent) {
                return Err(RepositoryError::VersionNotFound(parent.clone()));
            }
        }

        let path = self.version_path(meta.id, &version);
        if !path.exists() {
            std::fs::create_dir_all(path.parent().expect("version path has a parent"))?;
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, &bytes)?;
            std::fs::rename(&tmp, &path)?;
        }

        meta.versions.push(VersionRecord {
            id: version.clone(),
            parent,
            created_at: Utc::now(),
        });
        meta.pointers.draft = Some(version.clone());
        self.save_meta(meta)?;

        info!(content = meta.id, version = %version, "committed version");
        Ok(version)
    }

    /// Diff two versions of a content
    pub fn diff(&self, id: ContentId, from: &str, to: &str) -> Result<VersionDiff> {
        let meta = self.load_meta(id)?;
        let old = self.load_with_meta(&meta, Some(from))?;
        let new = self.load_with_meta(&meta, Some(to))?;
        Ok(diff_trees(&old, &new))
    }

    /// Version records, oldest first
    pub fn list_versions(&self, id: ContentId) -> Result<Vec<VersionRecord>> {
        Ok(self.load_meta(id)?.versions)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
