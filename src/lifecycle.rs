//! Publication lifecycle
//!
//! Drives the draft → beta → validation → public workflow. Every transition
//! binds one specific version identifier to a named slot (beta, validation,
//! public) on the content's metadata. Side effects toward the rest of the
//! platform (discussion threads, private messages, rendering) go through the
//! [`LifecycleHooks`] and [`PublicationRenderer`] seams; the engine itself
//! never talks to a forum or a template.
//!
//! Published snapshots are rendered into a staging directory created next to
//! the public root and moved into place in one rename, so readers never see
//! a half-written snapshot and a failed render leaves nothing behind.

use crate::error::{RepositoryError, Result};
use crate::store::{ContentId, ContentMeta, VersionStore};
use crate::tree::{NodeKind, Tree, ROOT};
use crate::validation::{ValidationRequest, ValidationStatus};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Who is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: u64,
    pub is_staff: bool,
}

impl Actor {
    pub fn user(id: u64) -> Self {
        Actor { id, is_staff: false }
    }

    pub fn staff(id: u64) -> Self {
        Actor { id, is_staff: true }
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Forbidden,
    NotFound,
}

/// Collaborator side effects triggered by lifecycle transitions
///
/// Default implementations do nothing, so callers only wire the signals they
/// care about.
pub trait LifecycleHooks {
    /// A beta was opened for the first time: create the discussion thread
    fn create_beta_topic(&self, _meta: &ContentMeta, _version: &str) {}

    /// A newer beta version replaced the previous one
    fn update_beta_topic(&self, _meta: &ContentMeta, _version: &str) {}

    /// The beta ended: lock the discussion thread
    fn lock_beta_topic(&self, _meta: &ContentMeta) {}

    /// A validation request was opened (or re-opened after a revocation)
    fn notify_moderators(&self, _meta: &ContentMeta, _request: &ValidationRequest) {}

    /// A validation request was resolved (accepted, rejected) or a
    /// publication was revoked
    fn notify_author(&self, _meta: &ContentMeta, _request: &ValidationRequest) {}
}

/// Hooks that do nothing
pub struct NoopHooks;

impl LifecycleHooks for NoopHooks {}

/// Renders a validated version into publicly served files
pub trait PublicationRenderer {
    fn render(&self, meta: &ContentMeta, tree: &Tree, out_dir: &Path) -> Result<()>;
}

/// Built-in renderer writing the tree back out as markdown files
///
/// Production deployments plug a real markup pipeline in; this one keeps the
/// engine usable (and testable) on its own.
pub struct MarkdownRenderer;

impl PublicationRenderer for MarkdownRenderer {
    fn render(&self, _meta: &ContentMeta, tree: &Tree, out_dir: &Path) -> Result<()> {
        render_container(tree, ROOT, out_dir)
    }
}

fn render_container(tree: &Tree, node: crate::tree::NodeId, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let (introduction, conclusion, children) = match &tree.node(node).kind {
        NodeKind::Container {
            introduction,
            conclusion,
            children,
        } => (introduction, conclusion, children.clone()),
        NodeKind::Extract { .. } => return Ok(()),
    };

    if let Some(text) = introduction {
        std::fs::write(dir.join("introduction.md"), text)?;
    }
    if let Some(text) = conclusion {
        std::fs::write(dir.join("conclusion.md"), text)?;
    }
    for child in children {
        let child_node = tree.node(child);
        match &child_node.kind {
            NodeKind::Container { .. } => {
                render_container(tree, child, &dir.join(&child_node.slug))?;
            }
            NodeKind::Extract { text } => {
                std::fs::write(dir.join(format!("{}.md", child_node.slug)), text)?;
            }
        }
    }
    Ok(())
}

/// Publication lifecycle controller
pub struct LifecycleController<'a> {
    store: &'a VersionStore,
    hooks: &'a dyn LifecycleHooks,
    renderer: &'a dyn PublicationRenderer,
}

impl<'a> LifecycleController<'a> {
    pub fn new(
        store: &'a VersionStore,
        hooks: &'a dyn LifecycleHooks,
        renderer: &'a dyn PublicationRenderer,
    ) -> Self {
        LifecycleController {
            store,
            hooks,
            renderer,
        }
    }

    fn require_author(meta: &ContentMeta, actor: &Actor) -> Result<()> {
        if !meta.is_author(actor.id) {
            return Err(RepositoryError::Forbidden(format!(
                "user {} is not an author of content {}",
                actor.id, meta.id
            )));
        }
        Ok(())
    }

    fn require_validator(meta: &ContentMeta, actor: &Actor) -> Result<()> {
        if !actor.is_staff {
            return Err(RepositoryError::Forbidden(format!(
                "user {} is not staff",
                actor.id
            )));
        }
        if meta.is_author(actor.id) {
            // self-validation is disallowed
            return Err(RepositoryError::Forbidden(format!(
                "author {} cannot validate their own content",
                actor.id
            )));
        }
        Ok(())
    }

    fn require_version(meta: &ContentMeta, version: &str) -> Result<()> {
        if !meta.has_version(version) {
            return Err(RepositoryError::VersionNotFound(version.to_string()));
        }
        Ok(())
    }

    fn request_mut<'m>(
        meta: &'m mut ContentMeta,
        validation_id: u64,
    ) -> Result<&'m mut ValidationRequest> {
        meta.validations
            .iter_mut()
            .find(|r| r.id == validation_id)
            .ok_or_else(|| {
                RepositoryError::NotFound(format!("no validation request {}", validation_id))
            })
    }

    /// Expose a version to the beta audience
    ///
    /// The first activation asks the collaborator to create the discussion
    /// thread; later ones ask it to post an update.
    pub fn set_beta(&self, actor: &Actor, content: ContentId, version: &str) -> Result<()> {
        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_author(&meta, actor)?;
        Self::require_version(&meta, version)?;

        meta.pointers.beta = Some(version.to_string());
        meta.beta_active = true;
        let first_time = !meta.beta_topic_created;
        meta.beta_topic_created = true;
        self.store.save_meta(&meta)?;

        if first_time {
            self.hooks.create_beta_topic(&meta, version);
        } else {
            self.hooks.update_beta_topic(&meta, version);
        }
        info!(content, version, "beta activated");
        Ok(())
    }

    /// End the beta; the pointer is kept for history but no longer exposed
    pub fn deactivate_beta(&self, actor: &Actor, content: ContentId) -> Result<()> {
        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_author(&meta, actor)?;

        meta.beta_active = false;
        self.store.save_meta(&meta)?;
        self.hooks.lock_beta_topic(&meta);
        info!(content, "beta deactivated");
        Ok(())
    }

    /// Ask the staff to publish a version
    ///
    /// Cancels any open request for the same content first, so at most one
    /// request is open at a time.
    pub fn request_validation(
        &self,
        actor: &Actor,
        content: ContentId,
        version: &str,
        comment: &str,
        source: Option<String>,
    ) -> Result<u64> {
        if comment.trim().is_empty() {
            return Err(RepositoryError::InvalidRequest(
                "a validation request needs a comment for the validators".to_string(),
            ));
        }

        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_author(&meta, actor)?;
        Self::require_version(&meta, version)?;

        if let Some(open) = meta.open_validation_mut() {
            open.status = ValidationStatus::Canceled;
            open.resolved_at = Some(Utc::now());
            info!(content, request = open.id, "canceled superseded validation request");
        }

        let id = meta.next_validation_id;
        meta.next_validation_id += 1;
        let request = ValidationRequest::new(id, version, comment, source);
        meta.pointers.validation = Some(version.to_string());
        meta.validations.push(request);
        self.store.save_meta(&meta)?;

        let request = meta.validations.last().expect("request just pushed");
        self.hooks.notify_moderators(&meta, request);
        info!(content, request = id, version, "validation requested");
        Ok(id)
    }

    /// Claim a pending request for review
    pub fn reserve(&self, actor: &Actor, content: ContentId, validation_id: u64) -> Result<()> {
        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_validator(&meta, actor)?;

        let request = Self::request_mut(&mut meta, validation_id)?;
        if request.status != ValidationStatus::Pending {
            return Err(RepositoryError::InvalidRequest(format!(
                "validation request {} is not pending",
                validation_id
            )));
        }
        request.status = ValidationStatus::PendingValidator;
        request.validator = Some(actor.id);
        self.store.save_meta(&meta)?;
        info!(content, request = validation_id, validator = actor.id, "validation reserved");
        Ok(())
    }

    /// Release a claimed request back to the pending pool
    pub fn unreserve(&self, actor: &Actor, content: ContentId, validation_id: u64) -> Result<()> {
        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_validator(&meta, actor)?;

        let request = Self::request_mut(&mut meta, validation_id)?;
        if request.status != ValidationStatus::PendingValidator {
            return Err(RepositoryError::InvalidRequest(format!(
                "validation request {} is not reserved",
                validation_id
            )));
        }
        request.status = ValidationStatus::Pending;
        request.validator = None;
        self.store.save_meta(&meta)?;
        info!(content, request = validation_id, "validation unreserved");
        Ok(())
    }

    /// Accept a reserved request: render and publish the bound version
    pub fn accept(
        &self,
        actor: &Actor,
        content: ContentId,
        validation_id: u64,
        comment: &str,
        is_major: bool,
        source: Option<String>,
    ) -> Result<()> {
        if comment.trim().is_empty() {
            return Err(RepositoryError::InvalidRequest(
                "acceptance needs a validator comment".to_string(),
            ));
        }

        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_validator(&meta, actor)?;

        let request = Self::request_mut(&mut meta, validation_id)?;
        if request.status != ValidationStatus::PendingValidator {
            return Err(RepositoryError::InvalidRequest(format!(
                "validation request {} is not reserved",
                validation_id
            )));
        }
        if request.validator != Some(actor.id) {
            return Err(RepositoryError::Forbidden(format!(
                "user {} did not reserve validation request {}",
                actor.id, validation_id
            )));
        }

        let version = request.version.clone();
        let tree = self.store.load_with_meta(&meta, Some(&version))?;
        let public_slug = meta.slug.clone();
        self.publish_snapshot(&meta, &tree, &public_slug)?;

        // Replacing a publication under a renamed slug retires the old files
        if let Some(previous) = meta.public_slug.clone() {
            if previous != public_slug {
                let old_dir = self.public_dir(&previous);
                if old_dir.exists() {
                    std::fs::remove_dir_all(&old_dir)?;
                }
            }
        }

        let request = Self::request_mut(&mut meta, validation_id)?;
        request.status = ValidationStatus::Accepted;
        request.validator_comment = Some(comment.to_string());
        request.is_major = is_major;
        if source.is_some() {
            request.source = source;
        }
        request.resolved_at = Some(Utc::now());

        meta.pointers.validation = None;
        meta.pointers.public = Some(version.clone());
        meta.public_slug = Some(public_slug);
        self.store.save_meta(&meta)?;

        let request = meta
            .validations
            .iter()
            .find(|r| r.id == validation_id)
            .expect("request exists");
        self.hooks.notify_author(&meta, request);
        info!(content, request = validation_id, version = %version, "validation accepted, content published");
        Ok(())
    }

    /// Reject a reserved request
    pub fn reject(
        &self,
        actor: &Actor,
        content: ContentId,
        validation_id: u64,
        comment: &str,
    ) -> Result<()> {
        if comment.trim().is_empty() {
            return Err(RepositoryError::InvalidRequest(
                "rejection needs a validator comment".to_string(),
            ));
        }

        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_validator(&meta, actor)?;

        let request = Self::request_mut(&mut meta, validation_id)?;
        if request.status != ValidationStatus::PendingValidator {
            return Err(RepositoryError::InvalidRequest(format!(
                "validation request {} is not reserved",
                validation_id
            )));
        }
        if request.validator != Some(actor.id) {
            return Err(RepositoryError::Forbidden(format!(
                "user {} did not reserve validation request {}",
                actor.id, validation_id
            )));
        }
        request.status = ValidationStatus::Rejected;
        request.validator_comment = Some(comment.to_string());
        request.resolved_at = Some(Utc::now());
        meta.pointers.validation = None;
        self.store.save_meta(&meta)?;

        let request = meta
            .validations
            .iter()
            .find(|r| r.id == validation_id)
            .expect("request exists");
        self.hooks.notify_author(&meta, request);
        info!(content, request = validation_id, "validation rejected");
        Ok(())
    }

    /// Withdraw one's own validation request
    pub fn cancel(&self, actor: &Actor, content: ContentId, validation_id: u64) -> Result<()> {
        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_author(&meta, actor)?;

        let request = Self::request_mut(&mut meta, validation_id)?;
        if !request.status.is_open() {
            return Err(RepositoryError::InvalidRequest(format!(
                "validation request {} is already resolved",
                validation_id
            )));
        }
        request.status = ValidationStatus::Canceled;
        request.resolved_at = Some(Utc::now());
        meta.pointers.validation = None;
        self.store.save_meta(&meta)?;
        info!(content, request = validation_id, "validation canceled");
        Ok(())
    }

    /// Unpublish a content
    ///
    /// `version` must be the currently published version, so a revocation
    /// decided against a stale page cannot take down a newer publication.
    /// Removes the rendered snapshot and re-opens a pending validation
    /// request bound to the current draft, which may have moved past the
    /// revoked version.
    pub fn revoke(
        &self,
        actor: &Actor,
        content: ContentId,
        version: &str,
        comment: &str,
    ) -> Result<u64> {
        if comment.trim().is_empty() {
            return Err(RepositoryError::InvalidRequest(
                "revocation needs a comment".to_string(),
            ));
        }

        let _lock = self.store.lock_content(content);
        let mut meta = self.store.load_meta(content)?;
        Self::require_validator(&meta, actor)?;

        if meta.pointers.public.as_deref() != Some(version) {
            return Err(RepositoryError::InvalidRequest(format!(
                "version {} is not the published version of content {}",
                version, content
            )));
        }

        if let Some(slug) = &meta.public_slug {
            let dir = self.public_dir(slug);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            } else {
                warn!(content, slug = %slug, "published snapshot directory already absent");
            }
        }
        meta.pointers.public = None;
        meta.public_slug = None;

        // Re-open validation against the draft as it stands now
        let draft = meta
            .pointers
            .draft
            .clone()
            .expect("content has a draft");
        if let Some(open) = meta.open_validation_mut() {
            open.status = ValidationStatus::Canceled;
            open.resolved_at = Some(Utc::now());
        }
        let id = meta.next_validation_id;
        meta.next_validation_id += 1;
        let request = ValidationRequest::new(id, draft.clone(), comment, None);
        meta.pointers.validation = Some(draft);
        meta.validations.push(request);
        self.store.save_meta(&meta)?;

        let request = meta.validations.last().expect("request just pushed");
        self.hooks.notify_author(&meta, request);
        self.hooks.notify_moderators(&meta, request);
        info!(content, request = id, "publication revoked");
        Ok(id)
    }

    /// Check whether an actor may resolve a given version of a content
    ///
    /// `None` as the version means the current draft. The public version is
    /// readable by everyone, anything else only by authors and staff. A
    /// version identifier outside the content's history is `NotFound` for
    /// every role.
    pub fn resolve_access(
        &self,
        actor: Option<&Actor>,
        content: ContentId,
        version: Option<&str>,
    ) -> Result<AccessDecision> {
        let meta = match self.store.load_meta(content) {
            Ok(meta) => meta,
            Err(RepositoryError::NotFound(_)) => return Ok(AccessDecision::NotFound),
            Err(e) => return Err(e),
        };

        if let Some(version) = version {
            if !meta.has_version(version) {
                return Ok(AccessDecision::NotFound);
            }
            if meta.pointers.public.as_deref() == Some(version) {
                return Ok(AccessDecision::Allow);
            }
        }

        // Draft, beta, validation or any historical version: authors and
        // staff only
        Ok(match actor {
            Some(actor) if actor.is_staff || meta.is_author(actor.id) => AccessDecision::Allow,
            _ => AccessDecision::Forbidden,
        })
    }

    fn public_dir(&self, slug: &str) -> PathBuf {
        self.store.config().public_root.join(slug)
    }

    /// Render into a staging directory, then move into place atomically
    fn publish_snapshot(&self, meta: &ContentMeta, tree: &Tree, slug: &str) -> Result<()> {
        let public_root = &self.store.config().public_root;
        std::fs::create_dir_all(public_root)?;

        let staging = tempfile::Builder::new()
            .prefix(".publish-")
            .tempdir_in(public_root)?;
        self.renderer.render(meta, tree, staging.path())?;

        let target = self.public_dir(slug);
        if target.exists() {
            std::fs::remove_dir_all(&target)?;
        }
        // keep() disarms the cleanup; from here on the directory belongs to
        // the public tree
        std::fs::rename(staging.keep(), &target)?;
        Ok(())
    }
}
