//! # Scriptorium - Versioned Content Repository Engine
//!
//! `scriptorium` stores community-authored tutorials and articles as trees of
//! containers and extracts, with every structural edit committed as an
//! immutable, content-addressed version. On top of the version store it
//! drives the full editorial lifecycle:
//!
//! - **Draft editing** through a mutation engine with per-content locking
//! - **Content-addressed history**: identical trees share one version
//! - **Zip archive export/import** with slug re-derivation on the way in
//! - **Beta, validation and publication** workflows with role-based access
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scriptorium::{MutationEngine, RepositoryConfig, VersionStore, ContentKind, Result};
//!
//! # fn main() -> Result<()> {
//! let config = RepositoryConfig::new("/data/private", "/data/public");
//! let store = VersionStore::open(config)?;
//!
//! // Create a tutorial owned by user 1
//! let meta = store.create_content(
//!     ContentKind::Tutorial,
//!     "Learn Things",
//!     None,
//!     None,
//!     vec![1],
//!     Some("Welcome!".to_string()),
//!     None,
//! )?;
//!
//! // Every structural edit becomes a new draft version
//! let engine = MutationEngine::new(&store);
//! engine.create_container(meta.id, "", "Part One", None, None)?;
//! engine.create_extract(meta.id, "part-one", "Getting Started", "Some text.")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Publishing
//!
//! ```rust,no_run
//! use scriptorium::{
//!     Actor, LifecycleController, MarkdownRenderer, NoopHooks, RepositoryConfig, Result,
//!     VersionStore,
//! };
//!
//! # fn main() -> Result<()> {
//! # let store = VersionStore::open(RepositoryConfig::new("/p", "/q"))?;
//! # let content = 1;
//! # let draft = String::new();
//! let lifecycle = LifecycleController::new(&store, &NoopHooks, &MarkdownRenderer);
//! let author = Actor::user(1);
//! let validator = Actor::staff(2);
//!
//! let request = lifecycle.request_validation(&author, content, &draft, "Ready!", None)?;
//! lifecycle.reserve(&validator, content, request)?;
//! lifecycle.accept(&validator, content, request, "Looks good.", true, None)?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod diff;
pub mod error;
pub mod lifecycle;
pub mod mutation;
pub mod slug;
pub mod store;
pub mod tree;
pub mod validation;

pub use archive::{export, import_into, import_new, parse_archive, ArchiveManifest, ImportedContent};
pub use config::RepositoryConfig;
pub use diff::{DiffEntry, LineChange, TextField, VersionDiff};
pub use error::{RepositoryError, Result};
pub use lifecycle::{
    AccessDecision, Actor, LifecycleController, LifecycleHooks, MarkdownRenderer, NoopHooks,
    PublicationRenderer,
};
pub use mutation::MutationEngine;
pub use slug::{slugify, unique_slug};
pub use store::{ContentId, ContentMeta, VersionId, VersionPointers, VersionRecord, VersionStore};
pub use tree::{ContentKind, Node, NodeEdit, NodeKind, Placement, Tree, TreeDocument};
pub use validation::{ValidationRequest, ValidationStatus};
