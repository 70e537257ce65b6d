//! Tree mutation engine
//!
//! Every operation follows the same shape: take the content's mutation lock,
//! load the current draft, apply the in-memory change, and commit. Structural
//! invariants are checked by the tree before anything is persisted, so a
//! failed mutation leaves the history untouched. A mutation that produces a
//! structurally identical tree returns the current draft identifier without
//! committing.

use crate::error::Result;
use crate::store::{ContentId, ContentMeta, VersionId, VersionStore};
use crate::tree::{NodeEdit, Placement, Tree};
use tracing::debug;

/// Structural operations over a content's draft
pub struct MutationEngine<'a> {
    store: &'a VersionStore,
}

impl<'a> MutationEngine<'a> {
    pub fn new(store: &'a VersionStore) -> Self {
        MutationEngine { store }
    }

    /// Lock, load the draft, apply `apply`, commit unless nothing changed
    fn with_draft<F>(&self, content: ContentId, apply: F) -> Result<VersionId>
    where
        F: FnOnce(&mut Tree, &mut ContentMeta, &VersionStore) -> Result<()>,
    {
        let _lock = self.store.try_lock_content(content)?;
        let mut meta = self.store.load_meta(content)?;
        let mut tree = self.store.load_with_meta(&meta, None)?;
        let before = tree.clone();

        apply(&mut tree, &mut meta, self.store)?;

        if tree.structurally_equal(&before) {
            let draft = meta
                .pointers
                .draft
                .clone()
                .expect("loaded draft implies a draft pointer");
            debug!(content, "mutation is a no-op, keeping draft version");
            return Ok(draft);
        }

        let parent = meta.pointers.draft.clone();
        self.store.commit(&mut meta, &tree, parent)
    }

    /// Create a container under the container at `parent_path`
    pub fn create_container(
        &self,
        content: ContentId,
        parent_path: &str,
        title: &str,
        introduction: Option<String>,
        conclusion: Option<String>,
    ) -> Result<VersionId> {
        self.with_draft(content, |tree, _, _| {
            let parent = tree.resolve(parent_path)?;
            tree.add_container(parent, title, introduction, conclusion)?;
            Ok(())
        })
    }

    /// Create an extract under the container at `parent_path`
    pub fn create_extract(
        &self,
        content: ContentId,
        parent_path: &str,
        title: &str,
        text: &str,
    ) -> Result<VersionId> {
        self.with_draft(content, |tree, _, _| {
            let parent = tree.resolve(parent_path)?;
            tree.add_extract(parent, title, text)?;
            Ok(())
        })
    }

    /// Edit the node at `path`; the empty path edits the content itself
    ///
    /// Retitling the content retires its top-level slug into history; the
    /// old slug keeps resolving. Retitling an inner node re-slugs it among
    /// its siblings; its old path stays valid within past versions only.
    pub fn edit_node(&self, content: ContentId, path: &str, edit: NodeEdit) -> Result<VersionId> {
        self.with_draft(content, |tree, meta, store| {
            let id = tree.resolve(path)?;
            if id == crate::tree::ROOT {
                // The in-memory edit must be validated before the rename
                // touches persisted metadata
                let new_title = edit.title.clone();
                tree.edit_node(
                    id,
                    NodeEdit {
                        title: None,
                        ..edit
                    },
                )?;
                if let Some(new_title) = new_title {
                    store.rename_content(meta, &new_title)?;
                    tree.rename_root(&new_title, &meta.slug);
                }
            } else {
                tree.edit_node(id, edit)?;
            }
            Ok(())
        })
    }

    /// Delete the node at `path` and, for containers, all its descendants
    ///
    /// Text of the removed subtree stays reachable through past versions.
    pub fn delete_node(&self, content: ContentId, path: &str) -> Result<VersionId> {
        self.with_draft(content, |tree, _, _| {
            let id = tree.resolve(path)?;
            tree.remove_node(id)
        })
    }

    /// Move the node at `child_path` under `target_path` at `placement`
    pub fn move_node(
        &self,
        content: ContentId,
        child_path: &str,
        target_path: &str,
        placement: &Placement,
    ) -> Result<VersionId> {
        self.with_draft(content, |tree, _, _| {
            let child = tree.resolve(child_path)?;
            let target = tree.resolve(target_path)?;
            tree.move_node(child, target, placement)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RepositoryConfig;
    use crate::error::RepositoryError;
    use crate::tree::ContentKind;
    use tempfile::TempDir;

    fn setup() -> (VersionStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = RepositoryConfig::new(dir.path().join("private"), dir.path().join("public"));
        (VersionStore::open(config).unwrap(), dir)
    }

    fn tutorial(store: &VersionStore) -> ContentId {
        store
            .create_content(
                ContentKind::Tutorial,
                "Engine Test",
                None,
                None,
                vec![1],
                Some("intro".to_string()),
                None,
            )
            .unwrap()
            .id
    }

    #[test]
    fn test_create_and_resolve() {
        let (store, _dir) = setup();
        let content = tutorial(&store);
        let engine = MutationEngine::new(&store);

        engine
            .create_container(content, "", "Part One", None, None)
            .unwrap();
        engine
            .create_container(content, "part-one", "Chapter", None, None)
            .unwrap();
        engine
            .create_extract(content, "part-one/chapter", "Extract", "body")
            .unwrap();

        let tree = store.load(content, None).unwrap();
        assert!(tree.resolve("part-one/chapter/extract").is_ok());
    }

    #[test]
    fn test_failed_mutation_keeps_draft() {
        let (store, _dir) = setup();
        let content = tutorial(&store);
        let engine = MutationEngine::new(&store);
        engine
            .create_container(content, "", "Part", None, None)
            .unwrap();
        let draft = store.load_meta(content).unwrap().pointers.draft.unwrap();

        // extract directly under a tutorial root is invalid
        let err = engine.create_extract(content, "", "Oops", "text");
        assert!(matches!(err, Err(RepositoryError::InvalidParent(_))));

        let meta = store.load_meta(content).unwrap();
        assert_eq!(meta.pointers.draft.unwrap(), draft);
    }

    #[test]
    fn test_noop_move_keeps_version() {
        let (store, _dir) = setup();
        let content = tutorial(&store);
        let engine = MutationEngine::new(&store);
        engine
            .create_container(content, "", "Part", None, None)
            .unwrap();
        engine
            .create_container(content, "part", "Chapter", None, None)
            .unwrap();
        engine
            .create_extract(content, "part/chapter", "One", "1")
            .unwrap();
        let before = engine
            .create_extract(content, "part/chapter", "Two", "2")
            .unwrap();

        // "two" is already last
        let after = engine
            .move_node(content, "part/chapter/two", "part/chapter", &Placement::Last)
            .unwrap();
        assert_eq!(before, after);

        let meta = store.load_meta(content).unwrap();
        assert_eq!(meta.versions.last().unwrap().id, before);
    }

    #[test]
    fn test_failed_root_edit_keeps_slug() {
        let (store, _dir) = setup();
        let content = tutorial(&store);
        let engine = MutationEngine::new(&store);

        // a root container has no text body, so the edit as a whole is
        // invalid and the rename it carries must not stick
        let err = engine.edit_node(
            content,
            "",
            NodeEdit {
                title: Some("Sneaky Rename".to_string()),
                text: Some("smuggled".to_string()),
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(RepositoryError::InvalidRequest(_))));

        let meta = store.load_meta(content).unwrap();
        assert_eq!(meta.slug, "engine-test");
        assert!(meta.slug_history.is_empty());
        assert!(store.find_by_slug("sneaky-rename").is_err());
    }

    #[test]
    fn test_content_rename_records_history() {
        let (store, _dir) = setup();
        let content = tutorial(&store);
        let engine = MutationEngine::new(&store);

        engine
            .edit_node(
                content,
                "",
                NodeEdit {
                    title: Some("Fresh Title".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let meta = store.load_meta(content).unwrap();
        assert_eq!(meta.slug, "fresh-title");
        assert_eq!(meta.slug_history.len(), 1);
        assert_eq!(meta.slug_history[0].slug, "engine-test");
        assert_eq!(store.find_by_slug("engine-test").unwrap(), content);
    }
}
