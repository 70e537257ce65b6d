//! End-to-end editing workflow: create a content, grow its tree, edit and
//! delete nodes, and read back history.

use scriptorium::{
    ContentKind, DiffEntry, MutationEngine, NodeEdit, Placement, RepositoryConfig,
    RepositoryError, TextField, VersionStore,
};
use tempfile::TempDir;

fn open_store() -> (VersionStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = RepositoryConfig::new(dir.path().join("private"), dir.path().join("public"));
    (VersionStore::open(config).unwrap(), dir)
}

#[test]
fn test_tutorial_grows_and_resolves() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Rust for Everyone",
            Some("An introduction".to_string()),
            Some("CC-BY".to_string()),
            vec![1, 2],
            Some("Welcome.".to_string()),
            Some("Goodbye.".to_string()),
        )
        .unwrap();
    assert_eq!(meta.slug, "rust-for-everyone");
    assert!(meta.pointers.draft.is_some());

    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "The Basics", None, None)
        .unwrap();
    engine
        .create_container(meta.id, "the-basics", "Ownership", None, None)
        .unwrap();
    engine
        .create_extract(meta.id, "the-basics/ownership", "Borrowing", "References.")
        .unwrap();

    let tree = store.load(meta.id, None).unwrap();
    assert!(tree.resolve("the-basics").is_ok());
    assert!(tree.resolve("the-basics/ownership/borrowing").is_ok());
    assert!(matches!(
        tree.resolve("the-basics/nope"),
        Err(RepositoryError::NotFound(_))
    ));
}

#[test]
fn test_depth_limit_enforced_end_to_end() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Deep Dive",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Part", None, None)
        .unwrap();
    engine
        .create_container(meta.id, "part", "Chapter", None, None)
        .unwrap();

    let err = engine.create_container(meta.id, "part/chapter", "Too Deep", None, None);
    assert!(matches!(err, Err(RepositoryError::DepthExceeded { .. })));
}

#[test]
fn test_article_stays_flat() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Article,
            "Short Read",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);

    engine
        .create_extract(meta.id, "", "Only Section", "text")
        .unwrap();
    let err = engine.create_container(meta.id, "", "No Parts", None, None);
    assert!(matches!(err, Err(RepositoryError::InvalidParent(_))));
}

#[test]
fn test_every_mutation_is_a_version() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "History",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);

    let v1 = engine
        .create_container(meta.id, "", "One", None, None)
        .unwrap();
    let v2 = engine
        .create_container(meta.id, "", "Two", None, None)
        .unwrap();
    assert_ne!(v1, v2);

    let versions = store.list_versions(meta.id).unwrap();
    assert_eq!(versions.len(), 3); // initial commit plus two mutations
    assert_eq!(versions[1].id, v1);
    assert_eq!(versions[2].id, v2);
    assert_eq!(versions[2].parent.as_deref(), Some(v1.as_str()));

    // Past versions stay readable after later edits
    let old = store.load(meta.id, Some(&v1)).unwrap();
    assert!(old.resolve("one").is_ok());
    assert!(old.resolve("two").is_err());
}

#[test]
fn test_edit_retitles_and_reslug() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Editing",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Old Name", None, None)
        .unwrap();

    engine
        .edit_node(
            meta.id,
            "old-name",
            NodeEdit {
                title: Some("New Name".to_string()),
                introduction: Some("hello".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let tree = store.load(meta.id, None).unwrap();
    assert!(tree.resolve("old-name").is_err());
    let id = tree.resolve("new-name").unwrap();
    assert_eq!(tree.node(id).title, "New Name");
}

#[test]
fn test_delete_removes_subtree() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Pruning",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Part", None, None)
        .unwrap();
    engine
        .create_container(meta.id, "part", "Chapter", None, None)
        .unwrap();
    let before_delete = engine
        .create_extract(meta.id, "part/chapter", "Leaf", "text")
        .unwrap();

    engine.delete_node(meta.id, "part").unwrap();

    let tree = store.load(meta.id, None).unwrap();
    assert!(tree.resolve("part").is_err());
    assert!(tree.resolve("part/chapter/leaf").is_err());

    // The deleted text survives in history
    let old = store.load(meta.id, Some(&before_delete)).unwrap();
    assert!(old.resolve("part/chapter/leaf").is_ok());
}

#[test]
fn test_move_between_containers() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Reorg",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Alpha", None, None)
        .unwrap();
    engine
        .create_container(meta.id, "", "Beta", None, None)
        .unwrap();
    engine
        .create_extract(meta.id, "alpha", "One", "1")
        .unwrap();
    engine
        .create_extract(meta.id, "alpha", "Two", "2")
        .unwrap();
    engine.create_extract(meta.id, "beta", "Three", "3").unwrap();

    engine
        .move_node(
            meta.id,
            "alpha/two",
            "beta",
            &Placement::Before("three".to_string()),
        )
        .unwrap();

    let tree = store.load(meta.id, None).unwrap();
    assert!(tree.resolve("alpha/two").is_err());
    assert!(tree.resolve("beta/two").is_ok());
    let paths = tree.walk_paths();
    let two = paths.iter().position(|p| p == "beta/two").unwrap();
    let three = paths.iter().position(|p| p == "beta/three").unwrap();
    assert!(two < three);
}

#[test]
fn test_invalid_moves_rejected() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Illegal Moves",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Part", None, None)
        .unwrap();
    engine
        .create_container(meta.id, "part", "Chapter", None, None)
        .unwrap();

    // a container cannot move under its own descendant
    let err = engine.move_node(meta.id, "part", "part/chapter", &Placement::Last);
    assert!(matches!(err, Err(RepositoryError::InvalidMove(_))));

    // the root never moves
    let err = engine.move_node(meta.id, "", "part", &Placement::Last);
    assert!(matches!(err, Err(RepositoryError::InvalidMove(_))));
}

#[test]
fn test_diff_reports_text_and_structure() {
    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Diffing",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    engine
        .create_container(meta.id, "", "Part", None, None)
        .unwrap();
    let from = engine
        .create_extract(meta.id, "part", "Story", "line one\nline two")
        .unwrap();
    let to = engine
        .edit_node(
            meta.id,
            "part/story",
            NodeEdit {
                text: Some("line one\nline 2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let diff = store.diff(meta.id, &from, &to).unwrap();
    let changed = diff
        .entries
        .iter()
        .find_map(|e| match e {
            DiffEntry::TextChanged { path, field, lines } if path == "part/story" => {
                assert_eq!(*field, TextField::Text);
                Some(lines)
            }
            _ => None,
        })
        .expect("a text change on part/story");
    assert!(!changed.is_empty());
}

#[test]
fn test_random_edit_sequence_stays_consistent() {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let (store, _dir) = open_store();
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Fuzzy",
            None,
            None,
            vec![1],
            None,
            None,
        )
        .unwrap();
    let engine = MutationEngine::new(&store);
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);

    for step in 0..60 {
        let tree = store.load(meta.id, None).unwrap();
        let paths = tree.walk_paths();
        match rng.gen_range(0..3) {
            0 => {
                // grow at the root; invariant failures are acceptable
                let _ = engine.create_container(
                    meta.id,
                    "",
                    &format!("Container {}", step),
                    None,
                    None,
                );
            }
            1 => {
                if let Some(path) = paths.first() {
                    let _ = engine.create_extract(meta.id, path, &format!("Extract {}", step), "x");
                }
            }
            _ => {
                if paths.len() > 1 {
                    let victim = &paths[rng.gen_range(0..paths.len())];
                    let _ = engine.delete_node(meta.id, victim);
                }
            }
        }

        // after every step the draft reloads cleanly and all paths resolve
        let tree = store.load(meta.id, None).unwrap();
        for path in tree.walk_paths() {
            assert!(tree.resolve(&path).is_ok(), "unresolvable path {}", path);
        }
    }

    // the chain is intact end to end
    let versions = store.list_versions(meta.id).unwrap();
    for pair in versions.windows(2) {
        assert_eq!(pair[1].parent.as_deref(), Some(pair[0].id.as_str()));
    }
}

#[test]
fn test_store_reopen_preserves_everything() {
    let dir = TempDir::new().unwrap();
    let config = RepositoryConfig::new(dir.path().join("private"), dir.path().join("public"));
    let id = {
        let store = VersionStore::open(config.clone()).unwrap();
        let meta = store
            .create_content(
                ContentKind::Tutorial,
                "Persistent",
                None,
                None,
                vec![7],
                None,
                None,
            )
            .unwrap();
        let engine = MutationEngine::new(&store);
        engine
            .create_container(meta.id, "", "Part", None, None)
            .unwrap();
        meta.id
    };

    let store = VersionStore::open(config).unwrap();
    assert_eq!(store.find_by_slug("persistent").unwrap(), id);
    let tree = store.load(id, None).unwrap();
    assert!(tree.resolve("part").is_ok());
    assert_eq!(store.list_versions(id).unwrap().len(), 2);
}
