//! Who may read what, across every lifecycle stage.

use scriptorium::{
    AccessDecision, Actor, ContentId, ContentKind, LifecycleController, LifecycleHooks,
    MarkdownRenderer, MutationEngine, RepositoryConfig, VersionStore,
};
use tempfile::TempDir;

const AUTHOR: Actor = Actor { id: 1, is_staff: false };
const STAFF: Actor = Actor { id: 2, is_staff: true };
const READER: Actor = Actor { id: 9, is_staff: false };

struct Silent;
impl LifecycleHooks for Silent {}

fn open_store() -> (VersionStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = RepositoryConfig::new(dir.path().join("private"), dir.path().join("public"));
    (VersionStore::open(config).unwrap(), dir)
}

fn tutorial(store: &VersionStore) -> ContentId {
    let meta = store
        .create_content(
            ContentKind::Tutorial,
            "Guarded",
            None,
            None,
            vec![AUTHOR.id],
            Some("intro".to_string()),
            None,
        )
        .unwrap();
    MutationEngine::new(store)
        .create_container(meta.id, "", "Part", None, None)
        .unwrap();
    meta.id
}

#[test]
fn test_draft_is_private() {
    let (store, _dir) = open_store();
    let content = tutorial(&store);
    let controller = LifecycleController::new(&store, &Silent, &MarkdownRenderer);

    assert_eq!(
        controller.resolve_access(Some(&AUTHOR), content, None).unwrap(),
        AccessDecision::Allow
    );
    assert_eq!(
        controller.resolve_access(Some(&STAFF), content, None).unwrap(),
        AccessDecision::Allow
    );
    assert_eq!(
        controller.resolve_access(Some(&READER), content, None).unwrap(),
        AccessDecision::Forbidden
    );
    assert_eq!(
        controller.resolve_access(None, content, None).unwrap(),
        AccessDecision::Forbidden
    );
}

#[test]
fn test_public_version_is_world_readable() {
    let (store, _dir) = open_store();
    let content = tutorial(&store);
    let controller = LifecycleController::new(&store, &Silent, &MarkdownRenderer);

    let published = store.load_meta(content).unwrap().pointers.draft.unwrap();
    let request = controller
        .request_validation(&AUTHOR, content, &published, "go", None)
        .unwrap();
    controller.reserve(&STAFF, content, request).unwrap();
    controller
        .accept(&STAFF, content, request, "fine", true, None)
        .unwrap();

    for actor in [Some(&AUTHOR), Some(&STAFF), Some(&READER), None] {
        assert_eq!(
            controller
                .resolve_access(actor, content, Some(&published))
                .unwrap(),
            AccessDecision::Allow
        );
    }

    // later drafts stay private
    let newer = MutationEngine::new(&store)
        .create_container(content, "", "Unreleased", None, None)
        .unwrap();
    assert_eq!(
        controller
            .resolve_access(Some(&READER), content, Some(&newer))
            .unwrap(),
        AccessDecision::Forbidden
    );
    assert_eq!(
        controller
            .resolve_access(Some(&AUTHOR), content, Some(&newer))
            .unwrap(),
        AccessDecision::Allow
    );
}

#[test]
fn test_unknown_version_is_not_found_for_everyone() {
    let (store, _dir) = open_store();
    let content = tutorial(&store);
    let controller = LifecycleController::new(&store, &Silent, &MarkdownRenderer);

    for actor in [Some(&AUTHOR), Some(&STAFF), Some(&READER), None] {
        assert_eq!(
            controller
                .resolve_access(actor, content, Some("deadbeef"))
                .unwrap(),
            AccessDecision::NotFound
        );
    }
}

#[test]
fn test_unknown_content_is_not_found() {
    let (store, _dir) = open_store();
    let controller = LifecycleController::new(&store, &Silent, &MarkdownRenderer);
    assert_eq!(
        controller.resolve_access(Some(&STAFF), 999, None).unwrap(),
        AccessDecision::NotFound
    );
}

#[test]
fn test_beta_version_not_world_readable() {
    let (store, _dir) = open_store();
    let content = tutorial(&store);
    let controller = LifecycleController::new(&store, &Silent, &MarkdownRenderer);

    let beta = store.load_meta(content).unwrap().pointers.draft.unwrap();
    controller.set_beta(&AUTHOR, content, &beta).unwrap();

    assert_eq!(
        controller
            .resolve_access(Some(&READER), content, Some(&beta))
            .unwrap(),
        AccessDecision::Forbidden
    );
    assert_eq!(
        controller
            .resolve_access(None, content, Some(&beta))
            .unwrap(),
        AccessDecision::Forbidden
    );
}
