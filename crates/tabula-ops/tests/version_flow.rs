//! Integration tests for cloning and the draft lifecycle against local
//! `file://` remotes.
//!
//! Run with: `cargo test --package tabula-ops --test version_flow`

mod common;

use std::fs;

use common::{context, creds, Remote};
use tabula_core::{BaseVersion, ChangeKind, CurrentVersion, VersionSelector};
use tabula_ops::{
    CloneRequest, CommitRequest, CompareRequest, CreateDraftRequest, ErrorKind, HistoryRequest,
    OpsContext, RemoteRequest, RepositoryRequest, SwitchRequest,
};
use tempfile::TempDir;

async fn clone(ctx: &OpsContext, remote: &Remote) -> (String, std::path::PathBuf) {
    let cloned = ctx
        .clone_repository(CloneRequest::new(&remote.url))
        .await
        .unwrap();
    (cloned.repository.id, cloned.path)
}

async fn start_draft(ctx: &OpsContext, repo: &str, name: &str) -> String {
    ctx.create_draft(CreateDraftRequest::new(repo, name).with_credentials(creds()))
        .await
        .unwrap()
        .branch
}

#[tokio::test]
async fn test_end_to_end_clone_draft_commit_compare() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");

    let cloned = ctx
        .clone_repository(CloneRequest::new(&remote.url))
        .await
        .unwrap();
    assert!(!cloned.already_cloned);
    assert_eq!(cloned.repository.name, "tables");
    match &cloned.current {
        CurrentVersion::Published(version) => {
            assert_eq!(version.name, "v1.0");
            assert!(version.newest);
        }
        other => panic!("expected published version, got {:?}", other),
    }

    let repo = cloned.repository.id.clone();
    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(current.name(), "v1.0");

    let draft = ctx
        .create_draft(CreateDraftRequest::new(&repo, "v2.0").with_credentials(creds()))
        .await
        .unwrap();
    assert_eq!(draft.name, "v2.0");
    assert_eq!(draft.base_published_version.tag(), Some("v1.0"));
    assert!(!draft.has_commits());

    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    let on_draft = current.as_draft().unwrap();
    assert_eq!(on_draft.branch, draft.branch);
    assert_eq!(on_draft.base_published_version.tag(), Some("v1.0"));

    fs::write(cloned.path.join("people.csv"), "name,age\nada,37\n").unwrap();
    ctx.commit(CommitRequest::new(&repo, "Update ages"))
        .await
        .unwrap();

    let compared = ctx
        .compare(CompareRequest::between(
            &repo,
            VersionSelector::draft(&draft.branch),
            VersionSelector::published("v1.0"),
        ))
        .await
        .unwrap();
    assert_eq!(compared.changes.len(), 1);
    assert_eq!(compared.changes[0].path, "people.csv");
    assert_eq!(compared.changes[0].kind, ChangeKind::Modified);
}

#[tokio::test]
async fn test_single_draft_invariant() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let branch = start_draft(&ctx, &repo, "v2.0").await;
    let versions = ctx.versions(RepositoryRequest::new(&repo)).await.unwrap();
    assert_eq!(versions.draft.as_ref().unwrap().branch, branch);
    assert!(remote.branches().contains(&branch));

    let err = ctx
        .create_draft(CreateDraftRequest::new(&repo, "v3.0").with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DraftAlreadyExists);

    let deleted = ctx
        .delete_draft(RemoteRequest::new(&repo).with_credentials(creds()))
        .await
        .unwrap();
    assert_eq!(deleted.branch, branch);

    let versions = ctx.versions(RepositoryRequest::new(&repo)).await.unwrap();
    assert!(versions.draft.is_none());
    assert!(!remote.branches().contains(&branch));

    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(current.name(), "v1.0");
}

#[tokio::test]
async fn test_draft_exists_on_remote_blocks_creation() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let alice = context(temp.path(), "alice");
    let bob = context(temp.path(), "bob");
    let (alice_repo, _) = clone(&alice, &remote).await;
    let (bob_repo, _) = clone(&bob, &remote).await;

    start_draft(&alice, &alice_repo, "v2.0").await;

    let err = bob
        .create_draft(CreateDraftRequest::new(&bob_repo, "v2.1").with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DraftAlreadyExists);
}

#[tokio::test]
async fn test_publish_marks_exactly_one_newest() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;

    start_draft(&ctx, &repo, "v2.0").await;
    fs::write(path.join("cities.csv"), "city\nLima\n").unwrap();
    ctx.commit(CommitRequest::new(&repo, "Add cities"))
        .await
        .unwrap();

    let published = ctx
        .publish_draft(RemoteRequest::new(&repo).with_credentials(creds()))
        .await
        .unwrap();
    assert_eq!(published.name, "v2.0");
    assert!(published.newest);

    let versions = ctx.versions(RepositoryRequest::new(&repo)).await.unwrap();
    assert!(versions.draft.is_none());
    assert_eq!(versions.published.len(), 2);
    assert_eq!(versions.published.iter().filter(|v| v.newest).count(), 1);
    assert_eq!(versions.newest().unwrap().name, "v2.0");
    assert_eq!(
        versions.newest().unwrap().main_commit_oid,
        remote.resolve("refs/heads/main").unwrap()
    );

    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(current.name(), "v2.0");

    assert!(remote.tags().contains(&"v2.0".to_string()));
    assert!(remote.branches().iter().all(|b| !b.starts_with("draft/")));
}

#[tokio::test]
async fn test_publish_requires_commits() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let err = ctx
        .publish_draft(RemoteRequest::new(&repo).with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDraft);

    start_draft(&ctx, &repo, "v2.0").await;
    let err = ctx
        .publish_draft(RemoteRequest::new(&repo).with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToPublish);
}

#[tokio::test]
async fn test_draft_name_rules() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let err = ctx
        .create_draft(CreateDraftRequest::new(&repo, "v1.0").with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DraftNameCollision);

    let err = ctx
        .create_draft(CreateDraftRequest::new(&repo, "bad name").with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidDraftName);
}

#[tokio::test]
async fn test_create_draft_only_from_newest_version() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;

    start_draft(&ctx, &repo, "v2.0").await;
    fs::write(path.join("people.csv"), "name,age\nada,40\n").unwrap();
    ctx.commit(CommitRequest::new(&repo, "Edit")).await.unwrap();
    ctx.publish_draft(RemoteRequest::new(&repo).with_credentials(creds()))
        .await
        .unwrap();

    ctx.switch_version(SwitchRequest::new(&repo, VersionSelector::published("v1.0")))
        .await
        .unwrap();

    let err = ctx
        .create_draft(CreateDraftRequest::new(&repo, "v3.0").with_credentials(creds()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOnNewestVersion);
}

#[tokio::test]
async fn test_draft_from_initial_commit_when_nothing_published() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::unpublished(temp.path());
    let ctx = context(temp.path(), "a");

    let cloned = ctx
        .clone_repository(CloneRequest::new(&remote.url))
        .await
        .unwrap();
    assert!(matches!(cloned.current, CurrentVersion::Initial { .. }));

    let history = ctx
        .history(HistoryRequest::new(&cloned.repository.id))
        .await
        .unwrap();
    assert_eq!(history.version, "INITIAL");
    assert_eq!(history.commits.len(), 1);
    assert!(history.commits[0].message.starts_with("INITIAL_COMMIT"));

    let draft = ctx
        .create_draft(
            CreateDraftRequest::new(&cloned.repository.id, "v1.0").with_credentials(creds()),
        )
        .await
        .unwrap();
    assert_eq!(draft.base_published_version, BaseVersion::Initial);

    ctx.delete_draft(RemoteRequest::new(&cloned.repository.id))
        .await
        .unwrap();
    let current = ctx
        .current_version(RepositoryRequest::new(&cloned.repository.id))
        .await
        .unwrap();
    assert!(matches!(current, CurrentVersion::Initial { .. }));
}

#[tokio::test]
async fn test_commit_rules() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;

    fs::write(path.join("people.csv"), "changed").unwrap();
    let err = ctx
        .commit(CommitRequest::new(&repo, "On a published version"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOnDraft);

    ctx.discard_changes(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    start_draft(&ctx, &repo, "v2.0").await;

    let err = ctx
        .commit(CommitRequest::new(&repo, "Nothing"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NothingToCommit);

    fs::write(path.join("notes.csv"), "note\n").unwrap();
    let commit = ctx
        .commit(CommitRequest::new(&repo, "Add notes"))
        .await
        .unwrap();
    assert_eq!(commit.author.name, "Test User");
    assert!(!commit.in_remote);
}

#[tokio::test]
async fn test_discard_changes_restores_tree() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;
    start_draft(&ctx, &repo, "v2.0").await;

    fs::write(path.join("people.csv"), "scribbles").unwrap();
    fs::write(path.join("scratch.csv"), "tmp").unwrap();

    let status = ctx.status(RepositoryRequest::new(&repo)).await.unwrap();
    assert_eq!(status.changes.len(), 2);

    let current = ctx
        .discard_changes(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert!(current.is_draft());
    assert_eq!(
        fs::read_to_string(path.join("people.csv")).unwrap(),
        "name,age\nada,36\n"
    );
    assert!(!path.join("scratch.csv").exists());

    let status = ctx.status(RepositoryRequest::new(&repo)).await.unwrap();
    assert!(!status.has_changes());
}

#[tokio::test]
async fn test_switch_version() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;
    let branch = start_draft(&ctx, &repo, "v2.0").await;

    let current = ctx
        .switch_version(SwitchRequest::new(&repo, VersionSelector::published("v1.0")))
        .await
        .unwrap();
    assert_eq!(current.name(), "v1.0");

    let current = ctx
        .switch_version(SwitchRequest::new(&repo, VersionSelector::draft(&branch)))
        .await
        .unwrap();
    assert!(current.is_draft());

    let err = ctx
        .switch_version(SwitchRequest::new(&repo, VersionSelector::published("v9.9")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionNotFound);
}

#[tokio::test]
async fn test_push_commits_only_when_ahead() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;
    let branch = start_draft(&ctx, &repo, "v2.0").await;

    let outcome = ctx
        .push_commits(RemoteRequest::new(&repo))
        .await
        .unwrap();
    assert!(!outcome.pushed);

    fs::write(path.join("people.csv"), "name,age\nada,38\n").unwrap();
    let commit = ctx
        .commit(CommitRequest::new(&repo, "Birthday"))
        .await
        .unwrap();

    let history = ctx.history(HistoryRequest::new(&repo)).await.unwrap();
    assert_eq!(history.unpushed(), 1);

    let outcome = ctx
        .push_commits(RemoteRequest::new(&repo))
        .await
        .unwrap();
    assert!(outcome.pushed);
    assert_eq!(
        remote.resolve(&format!("refs/heads/{}", branch)).unwrap(),
        commit.oid
    );

    let history = ctx.history(HistoryRequest::new(&repo)).await.unwrap();
    assert_eq!(history.unpushed(), 0);

    let outcome = ctx
        .push_commits(RemoteRequest::new(&repo))
        .await
        .unwrap();
    assert!(!outcome.pushed);
}

#[tokio::test]
async fn test_push_commits_requires_being_on_the_draft() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let err = ctx
        .push_commits(RemoteRequest::new(&repo))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoDraft);

    ctx.create_draft(
        CreateDraftRequest::new(&repo, "v2.0")
            .with_credentials(creds())
            .without_checkout(),
    )
    .await
    .unwrap();

    let err = ctx
        .push_commits(RemoteRequest::new(&repo))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotOnDraft);
}

#[tokio::test]
async fn test_failed_draft_deletion_leaves_working_tree_alone() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, path) = clone(&ctx, &remote).await;
    let branch = start_draft(&ctx, &repo, "v2.0").await;

    fs::write(path.join("people.csv"), "unsaved work").unwrap();
    let moved = temp.path().join("unreachable.git");
    fs::rename(&remote.path, &moved).unwrap();

    let result = ctx.delete_draft(RemoteRequest::new(&repo)).await;
    assert!(result.is_err());

    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(current.as_draft().unwrap().branch, branch);
    assert_eq!(
        fs::read_to_string(path.join("people.csv")).unwrap(),
        "unsaved work"
    );

    fs::rename(&moved, &remote.path).unwrap();
    let deleted = ctx
        .delete_draft(RemoteRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(deleted.branch, branch);
    assert!(!remote.branches().contains(&branch));
    let current = ctx
        .current_version(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    assert_eq!(current.name(), "v1.0");
}

#[tokio::test]
async fn test_repository_ids_cannot_escape_the_repositories_dir() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), "a");

    let outside = temp.path().join("a").join("escape");
    git2::Repository::init(&outside).unwrap();

    for id in ["../escape", "..", "nested/repo"] {
        let err = ctx
            .versions(RepositoryRequest::new(id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepositoryNotFound, "id {}", id);
    }
}

#[tokio::test]
async fn test_credentials_contract() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let err = ctx
        .create_draft(CreateDraftRequest::new(&repo, "v2.0"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoCredentialsProvided);
    assert!(ctx.credential_store().get(&repo).unwrap().is_none());

    start_draft(&ctx, &repo, "v2.0").await;
    let stored = ctx.credential_store().get(&repo).unwrap().unwrap();
    assert_eq!(stored.username, "tester");

    ctx.delete_draft(RemoteRequest::new(&repo)).await.unwrap();

    ctx.forget_credentials(RepositoryRequest::new(&repo))
        .await
        .unwrap();
    let err = ctx
        .remote_changes(RemoteRequest::new(&repo))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoCredentialsProvided);
}

#[tokio::test]
async fn test_clone_validation_and_cleanup() {
    let temp = TempDir::new().unwrap();
    let ctx = context(temp.path(), "a");

    let err = ctx
        .clone_repository(CloneRequest::new("not a url"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedUrl);

    let missing = url::Url::from_file_path(temp.path().join("missing.git"))
        .unwrap()
        .to_string();
    let err = ctx
        .clone_repository(CloneRequest::new(&missing))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::UnknownRemoteOperationError | ErrorKind::ConnectionError
    ));
    let leftovers = ctx.list_repositories().await.unwrap();
    assert!(leftovers.is_empty());

    let bare = Remote::init(temp.path(), "untagged");
    bare.commit("first commit", &[("people.csv", "x\n")]);
    let err = ctx
        .clone_repository(CloneRequest::new(&bare.url))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RepositoryNotInitialized);
    let record = tabula_core::RepositoryRecord::from_remote_url(&bare.url);
    assert!(!ctx.repository_path(&record.id).exists());
}

#[tokio::test]
async fn test_clone_twice_short_circuits() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let ctx = context(temp.path(), "a");

    let first = ctx
        .clone_repository(CloneRequest::new(&remote.url))
        .await
        .unwrap();
    let second = ctx
        .clone_repository(CloneRequest::new(&remote.url))
        .await
        .unwrap();

    assert!(second.already_cloned);
    assert_eq!(first.path, second.path);
    assert_eq!(second.current.name(), "v1.0");

    let listed = ctx.list_repositories().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, first.repository.id);
}

#[tokio::test]
async fn test_lightweight_tags_are_ignored() {
    let temp = TempDir::new().unwrap();
    let remote = Remote::seeded(temp.path());
    let main = git2::Oid::from_str(&remote.resolve("refs/heads/main").unwrap()).unwrap();
    remote.lightweight_tag("scratch", main);

    let ctx = context(temp.path(), "a");
    let (repo, _) = clone(&ctx, &remote).await;

    let versions = ctx.versions(RepositoryRequest::new(&repo)).await.unwrap();
    assert_eq!(versions.published.len(), 1);
    assert_eq!(versions.published[0].name, "v1.0");
}
