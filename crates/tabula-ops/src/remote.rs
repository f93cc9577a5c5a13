//! Remote synchronization: diffing local against remote ref state and
//! integrating the difference.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tabula_core::{
    Credentials, DraftBranch, DraftCommits, DraftVersion, RemoteDraft, RemoteRepositoryChanges,
    RemoteTag,
};
use tabula_git::{FetchSettings, GitPrimitives, Identity, RemoteRef};
use tracing::{debug, info};

use crate::backup::run_with_backup;
use crate::config::Config;
use crate::credentials::{CredentialStore, ResolvedCredentials};
use crate::error::{OpsError, OpsResult};
use crate::model::{branch_ref, tag_ref, tracking_ref, VersionModel, MAIN_BRANCH, REMOTE};

/// A single ref to push or delete on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum RefTarget {
    Branch(String),
    Tag(String),
}

impl RefTarget {
    pub fn refname(&self) -> String {
        match self {
            RefTarget::Branch(name) => branch_ref(name),
            RefTarget::Tag(name) => tag_ref(name),
        }
    }
}

/// Draft branches and tags advertised by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteState {
    pub drafts: Vec<RemoteDraft>,
    pub tags: Vec<RemoteTag>,
}

impl RemoteState {
    /// Classify advertised refs into draft branches and tags.
    pub fn from_refs(refs: &[RemoteRef]) -> Self {
        let mut state = Self::default();
        for remote_ref in refs {
            if let Some(branch) = remote_ref.name.strip_prefix("refs/heads/") {
                if let Ok(parsed) = DraftBranch::parse(branch) {
                    state.drafts.push(RemoteDraft {
                        branch: branch.to_string(),
                        name: parsed.name,
                        id: parsed.id,
                        head_oid: remote_ref.oid.clone(),
                    });
                }
            } else if let Some(tag) = remote_ref.name.strip_prefix("refs/tags/") {
                state.tags.push(RemoteTag {
                    name: tag.to_string(),
                    oid: remote_ref.oid.clone(),
                    commit_oid: remote_ref.peeled.clone(),
                });
            }
        }
        state
    }
}

/// Difference between local drafts/tags and what the remote advertises.
///
/// Only the first new draft, diverged draft and deleted draft are reported,
/// since at most one draft exists at a time; every missing tag is reported.
pub fn diff_remote_state(
    local_drafts: &[DraftVersion],
    local_tags: &[String],
    remote: &RemoteState,
) -> RemoteRepositoryChanges {
    let mut changes = RemoteRepositoryChanges::default();

    for remote_draft in &remote.drafts {
        match local_drafts.iter().find(|d| d.branch == remote_draft.branch) {
            Some(local) if local.head_oid != remote_draft.head_oid => {
                if changes.new_commits.is_none() {
                    changes.new_commits = Some(DraftCommits {
                        branch: local.branch.clone(),
                        local_oid: local.head_oid.clone(),
                        remote_oid: remote_draft.head_oid.clone(),
                    });
                }
            }
            Some(_) => {}
            None => {
                if changes.new_draft.is_none() {
                    changes.new_draft = Some(remote_draft.clone());
                }
            }
        }
    }

    let remote_branches: HashSet<&str> = remote.drafts.iter().map(|d| d.branch.as_str()).collect();
    changes.deleted_draft = local_drafts
        .iter()
        .find(|d| !remote_branches.contains(d.branch.as_str()))
        .cloned();

    let local_tags: HashSet<&str> = local_tags.iter().map(String::as_str).collect();
    changes.new_published_versions = remote
        .tags
        .iter()
        .filter(|t| !local_tags.contains(t.name.as_str()))
        .cloned()
        .collect();

    changes
}

// =============================================================================
// Tracking Branches
// =============================================================================

/// Create a local branch at `origin/<branch>` with explicit upstream config.
pub(crate) fn track_remote_branch(git: &dyn GitPrimitives, branch: &str) -> OpsResult<()> {
    let remote_oid = git.resolve_ref(&tracking_ref(branch))?;
    git.create_branch(branch, &remote_oid)?;
    set_tracking_config(git, branch)?;
    debug!(branch, oid = %remote_oid, "Created tracking branch");
    Ok(())
}

pub(crate) fn set_tracking_config(git: &dyn GitPrimitives, branch: &str) -> OpsResult<()> {
    git.set_config(&format!("branch.{}.remote", branch), REMOTE)?;
    git.set_config(&format!("branch.{}.merge", branch), &branch_ref(branch))?;
    Ok(())
}

/// Remove a local draft branch, its upstream config and any stale
/// remote-tracking ref.
pub(crate) fn remove_local_branch(git: &dyn GitPrimitives, branch: &str) -> OpsResult<()> {
    if git.try_resolve_ref(&branch_ref(branch))?.is_some() {
        git.delete_branch(branch)?;
    }
    git.delete_config(&format!("branch.{}.remote", branch))?;
    git.delete_config(&format!("branch.{}.merge", branch))?;
    if git.try_resolve_ref(&tracking_ref(branch))?.is_some() {
        git.delete_ref(&tracking_ref(branch))?;
    }
    Ok(())
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Computes and applies remote changes for one repository.
pub struct RemoteSyncEngine<'a> {
    git: &'a dyn GitPrimitives,
    model: VersionModel<'a>,
    store: &'a dyn CredentialStore,
    repository_id: &'a str,
    identity: Identity,
}

impl<'a> RemoteSyncEngine<'a> {
    pub fn new(
        git: &'a dyn GitPrimitives,
        config: &'a Config,
        store: &'a dyn CredentialStore,
        repository_id: &'a str,
        identity: Identity,
    ) -> Self {
        Self {
            git,
            model: VersionModel::new(git, config),
            store,
            repository_id,
            identity,
        }
    }

    /// Resolve credentials for this repository, failing when none exist.
    pub fn credentials(&self, explicit: Option<Credentials>) -> OpsResult<ResolvedCredentials> {
        ResolvedCredentials::require(self.store, self.repository_id, explicit)
    }

    /// Persist explicitly supplied credentials after success.
    pub fn remember(&self, credentials: &ResolvedCredentials) -> OpsResult<()> {
        credentials.remember(self.store, self.repository_id)
    }

    /// Refs currently advertised by the remote.
    pub fn remote_state(&self, credentials: &ResolvedCredentials) -> OpsResult<RemoteState> {
        let auth = credentials.auth();
        let refs = self
            .git
            .list_remote_refs(REMOTE, true, &auth)
            .map_err(OpsError::remote)?;
        Ok(RemoteState::from_refs(&refs))
    }

    /// Difference between local and remote state.
    pub fn compute_remote_changes(
        &self,
        explicit: Option<Credentials>,
    ) -> OpsResult<RemoteRepositoryChanges> {
        let credentials = self.credentials(explicit)?;
        let changes = self.changes_with(&credentials)?;
        self.remember(&credentials)?;
        Ok(changes)
    }

    fn changes_with(&self, credentials: &ResolvedCredentials) -> OpsResult<RemoteRepositoryChanges> {
        let remote = self.remote_state(credentials)?;
        let drafts = self.model.list_draft_versions()?;
        let tags = self.git.list_tags()?;
        let changes = diff_remote_state(&drafts, &tags, &remote);
        debug!(
            repository = self.repository_id,
            new_draft = changes.new_draft.is_some(),
            new_commits = changes.new_commits.is_some(),
            deleted_draft = changes.deleted_draft.is_some(),
            new_tags = changes.new_published_versions.len(),
            "Computed remote changes"
        );
        Ok(changes)
    }

    /// Fetch everything from the remote, tags included, pruning deleted branches.
    pub fn fetch(&self, explicit: Option<Credentials>) -> OpsResult<()> {
        let credentials = self.credentials(explicit)?;
        self.fetch_with(&credentials)?;
        self.remember(&credentials)
    }

    fn fetch_with(&self, credentials: &ResolvedCredentials) -> OpsResult<()> {
        let auth = credentials.auth();
        self.git
            .fetch(
                REMOTE,
                FetchSettings {
                    tags: true,
                    prune: true,
                },
                &auth,
            )
            .map_err(OpsError::remote)
    }

    /// Fetch and integrate every remote change.
    ///
    /// Everything after computing the changes runs under a directory backup,
    /// so a failing integration step leaves the repository exactly as it was.
    pub fn pull(&self, explicit: Option<Credentials>) -> OpsResult<RemoteRepositoryChanges> {
        let credentials = self.credentials(explicit)?;
        let changes = self.changes_with(&credentials)?;

        let workdir = self.git.workdir().to_path_buf();
        run_with_backup(&workdir, || self.integrate(&changes, &credentials))?;

        self.remember(&credentials)?;
        info!(repository = self.repository_id, "Pulled remote changes");
        Ok(changes)
    }

    fn integrate(
        &self,
        changes: &RemoteRepositoryChanges,
        credentials: &ResolvedCredentials,
    ) -> OpsResult<()> {
        let current_branch = self.git.current_branch()?;

        // Fetching a pruned branch while it is checked out is not safe.
        let on_deleted_draft = match &changes.deleted_draft {
            Some(deleted) if current_branch.as_deref() == Some(deleted.branch.as_str()) => {
                self.git.checkout_branch(MAIN_BRANCH, false)?;
                true
            }
            _ => false,
        };

        self.fetch_with(credentials)?;

        if let Some(new_commits) = &changes.new_commits {
            let outcome = self.git.merge(
                &new_commits.branch,
                &tracking_ref(&new_commits.branch),
                &self.identity,
            )?;
            debug!(branch = %new_commits.branch, outcome = ?outcome, "Integrated draft commits");
            if current_branch.as_deref() == Some(new_commits.branch.as_str()) {
                self.git.checkout_branch(&new_commits.branch, false)?;
            }
        }

        if let Some(new_draft) = &changes.new_draft {
            track_remote_branch(self.git, &new_draft.branch)?;
        }

        if !changes.new_published_versions.is_empty() {
            let outcome =
                self.git
                    .merge(MAIN_BRANCH, &tracking_ref(MAIN_BRANCH), &self.identity)?;
            debug!(outcome = ?outcome, "Integrated published versions");
        }

        if let Some(deleted) = &changes.deleted_draft {
            if on_deleted_draft {
                self.checkout_published_or_initial(false)?;
            }
            remove_local_branch(self.git, &deleted.branch)?;
            debug!(branch = %deleted.branch, "Removed deleted draft");
        }

        Ok(())
    }

    /// Check out the newest published version, or the initial commit when
    /// nothing is published.
    pub(crate) fn checkout_published_or_initial(&self, force: bool) -> OpsResult<()> {
        let target = match self.model.newest_published_version()? {
            Some(version) => version.main_commit_oid,
            None => self.model.get_initial_commit_oid()?,
        };
        self.git.checkout_detached(&target, force)?;
        Ok(())
    }

    /// Push `target` to the remote, or delete it there.
    pub fn push_branch_or_tag(
        &self,
        target: &RefTarget,
        explicit: Option<Credentials>,
        delete: bool,
    ) -> OpsResult<()> {
        let credentials = self.credentials(explicit)?;
        self.push_with(target, &credentials, delete)?;
        self.remember(&credentials)
    }

    pub(crate) fn push_with(
        &self,
        target: &RefTarget,
        credentials: &ResolvedCredentials,
        delete: bool,
    ) -> OpsResult<()> {
        let auth = credentials.auth();
        let refname = target.refname();
        self.git
            .push(REMOTE, &refname, delete, &auth)
            .map_err(OpsError::remote)?;
        info!(refname = %refname, delete, "Pushed ref");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::BaseVersion;

    fn draft(branch: &str, head: &str) -> DraftVersion {
        let parsed = DraftBranch::parse(branch).unwrap();
        DraftVersion {
            id: parsed.id,
            name: parsed.name,
            branch: branch.to_string(),
            head_oid: head.to_string(),
            base_oid: "base".into(),
            base_published_version: BaseVersion::Initial,
        }
    }

    fn remote_ref(name: &str, oid: &str, peeled: Option<&str>) -> RemoteRef {
        RemoteRef {
            name: name.to_string(),
            oid: oid.to_string(),
            peeled: peeled.map(str::to_string),
        }
    }

    #[test]
    fn test_classify_remote_refs() {
        let refs = vec![
            remote_ref("HEAD", "a", None),
            remote_ref("refs/heads/main", "a", None),
            remote_ref("refs/heads/draft/v2.0_abc", "b", None),
            remote_ref("refs/heads/feature", "c", None),
            remote_ref("refs/tags/v1.0", "t1", Some("a")),
        ];

        let state = RemoteState::from_refs(&refs);
        assert_eq!(state.drafts.len(), 1);
        assert_eq!(state.drafts[0].name, "v2.0");
        assert_eq!(state.drafts[0].id, "abc");
        assert_eq!(state.tags.len(), 1);
        assert_eq!(state.tags[0].commit_oid.as_deref(), Some("a"));
    }

    #[test]
    fn test_diff_detects_each_facet() {
        let remote = RemoteState {
            drafts: vec![RemoteDraft {
                branch: "draft/v2.0_abc".into(),
                name: "v2.0".into(),
                id: "abc".into(),
                head_oid: "remote-head".into(),
            }],
            tags: vec![
                RemoteTag {
                    name: "v1.0".into(),
                    oid: "t1".into(),
                    commit_oid: None,
                },
                RemoteTag {
                    name: "v1.1".into(),
                    oid: "t2".into(),
                    commit_oid: None,
                },
            ],
        };

        let changes = diff_remote_state(&[], &["v1.0".into()], &remote);
        assert_eq!(changes.new_draft.as_ref().unwrap().branch, "draft/v2.0_abc");
        assert!(changes.new_commits.is_none());
        assert!(changes.deleted_draft.is_none());
        assert_eq!(changes.new_published_versions.len(), 1);
        assert_eq!(changes.new_published_versions[0].name, "v1.1");

        let local = [draft("draft/v2.0_abc", "local-head")];
        let changes = diff_remote_state(&local, &["v1.0".into(), "v1.1".into()], &remote);
        assert!(changes.new_draft.is_none());
        let commits = changes.new_commits.unwrap();
        assert_eq!(commits.local_oid, "local-head");
        assert_eq!(commits.remote_oid, "remote-head");
        assert!(changes.new_published_versions.is_empty());

        let local = [draft("draft/old_xyz", "h")];
        let changes = diff_remote_state(&local, &[], &RemoteState::default());
        assert_eq!(changes.deleted_draft.unwrap().branch, "draft/old_xyz");
    }

    #[test]
    fn test_diff_is_empty_when_in_sync() {
        let local = [draft("draft/v2.0_abc", "h")];
        let remote = RemoteState {
            drafts: vec![RemoteDraft {
                branch: "draft/v2.0_abc".into(),
                name: "v2.0".into(),
                id: "abc".into(),
                head_oid: "h".into(),
            }],
            tags: vec![],
        };
        assert!(diff_remote_state(&local, &[], &remote).is_empty());
    }

    #[test]
    fn test_ref_target_names() {
        assert_eq!(
            RefTarget::Branch("draft/v2_abc".into()).refname(),
            "refs/heads/draft/v2_abc"
        );
        assert_eq!(RefTarget::Tag("v1.0".into()).refname(), "refs/tags/v1.0");
    }
}
