//! User-facing version operations.
//!
//! Each operation checks the version model's preconditions, runs a short
//! sequence of Git primitives and leaves HEAD on a recognizable version.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tabula_core::{
    is_draft_branch, is_valid_repository_id, Commit, Credentials, CurrentVersion, DraftBranch,
    DraftVersion, PublishedVersion, RepositoryRecord, VersionSelector,
};
use tabula_git::{Auth, GitBackend, GitPrimitives, Identity};
use tracing::{debug, info, warn};
use url::Url;

use crate::backup::run_with_backup;
use crate::config::Config;
use crate::credentials::{CredentialStore, ResolvedCredentials};
use crate::error::{OpsError, OpsResult};
use crate::model::{branch_ref, main_ref, tracking_ref, VersionModel, MAIN_BRANCH, REMOTE};
use crate::remote::{
    remove_local_branch, set_tracking_config, track_remote_branch, RefTarget, RemoteSyncEngine,
};

/// URL schemes a remote may use.
const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "ssh", "git", "file"];

/// Result of pushing the draft's commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub branch: String,
    pub head_oid: String,
    /// False when the remote already had every commit.
    pub pushed: bool,
}

/// Version operations on one cloned repository.
pub struct VersionLifecycle<'a> {
    git: &'a dyn GitPrimitives,
    model: VersionModel<'a>,
    remote: RemoteSyncEngine<'a>,
    identity: Identity,
}

impl<'a> VersionLifecycle<'a> {
    pub fn new(
        git: &'a dyn GitPrimitives,
        config: &'a Config,
        store: &'a dyn CredentialStore,
        repository_id: &'a str,
    ) -> OpsResult<Self> {
        let identity = repository_identity(git, config)?;
        Ok(Self {
            git,
            model: VersionModel::new(git, config),
            remote: RemoteSyncEngine::new(git, config, store, repository_id, identity.clone()),
            identity,
        })
    }

    pub fn model(&self) -> &VersionModel<'a> {
        &self.model
    }

    pub fn remote(&self) -> &RemoteSyncEngine<'a> {
        &self.remote
    }

    /// Check out a published version (detached) or a draft branch.
    pub fn switch_version(&self, selector: &VersionSelector) -> OpsResult<CurrentVersion> {
        match selector {
            VersionSelector::Published { name } => {
                let version = self
                    .model
                    .find_published(name)?
                    .ok_or_else(|| OpsError::VersionNotFound { name: name.clone() })?;
                self.git.checkout_detached(&version.main_commit_oid, false)?;
            }
            VersionSelector::Draft { branch } => {
                if self.model.find_draft(branch)?.is_none() {
                    return Err(OpsError::VersionNotFound {
                        name: branch.clone(),
                    });
                }
                self.git.checkout_branch(branch, false)?;
            }
        }

        let current = self.model.get_current_version()?;
        info!(version = %current, "Switched version");
        Ok(current)
    }

    /// Fork a new draft from the newest published version and push it.
    pub fn create_draft(
        &self,
        name: &str,
        explicit: Option<Credentials>,
        checkout: bool,
    ) -> OpsResult<DraftVersion> {
        let draft_branch = DraftBranch::generate(name)?;

        if let Some(existing) = self.model.draft_version()? {
            return Err(OpsError::DraftAlreadyExists {
                branch: existing.branch,
            });
        }

        let credentials = self.remote.credentials(explicit)?;
        let remote = self.remote.remote_state(&credentials)?;
        if let Some(existing) = remote.drafts.first() {
            return Err(OpsError::DraftAlreadyExists {
                branch: existing.branch.clone(),
            });
        }

        let published = self.model.list_published_versions()?;
        if published.iter().any(|v| v.name == name) || remote.tags.iter().any(|t| t.name == name)
        {
            return Err(OpsError::DraftNameCollision {
                name: name.to_string(),
            });
        }

        let head = self.git.head_oid()?;
        if published.is_empty() {
            let initial = self.model.get_initial_commit_oid()?;
            if head != initial || self.git.current_branch()?.is_some() {
                return Err(OpsError::NotOnNewestVersion { current: head });
            }
        } else {
            match self.model.get_current_version()? {
                CurrentVersion::Published(version) if version.newest => {}
                other => {
                    return Err(OpsError::NotOnNewestVersion {
                        current: other.name().to_string(),
                    });
                }
            }
        }

        let branch = draft_branch.branch();
        let start = self.git.peel_to_commit(&head)?;
        self.git.create_branch(&branch, &start)?;

        if let Err(err) =
            self.remote
                .push_with(&RefTarget::Branch(branch.clone()), &credentials, false)
        {
            warn!(branch = %branch, error = %err, "Push of new draft failed, removing it");
            if let Err(cleanup) = remove_local_branch(self.git, &branch) {
                warn!(branch = %branch, error = %cleanup, "Failed to remove draft branch");
            }
            return Err(err);
        }
        set_tracking_config(self.git, &branch)?;

        if checkout {
            self.git.checkout_branch(&branch, false)?;
        }

        self.remote.remember(&credentials)?;
        info!(branch = %branch, "Created draft");

        self.model
            .find_draft(&branch)?
            .ok_or(OpsError::VersionNotFound { name: branch })
    }

    /// Delete the draft on the remote, then locally.
    ///
    /// The working tree and HEAD are only touched once the remote deletion
    /// went through.
    pub fn delete_draft(&self, explicit: Option<Credentials>) -> OpsResult<DraftVersion> {
        let draft = self.model.draft_version()?.ok_or(OpsError::NoDraft)?;
        let credentials = self.remote.credentials(explicit)?;

        let remote = self.remote.remote_state(&credentials)?;
        if remote.drafts.iter().any(|d| d.branch == draft.branch) {
            self.remote
                .push_with(&RefTarget::Branch(draft.branch.clone()), &credentials, true)?;
        }

        if self.git.current_branch()?.as_deref() == Some(draft.branch.as_str()) {
            self.remote.checkout_published_or_initial(true)?;
        }
        remove_local_branch(self.git, &draft.branch)?;
        self.remote.remember(&credentials)?;
        info!(branch = %draft.branch, "Deleted draft");
        Ok(draft)
    }

    /// Turn the draft into a published version tagged on `main`.
    pub fn publish_draft(&self, explicit: Option<Credentials>) -> OpsResult<PublishedVersion> {
        let draft = self.model.draft_version()?.ok_or(OpsError::NoDraft)?;
        if !draft.has_commits() {
            return Err(OpsError::NothingToPublish {
                branch: draft.branch,
            });
        }
        if self.model.find_published(&draft.name)?.is_some() {
            return Err(OpsError::DraftNameCollision { name: draft.name });
        }

        let credentials = self.remote.credentials(explicit)?;
        let workdir = self.git.workdir().to_path_buf();

        run_with_backup(&workdir, || self.publish_steps(&draft, &credentials))?;

        self.remote.remember(&credentials)?;
        let version = self
            .model
            .find_published(&draft.name)?
            .ok_or_else(|| OpsError::VersionNotFound {
                name: draft.name.clone(),
            })?;
        info!(version = %version.name, "Published draft");
        Ok(version)
    }

    fn publish_steps(&self, draft: &DraftVersion, credentials: &ResolvedCredentials) -> OpsResult<()> {
        let outcome = self
            .git
            .merge(MAIN_BRANCH, &branch_ref(&draft.branch), &self.identity)?;
        debug!(branch = %draft.branch, outcome = ?outcome, "Merged draft into main");

        let main_oid = self.git.resolve_ref(&main_ref())?;
        self.git
            .annotated_tag(&draft.name, &main_oid, &draft.name, &self.identity)?;

        self.remote
            .push_with(&RefTarget::Branch(MAIN_BRANCH.to_string()), credentials, false)?;
        self.remote
            .push_with(&RefTarget::Tag(draft.name.clone()), credentials, false)?;
        self.remote
            .push_with(&RefTarget::Branch(draft.branch.clone()), credentials, true)?;

        self.git.checkout_detached(&main_oid, false)?;
        remove_local_branch(self.git, &draft.branch)?;
        Ok(())
    }

    /// Throw away every uncommitted change, untracked files included.
    pub fn discard_changes(&self) -> OpsResult<CurrentVersion> {
        self.git.reset_working_tree()?;
        debug!("Discarded working tree changes");
        self.model.get_current_version()
    }

    /// Commit every working tree change on the current draft.
    pub fn commit(&self, message: &str) -> OpsResult<Commit> {
        let current = self.model.get_current_version()?;
        if !current.is_draft() {
            return Err(OpsError::NotOnDraft);
        }

        let oid = self.git.commit(message, &self.identity)?;
        let record = self.git.read_commit(&oid)?;
        info!(oid = %oid, version = %current.name(), "Committed");

        Ok(Commit {
            oid: record.oid,
            message: record.message,
            author: record.author,
            in_remote: false,
        })
    }

    /// Push the current draft's commits when it is ahead of the remote.
    pub fn push_commits(&self, explicit: Option<Credentials>) -> OpsResult<PushOutcome> {
        let draft = match self.model.get_current_version()? {
            CurrentVersion::Draft(draft) => draft,
            _ if self.model.draft_version()?.is_none() => return Err(OpsError::NoDraft),
            _ => return Err(OpsError::NotOnDraft),
        };

        let ahead = match self.git.try_resolve_ref(&tracking_ref(&draft.branch))? {
            None => true,
            Some(remote_oid) if remote_oid == draft.head_oid => false,
            Some(remote_oid) => {
                let base = self
                    .git
                    .find_merge_base(&draft.head_oid, &remote_oid)?;
                base != draft.head_oid
            }
        };

        if !ahead {
            debug!(branch = %draft.branch, "Draft is not ahead of remote");
            return Ok(PushOutcome {
                branch: draft.branch,
                head_oid: draft.head_oid,
                pushed: false,
            });
        }

        self.remote
            .push_branch_or_tag(&RefTarget::Branch(draft.branch.clone()), explicit, false)?;

        Ok(PushOutcome {
            branch: draft.branch,
            head_oid: draft.head_oid,
            pushed: true,
        })
    }
}

/// Identity from the repository's git config, falling back to `config`.
fn repository_identity(git: &dyn GitPrimitives, config: &Config) -> OpsResult<Identity> {
    let fallback = config.identity();
    Ok(Identity::new(
        git.get_config("user.name")?.unwrap_or(fallback.name),
        git.get_config("user.email")?.unwrap_or(fallback.email),
    ))
}

// =============================================================================
// Clone
// =============================================================================

/// Result of cloning a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloneOutcome {
    pub repository: RepositoryRecord,
    pub path: std::path::PathBuf,
    /// The clone already existed and was left untouched.
    pub already_cloned: bool,
    pub current: CurrentVersion,
}

/// Check that `url` names a remote Tabula can talk to.
pub fn validate_remote_url(url: &str) -> OpsResult<Url> {
    let parsed = Url::parse(url.trim()).map_err(|e| OpsError::MalformedUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;

    if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(OpsError::MalformedUrl {
            url: url.to_string(),
            message: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.scheme() != "file" && parsed.host_str().is_none() {
        return Err(OpsError::MalformedUrl {
            url: url.to_string(),
            message: "missing host".to_string(),
        });
    }

    Ok(parsed)
}

/// Clone `url` into the repositories directory and land on a version.
///
/// An existing clone short-circuits to success. Any failure after the clone
/// directory was created removes it again.
pub fn clone_repository(
    url: &str,
    config: &Config,
    store: &dyn CredentialStore,
    explicit: Option<Credentials>,
) -> OpsResult<CloneOutcome> {
    validate_remote_url(url)?;

    let record = RepositoryRecord::from_remote_url(url);
    if !is_valid_repository_id(&record.id) {
        return Err(OpsError::MalformedUrl {
            url: url.to_string(),
            message: format!("cannot derive a repository id (got '{}')", record.id),
        });
    }
    let path = config.repository_path(&record.id);

    if path.join(".git").exists() {
        info!(repository = %record.id, "Repository already cloned");
        let git = GitBackend::open(&path)?;
        let model = VersionModel::new(&git, config);
        let current = model.get_current_version()?;
        return Ok(CloneOutcome {
            repository: record,
            path,
            already_cloned: true,
            current,
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let credentials = ResolvedCredentials::resolve(store, &record.id, explicit)?;
    let auth = Auth::new(credentials.as_ref().map(|c| c.credentials.clone()));

    let result = GitBackend::clone_from(url, &path, &auth)
        .map_err(OpsError::remote)
        .and_then(|git| prepare_clone(&git, config));

    match result {
        Ok(current) => {
            if let Some(credentials) = &credentials {
                credentials.remember(store, &record.id)?;
            }
            info!(repository = %record.id, version = %current, "Cloned repository");
            Ok(CloneOutcome {
                repository: record,
                path,
                already_cloned: false,
                current,
            })
        }
        Err(err) => {
            warn!(repository = %record.id, error = %err, "Clone failed, removing directory");
            remove_partial_clone(&path);
            Err(err)
        }
    }
}

fn prepare_clone(git: &GitBackend, config: &Config) -> OpsResult<CurrentVersion> {
    let identity = config.identity();
    git.set_config("user.name", &identity.name)?;
    git.set_config("user.email", &identity.email)?;

    let model = VersionModel::new(git, config);
    let initial = model.get_initial_commit_oid()?;

    for branch in git.list_remote_branches(REMOTE)? {
        if is_draft_branch(&branch) && git.try_resolve_ref(&branch_ref(&branch))?.is_none() {
            track_remote_branch(git, &branch)?;
        }
    }

    if let Some(version) = model.newest_published_version()? {
        git.checkout_detached(&version.main_commit_oid, true)?;
    } else if let Some(draft) = model.draft_version()? {
        git.checkout_branch(&draft.branch, true)?;
    } else {
        git.checkout_detached(&initial, true)?;
    }

    model.get_current_version()
}

fn remove_partial_clone(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove partial clone");
        }
    }
}
