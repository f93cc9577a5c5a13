//! OpsContext - The main service for executing operations.
//!
//! The OpsContext holds configuration and the credential store and exposes
//! every version operation. Operations on the same repository must be
//! serialized by the caller; different repositories are independent.

use std::path::PathBuf;
use std::sync::Arc;

use tabula_core::{
    is_valid_repository_id, Commit, CurrentVersion, DraftVersion, PublishedVersion,
    RemoteRepositoryChanges, VersionSelector,
};
use tabula_git::{GitBackend, GitPrimitives};
use tracing::{debug, info};

use crate::config::Config;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::error::{OpsError, OpsResult};
use crate::lifecycle::{clone_repository, CloneOutcome, PushOutcome, VersionLifecycle};
use crate::model::selector_ref;
use crate::requests::*;
use crate::responses::*;

/// The main operations context.
#[derive(Clone)]
pub struct OpsContext {
    /// Configuration for operations.
    pub config: Config,
    credentials: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for OpsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpsContext {
    /// Create a context storing credentials in the configured JSON file.
    pub fn new(config: Config) -> Self {
        let store = FileCredentialStore::new(config.credentials_file.clone());
        Self::with_credential_store(config, Arc::new(store))
    }

    /// Create a context with a caller-provided credential store.
    pub fn with_credential_store(config: Config, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            config,
            credentials,
        }
    }

    /// Create a new OpsContext with the configuration loaded from disk.
    pub fn default_config() -> OpsResult<Self> {
        Ok(Self::new(Config::load()?))
    }

    pub fn credential_store(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    /// Location of the clone for `repository`.
    pub fn repository_path(&self, repository: &str) -> PathBuf {
        self.config.repository_path(repository)
    }

    fn open(&self, repository: &str) -> OpsResult<GitBackend> {
        if !is_valid_repository_id(repository) {
            return Err(OpsError::InvalidRepositoryId {
                id: repository.to_string(),
            });
        }
        let path = self.repository_path(repository);
        if !path.join(".git").exists() {
            return Err(OpsError::RepositoryNotFound { path });
        }
        debug!(repository, path = %path.display(), "Opening repository");
        Ok(GitBackend::open(&path)?)
    }

    fn lifecycle<'a>(
        &'a self,
        git: &'a GitBackend,
        repository: &'a str,
    ) -> OpsResult<VersionLifecycle<'a>> {
        VersionLifecycle::new(git, &self.config, self.credentials.as_ref(), repository)
    }

    // =========================================================================
    // Repositories
    // =========================================================================

    /// Clone a remote repository, or report the existing clone.
    pub async fn clone_repository(&self, request: CloneRequest) -> OpsResult<CloneOutcome> {
        clone_repository(
            &request.url,
            &self.config,
            self.credentials.as_ref(),
            request.credentials,
        )
    }

    /// Repositories present in the repositories directory.
    pub async fn list_repositories(&self) -> OpsResult<Vec<RepositoryEntry>> {
        let dir = &self.config.repositories_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.join(".git").exists() {
                continue;
            }
            let Some(id) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if id.ends_with(".backup") {
                continue;
            }
            let remote_url = GitBackend::open(&path)
                .ok()
                .and_then(|git| git.get_config("remote.origin.url").ok().flatten());
            entries.push(RepositoryEntry {
                id,
                path,
                remote_url,
            });
        }

        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    /// Forget the stored credentials of a repository.
    pub async fn forget_credentials(&self, request: RepositoryRequest) -> OpsResult<()> {
        self.credentials.delete(&request.repository)?;
        info!(repository = %request.repository, "Removed stored credentials");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn versions(&self, request: RepositoryRequest) -> OpsResult<VersionsResponse> {
        let git = self.open(&request.repository)?;
        let lifecycle = self.lifecycle(&git, &request.repository)?;
        let model = lifecycle.model();

        Ok(VersionsResponse {
            published: model.list_published_versions()?,
            draft: model.draft_version()?,
        })
    }

    pub async fn current_version(&self, request: RepositoryRequest) -> OpsResult<CurrentVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .model()
            .get_current_version()
    }

    /// Table changes between versions, or against the working tree.
    pub async fn compare(&self, request: CompareRequest) -> OpsResult<CompareResponse> {
        let git = self.open(&request.repository)?;
        let lifecycle = self.lifecycle(&git, &request.repository)?;
        let model = lifecycle.model();

        let (from, from_ref) = match &request.from {
            Some(selector) => (selector.to_string(), selector_ref(selector)),
            None => (
                model.get_current_version()?.name().to_string(),
                "HEAD".to_string(),
            ),
        };
        let to_ref = request.to.as_ref().map(selector_ref);

        let changes = model.compare_versions(&from_ref, to_ref.as_deref())?;
        Ok(CompareResponse {
            from,
            to: request.to.map(|s| s.to_string()),
            changes,
        })
    }

    pub async fn history(&self, request: HistoryRequest) -> OpsResult<HistoryResponse> {
        let git = self.open(&request.repository)?;
        let lifecycle = self.lifecycle(&git, &request.repository)?;
        let model = lifecycle.model();

        let version = match request.version {
            Some(selector) => selector,
            None => match model.get_current_version()? {
                CurrentVersion::Published(version) => VersionSelector::published(version.name),
                CurrentVersion::Draft(draft) => VersionSelector::draft(draft.branch),
                CurrentVersion::Initial { .. } => {
                    return Ok(HistoryResponse {
                        version: "INITIAL".to_string(),
                        commits: model.initial_history()?,
                    });
                }
            },
        };
        let commits = model.history(&version)?;
        Ok(HistoryResponse {
            version: version.to_string(),
            commits,
        })
    }

    pub async fn status(&self, request: RepositoryRequest) -> OpsResult<StatusResponse> {
        let git = self.open(&request.repository)?;
        let lifecycle = self.lifecycle(&git, &request.repository)?;
        let model = lifecycle.model();

        let current = model.get_current_version()?;
        let changes = model.compare_versions("HEAD", None)?;
        Ok(StatusResponse {
            repository: request.repository.clone(),
            path: git.workdir().to_path_buf(),
            current,
            draft: model.draft_version()?,
            changes,
        })
    }

    // =========================================================================
    // Version Operations
    // =========================================================================

    pub async fn switch_version(&self, request: SwitchRequest) -> OpsResult<CurrentVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .switch_version(&request.target)
    }

    pub async fn create_draft(&self, request: CreateDraftRequest) -> OpsResult<DraftVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?.create_draft(
            &request.name,
            request.credentials,
            request.checkout,
        )
    }

    pub async fn delete_draft(&self, request: RemoteRequest) -> OpsResult<DraftVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .delete_draft(request.credentials)
    }

    pub async fn publish_draft(&self, request: RemoteRequest) -> OpsResult<PublishedVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .publish_draft(request.credentials)
    }

    pub async fn discard_changes(&self, request: RepositoryRequest) -> OpsResult<CurrentVersion> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?.discard_changes()
    }

    pub async fn commit(&self, request: CommitRequest) -> OpsResult<Commit> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .commit(&request.message)
    }

    pub async fn push_commits(&self, request: RemoteRequest) -> OpsResult<PushOutcome> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .push_commits(request.credentials)
    }

    // =========================================================================
    // Remote Sync
    // =========================================================================

    pub async fn remote_changes(
        &self,
        request: RemoteRequest,
    ) -> OpsResult<RemoteRepositoryChanges> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .remote()
            .compute_remote_changes(request.credentials)
    }

    pub async fn fetch(&self, request: RemoteRequest) -> OpsResult<()> {
        let git = self.open(&request.repository)?;
        self.lifecycle(&git, &request.repository)?
            .remote()
            .fetch(request.credentials)
    }

    pub async fn pull(&self, request: RemoteRequest) -> OpsResult<PullResponse> {
        let git = self.open(&request.repository)?;
        let lifecycle = self.lifecycle(&git, &request.repository)?;

        let changes = lifecycle.remote().pull(request.credentials)?;
        let current = lifecycle.model().get_current_version()?;
        Ok(PullResponse { changes, current })
    }
}
