//! Error types for the operations layer.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tabula_core::DraftNameError;
use tabula_git::GitError;
use thiserror::Error;

/// Result type for operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Errors that can occur during operations.
#[derive(Debug, Error)]
pub enum OpsError {
    /// The remote URL could not be parsed.
    #[error("Malformed repository URL {url}: {message}")]
    MalformedUrl { url: String, message: String },

    /// No clone exists for the repository.
    #[error("No repository found at {path}")]
    RepositoryNotFound { path: PathBuf },

    /// The id does not name a directory inside the repositories directory.
    #[error("Invalid repository id: {id}")]
    InvalidRepositoryId { id: String },

    /// The repository does not follow the `INITIAL_COMMIT` convention.
    #[error("Repository is not initialized: {message}")]
    RepositoryNotInitialized { message: String },

    #[error("Version not found: {name}")]
    VersionNotFound { name: String },

    #[error("Invalid draft name: {0}")]
    InvalidDraftName(#[from] DraftNameError),

    /// A draft already exists locally or on the remote.
    #[error("A draft already exists: {branch}")]
    DraftAlreadyExists { branch: String },

    /// The requested draft name is already taken by a published version.
    #[error("A published version named {name} already exists")]
    DraftNameCollision { name: String },

    #[error("There is no draft")]
    NoDraft,

    #[error("Current version is not a draft")]
    NotOnDraft,

    /// Drafts can only be created from the newest published version.
    #[error("Current version {current} is not the newest published version")]
    NotOnNewestVersion { current: String },

    #[error("Draft {branch} has no commits to publish")]
    NothingToPublish { branch: String },

    #[error("Nothing to commit")]
    NothingToCommit,

    #[error("Merging {theirs} into {ours} produced conflicts")]
    MergeConflict { ours: String, theirs: String },

    /// Switching versions would overwrite local modifications.
    #[error("Uncommitted changes would be overwritten by checking out {target}")]
    UncommittedChanges { target: String },

    #[error("No credentials provided")]
    NoCredentialsProvided,

    #[error("Authentication failed with the provided credentials: {message}")]
    AuthFailed { message: String },

    #[error("Could not connect to remote: {message}")]
    Connection { message: String },

    /// Any other failure while talking to the remote.
    #[error("Remote operation failed: {message}")]
    RemoteOperation { message: String },

    /// HEAD does not resolve to any known version.
    #[error("Could not find current version for HEAD at {head}")]
    CouldNotFindCurrentVersion { head: String },

    /// Zero or several published versions point at the tip of `main`.
    #[error("Could not determine the newest published version ({matches} candidates)")]
    AmbiguousNewestVersion { matches: usize },

    /// A draft forks from neither a published version nor the initial commit.
    #[error("Draft {branch} has no resolvable base (merge base {base_oid})")]
    DraftWithoutBase { branch: String, base_oid: String },

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git error: {0}")]
    Git(GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {message}")]
    WithContext { context: String, message: String },
}

impl OpsError {
    /// Create a new error with additional context.
    pub fn with_context(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Map an error raised while talking to the remote; plain Git failures
    /// become [`OpsError::RemoteOperation`].
    pub fn remote(err: GitError) -> Self {
        match err {
            GitError::Git(e) => Self::RemoteOperation {
                message: e.message().to_string(),
            },
            GitError::NotFound(what) => Self::RemoteOperation {
                message: format!("not found: {}", what),
            },
            GitError::Io(e) => Self::RemoteOperation {
                message: e.to_string(),
            },
            other => other.into(),
        }
    }

    /// The closed error kind reported to callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::MalformedUrl { .. } => ErrorKind::MalformedUrl,
            OpsError::RepositoryNotFound { .. } => ErrorKind::RepositoryNotFound,
            OpsError::InvalidRepositoryId { .. } => ErrorKind::RepositoryNotFound,
            OpsError::RepositoryNotInitialized { .. } => ErrorKind::RepositoryNotInitialized,
            OpsError::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            OpsError::InvalidDraftName(_) => ErrorKind::InvalidDraftName,
            OpsError::DraftAlreadyExists { .. } => ErrorKind::DraftAlreadyExists,
            OpsError::DraftNameCollision { .. } => ErrorKind::DraftNameCollision,
            OpsError::NoDraft => ErrorKind::NoDraft,
            OpsError::NotOnDraft => ErrorKind::NotOnDraft,
            OpsError::NotOnNewestVersion { .. } => ErrorKind::NotOnNewestVersion,
            OpsError::NothingToPublish { .. } => ErrorKind::NothingToPublish,
            OpsError::NothingToCommit => ErrorKind::NothingToCommit,
            OpsError::MergeConflict { .. } => ErrorKind::MergeConflict,
            OpsError::UncommittedChanges { .. } => ErrorKind::UncommittedChanges,
            OpsError::NoCredentialsProvided => ErrorKind::NoCredentialsProvided,
            OpsError::AuthFailed { .. } => ErrorKind::AuthFailedWithProvidedCredentials,
            OpsError::Connection { .. } => ErrorKind::ConnectionError,
            OpsError::RemoteOperation { .. } => ErrorKind::UnknownRemoteOperationError,
            OpsError::CouldNotFindCurrentVersion { .. } => ErrorKind::CouldNotFindCurrentVersion,
            OpsError::AmbiguousNewestVersion { .. } => ErrorKind::Unknown,
            OpsError::DraftWithoutBase { .. } => ErrorKind::Internal,
            OpsError::CredentialStore(_) => ErrorKind::CredentialStore,
            OpsError::Config(_) => ErrorKind::Config,
            OpsError::Git(_) => ErrorKind::Internal,
            OpsError::Io(_) => ErrorKind::Io,
            OpsError::Json(_) => ErrorKind::Internal,
            OpsError::WithContext { .. } => ErrorKind::Unknown,
        }
    }
}

impl From<GitError> for OpsError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::CredentialsRequired => OpsError::NoCredentialsProvided,
            GitError::AuthRejected { message } => OpsError::AuthFailed { message },
            GitError::Connection { message } => OpsError::Connection { message },
            GitError::PushRejected { refspec, message } => OpsError::RemoteOperation {
                message: format!("push of {} rejected: {}", refspec, message),
            },
            GitError::MergeConflict { ours, theirs } => OpsError::MergeConflict { ours, theirs },
            GitError::CheckoutConflict { target } => OpsError::UncommittedChanges { target },
            GitError::NothingToCommit => OpsError::NothingToCommit,
            GitError::Io(e) => OpsError::Io(e),
            other => OpsError::Git(other),
        }
    }
}

// =============================================================================
// Error Kinds
// =============================================================================

/// Closed set of error kinds surfaced across the operations boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MalformedUrl,
    RepositoryNotFound,
    RepositoryNotInitialized,
    VersionNotFound,
    InvalidDraftName,
    DraftAlreadyExists,
    DraftNameCollision,
    NoDraft,
    NotOnDraft,
    NotOnNewestVersion,
    NothingToPublish,
    NothingToCommit,
    MergeConflict,
    UncommittedChanges,
    NoCredentialsProvided,
    AuthFailedWithProvidedCredentials,
    ConnectionError,
    UnknownRemoteOperationError,
    CouldNotFindCurrentVersion,
    Unknown,
    Internal,
    CredentialStore,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MalformedUrl => "MALFORMED_URL",
            ErrorKind::RepositoryNotFound => "REPOSITORY_NOT_FOUND",
            ErrorKind::RepositoryNotInitialized => "REPOSITORY_NOT_INITIALIZED",
            ErrorKind::VersionNotFound => "VERSION_NOT_FOUND",
            ErrorKind::InvalidDraftName => "INVALID_DRAFT_NAME",
            ErrorKind::DraftAlreadyExists => "DRAFT_ALREADY_EXISTS",
            ErrorKind::DraftNameCollision => "DRAFT_NAME_COLLISION",
            ErrorKind::NoDraft => "NO_DRAFT",
            ErrorKind::NotOnDraft => "NOT_ON_DRAFT",
            ErrorKind::NotOnNewestVersion => "NOT_ON_NEWEST_VERSION",
            ErrorKind::NothingToPublish => "NOTHING_TO_PUBLISH",
            ErrorKind::NothingToCommit => "NOTHING_TO_COMMIT",
            ErrorKind::MergeConflict => "MERGE_CONFLICT",
            ErrorKind::UncommittedChanges => "UNCOMMITTED_CHANGES",
            ErrorKind::NoCredentialsProvided => "NO_CREDENTIALS_PROVIDED",
            ErrorKind::AuthFailedWithProvidedCredentials => {
                "AUTH_FAILED_WITH_PROVIDED_CREDENTIALS"
            }
            ErrorKind::ConnectionError => "CONNECTION_ERROR",
            ErrorKind::UnknownRemoteOperationError => "UNKNOWN_REMOTE_OPERATION_ERROR",
            ErrorKind::CouldNotFindCurrentVersion => "COULD_NOT_FIND_CURRENT_VERSION",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::CredentialStore => "CREDENTIAL_STORE",
            ErrorKind::Config => "CONFIG",
            ErrorKind::Io => "IO",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Tagged success/error value handed across the operations boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success {
        data: T,
    },
    Error {
        #[serde(rename = "type")]
        kind: ErrorKind,
        message: String,
    },
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Error kind, if this is a failure.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Error { kind, .. } => Some(*kind),
        }
    }
}

impl<T> From<OpsResult<T>> for Outcome<T> {
    fn from(result: OpsResult<T>) -> Self {
        match result {
            Ok(data) => Outcome::Success { data },
            Err(err) => Outcome::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_errors_map_to_kinds() {
        let cases = [
            (GitError::CredentialsRequired, ErrorKind::NoCredentialsProvided),
            (
                GitError::AuthRejected {
                    message: "401".into(),
                },
                ErrorKind::AuthFailedWithProvidedCredentials,
            ),
            (
                GitError::Connection {
                    message: "refused".into(),
                },
                ErrorKind::ConnectionError,
            ),
            (
                GitError::PushRejected {
                    refspec: "refs/heads/main:refs/heads/main".into(),
                    message: "non-fast-forward".into(),
                },
                ErrorKind::UnknownRemoteOperationError,
            ),
            (GitError::NothingToCommit, ErrorKind::NothingToCommit),
            (GitError::NotFound("x".into()), ErrorKind::Internal),
        ];

        for (err, kind) in cases {
            assert_eq!(OpsError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_remote_mapping_turns_git_errors_into_remote_failures() {
        let err = OpsError::remote(GitError::NotFound("origin".into()));
        assert_eq!(err.kind(), ErrorKind::UnknownRemoteOperationError);

        let err = OpsError::remote(GitError::CredentialsRequired);
        assert_eq!(err.kind(), ErrorKind::NoCredentialsProvided);
    }

    #[test]
    fn test_outcome_serialization() {
        let ok: Outcome<u32> = Ok(3).into();
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({"status": "success", "data": 3})
        );

        let err: Outcome<u32> = Err(OpsError::NoDraft).into();
        assert_eq!(err.error_kind(), Some(ErrorKind::NoDraft));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"status": "error", "type": "NO_DRAFT", "message": "There is no draft"})
        );
    }

    #[test]
    fn test_kind_strings_match_serde() {
        let kind = ErrorKind::AuthFailedWithProvidedCredentials;
        assert_eq!(
            serde_json::to_value(kind).unwrap(),
            serde_json::Value::String(kind.as_str().to_string())
        );
    }
}
