//! Tabula Operations Layer
//!
//! Maps a draft/published version model onto a Git repository and keeps it
//! in sync with a single remote.
//!
//! ## Architecture
//!
//! - **VersionModel**: read-only queries deriving versions from refs
//! - **RemoteSyncEngine**: remote diffing, fetch/pull/push with backup and restore
//! - **VersionLifecycle**: clone, switch, draft create/delete/publish, commit, push
//! - **OpsContext**: async entry point taking typed requests and returning
//!   typed responses
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tabula_ops::{CloneRequest, Config, OpsContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = OpsContext::new(Config::load()?);
//!
//!     let cloned = ctx
//!         .clone_repository(CloneRequest::new("https://example.org/team/tables.git"))
//!         .await?;
//!
//!     println!("{} is on {}", cloned.repository.name, cloned.current);
//!     Ok(())
//! }
//! ```

mod backup;
mod config;
mod context;
mod credentials;
mod error;
mod lifecycle;
mod model;
mod remote;
mod requests;
mod responses;

// Re-export public API
pub use backup::{copy_dir, run_with_backup, Backup};
pub use config::Config;
pub use context::OpsContext;
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, ResolvedCredentials,
};
pub use error::{ErrorKind, OpsError, OpsResult, Outcome};
pub use lifecycle::{
    clone_repository, validate_remote_url, CloneOutcome, PushOutcome, VersionLifecycle,
};
pub use model::{selector_ref, VersionModel, MAIN_BRANCH, REMOTE};
pub use remote::{diff_remote_state, RefTarget, RemoteState, RemoteSyncEngine};
pub use requests::*;
pub use responses::*;
