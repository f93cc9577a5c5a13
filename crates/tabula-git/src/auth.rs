//! Credential callbacks for network operations.

use std::cell::{Cell, RefCell};

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use tabula_core::Credentials;
use tracing::debug;

use crate::GitError;

/// Kind of credential handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOffer {
    UserPass,
    SshKey,
    Username,
    Default,
}

impl CredentialOffer {
    /// The offer answering a request for `allowed`.
    pub fn for_allowed(allowed: CredentialType) -> Self {
        if allowed.is_user_pass_plaintext() {
            CredentialOffer::UserPass
        } else if allowed.is_ssh_key() {
            CredentialOffer::SshKey
        } else if allowed.is_username() {
            CredentialOffer::Username
        } else {
            CredentialOffer::Default
        }
    }
}

/// Next credential to offer, or `None` when the same kind was already
/// offered and the remote asked again, i.e. rejected it.
pub fn next_offer(offered: &[CredentialOffer], allowed: CredentialType) -> Option<CredentialOffer> {
    let offer = CredentialOffer::for_allowed(allowed);
    if offered.contains(&offer) {
        None
    } else {
        Some(offer)
    }
}

/// Credential session for a single network operation.
///
/// Each kind of credential is offered once. A repeated request for a kind
/// already offered means the remote rejected it, so the callback cancels the
/// operation instead of looping; a request with no credentials available
/// cancels as well.
#[derive(Debug)]
pub struct Auth {
    credentials: Option<Credentials>,
    attempts: Cell<u32>,
    offered: RefCell<Vec<CredentialOffer>>,
    missing: Cell<bool>,
    rejected: Cell<bool>,
}

impl Auth {
    /// Session offering the given credentials.
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            attempts: Cell::new(0),
            offered: RefCell::new(Vec::new()),
            missing: Cell::new(false),
            rejected: Cell::new(false),
        }
    }

    /// Session without credentials; works for remotes that never ask.
    pub fn anonymous() -> Self {
        Self::new(None)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Number of times the transport asked for credentials.
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// Build the libgit2 callbacks for this session.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed| {
            let attempt = self.attempts.get() + 1;
            self.attempts.set(attempt);

            let Some(credentials) = self.credentials.as_ref() else {
                debug!(url, "Remote requested credentials but none are available");
                self.missing.set(true);
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "no credentials provided",
                ));
            };

            let Some(offer) = next_offer(&self.offered.borrow(), allowed) else {
                debug!(url, attempt, "Remote rejected credentials, cancelling");
                self.rejected.set(true);
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "credentials rejected by remote",
                ));
            };
            self.offered.borrow_mut().push(offer);

            match offer {
                CredentialOffer::UserPass => {
                    Cred::userpass_plaintext(&credentials.username, &credentials.password)
                }
                CredentialOffer::SshKey => {
                    let user = username_from_url.unwrap_or(&credentials.username);
                    Cred::ssh_key_from_agent(user)
                }
                CredentialOffer::Username => Cred::username(&credentials.username),
                CredentialOffer::Default => Cred::default(),
            }
        });
        callbacks
    }

    /// Translate a failed network call into a [`GitError`].
    pub fn classify(&self, err: git2::Error) -> GitError {
        if self.missing.get() {
            return GitError::CredentialsRequired;
        }
        if self.rejected.get() {
            return GitError::AuthRejected {
                message: err.message().to_string(),
            };
        }

        let message = err.message().to_string();
        if err.code() == ErrorCode::Auth
            || (err.class() == ErrorClass::Http && looks_like_auth_status(&message))
        {
            return if self.credentials.is_some() {
                GitError::AuthRejected { message }
            } else {
                GitError::CredentialsRequired
            };
        }

        match err.class() {
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Ssl => {
                GitError::Connection { message }
            }
            _ => GitError::Git(err),
        }
    }
}

fn looks_like_auth_status(message: &str) -> bool {
    message.contains("401") || message.contains("403") || message.contains("authentication")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_username_then_key_is_not_a_rejection() {
        let mut offered = Vec::new();

        let first = next_offer(&offered, CredentialType::USERNAME).unwrap();
        assert_eq!(first, CredentialOffer::Username);
        offered.push(first);

        let second = next_offer(&offered, CredentialType::SSH_KEY).unwrap();
        assert_eq!(second, CredentialOffer::SshKey);
        offered.push(second);

        assert_eq!(next_offer(&offered, CredentialType::SSH_KEY), None);
    }

    #[test]
    fn test_repeated_userpass_request_is_a_rejection() {
        let allowed = CredentialType::USER_PASS_PLAINTEXT | CredentialType::SSH_KEY;
        let first = next_offer(&[], allowed).unwrap();
        assert_eq!(first, CredentialOffer::UserPass);
        assert_eq!(next_offer(&[first], allowed), None);
    }

    #[test]
    fn test_classify_network_error() {
        let auth = Auth::new(Some(Credentials::new("alice", "token")));
        let err = git2::Error::new(ErrorCode::GenericError, ErrorClass::Net, "connection refused");
        assert!(matches!(auth.classify(err), GitError::Connection { .. }));
    }

    #[test]
    fn test_classify_auth_status_without_credentials() {
        let auth = Auth::anonymous();
        let err = git2::Error::new(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 401",
        );
        assert!(matches!(auth.classify(err), GitError::CredentialsRequired));
    }

    #[test]
    fn test_classify_auth_status_with_credentials() {
        let auth = Auth::new(Some(Credentials::new("alice", "wrong")));
        let err = git2::Error::new(
            ErrorCode::GenericError,
            ErrorClass::Http,
            "unexpected http status code: 403",
        );
        assert!(matches!(auth.classify(err), GitError::AuthRejected { .. }));
    }

    #[test]
    fn test_classify_other_errors_pass_through() {
        let auth = Auth::anonymous();
        let err = git2::Error::new(ErrorCode::NotFound, ErrorClass::Reference, "no such ref");
        assert!(matches!(auth.classify(err), GitError::Git(_)));
    }
}
