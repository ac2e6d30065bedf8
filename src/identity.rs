// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Commit author identity.
//!
//! Synthetic commits are attributed to an explicit identity. The identity can
//! be supplied directly by the user, or resolved from Git's own `user.name`
//! and `user.email` configuration through an [`IdentityProvider`].

use crate::stamp::Stamp;

use git2::{Config, Signature, Time};

/// Name and email of a commit author.
///
/// Either part may be missing. A commit can only be created once both parts
/// are known.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Identity {
    /// Construct new identity.
    pub fn new(name: Option<String>, email: Option<String>) -> Self {
        Self { name, email }
    }

    /// Fill missing parts from `fallback`.
    pub fn or(self, fallback: Identity) -> Self {
        Self {
            name: self.name.or(fallback.name),
            email: self.email.or(fallback.email),
        }
    }

    /// Build libgit2 signature stamped at `stamp`.
    ///
    /// # Errors
    ///
    /// - Return [`IdentityError::Incomplete`] if name or email is missing.
    /// - Return [`IdentityError::Git2`] if libgit2 rejects the signature.
    pub fn signature(&self, stamp: &Stamp) -> Result<Signature<'static>> {
        match (&self.name, &self.email) {
            (Some(name), Some(email)) => {
                Ok(Signature::new(name, email, &Time::new(stamp.unix(), 0))?)
            }
            _ => Err(IdentityError::Incomplete),
        }
    }
}

/// Resolve default author identity.
pub trait IdentityProvider {
    /// Resolve whatever parts of the identity are known.
    fn resolve(&self) -> Identity;
}

/// Identity fixed up front.
#[derive(Debug, Default, Clone)]
pub struct FixedIdentity(pub Identity);

impl IdentityProvider for FixedIdentity {
    fn resolve(&self) -> Identity {
        self.0.clone()
    }
}

/// Identity read from Git configuration.
///
/// Looks up `user.name` and `user.email` through the given configuration
/// snapshot, which normally is the repository's configuration so local
/// overrides win over global ones.
pub struct GitConfigIdentity {
    config: Config,
}

impl GitConfigIdentity {
    /// Construct new Git configuration identity provider.
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl IdentityProvider for GitConfigIdentity {
    fn resolve(&self) -> Identity {
        Identity {
            name: self.config.get_string("user.name").ok(),
            email: self.config.get_string("user.email").ok(),
        }
    }
}

/// Identity error types.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Name or email is missing.
    #[error("author identity incomplete, set --author-name and --author-email or configure git")]
    Incomplete,

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

/// Friendly result alias :3
type Result<T, E = IdentityError> = std::result::Result<T, E>;
