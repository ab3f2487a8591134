//! Handshake authentication.
//!
//! Every connection must present a signed JWT, carried in a cookie
//! (`chattu-token` by default) or as a Bearer header. The token subject is
//! resolved to a full [`UserIdentity`] through the [`UserDirectory`]
//! collaborator before the connection is admitted. No anonymous
//! connections exist past the handshake.

mod authenticator;
mod claims;
mod directory;
mod jwt;

pub use authenticator::ConnectionAuthenticator;
pub use claims::Claims;
pub use directory::{PostgresUserDirectory, StaticUserDirectory, UserDirectory};
pub use jwt::TokenValidator;

use serde::{Deserialize, Serialize};

/// The resolved, authenticated user a connection belongs to.
///
/// Created by the external auth system, immutable for the lifetime of a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}
