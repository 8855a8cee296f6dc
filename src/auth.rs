//! Basic Auth credential generation
//!
//! Secure deploys hand the deploy script an htpasswd style `user:hash`
//! string which the reverse proxy in front of the deployed app uses to gate
//! access. Traefik and Apache expect the legacy `$2y$` bcrypt marker, so the
//! hash is formatted with that version rather than the modern `$2b$`.

use crate::error::AuthError;
use bcrypt::Version;

/// Work factor for password hashing. Fixed, not caller-configurable.
const BCRYPT_COST: u32 = 12;

/// Generate a `username:hash` Basic Auth credential.
///
/// A fresh random salt is drawn on every call, so two calls with identical
/// inputs produce different credentials. Fails only if the hashing
/// primitive itself fails.
pub fn basic_auth_credential(username: &str, password: &str) -> Result<String, AuthError> {
    let hash = bcrypt::hash_with_result(password, BCRYPT_COST)?.format_for_version(Version::TwoY);
    Ok(format!("{}:{}", username, hash))
}
