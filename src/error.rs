//! Typed errors for the sidecar
//!
//! Everything subprocess-related is normalized into an `ExecutionResult` at
//! the gateway boundary, so the only fault that needs a type of its own is
//! credential generation.

use thiserror::Error;

/// Failure while generating Basic Auth credential material
#[derive(Debug, Error)]
pub enum AuthError {
    /// The underlying hashing primitive failed
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}
