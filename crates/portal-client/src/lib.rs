// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Session credentials and authentication for the interactive registry portal
//!
//! The portal has no public API; a session is established by an interactive
//! login performed outside this workspace. This crate provides the seam that
//! login sits behind, and the types that cross it.
//!
//! # Core Abstractions
//!
//! - **`Authenticator` Trait**: Produces one set of [`Credentials`] per call
//! - **`Credentials`**: Cookie set plus anti-forgery token, never mutated after creation
//! - **`PresetAuthenticator`**: Serves session material transferred in through configuration
//! - **Health Check System**: Status reporting for the session pool and fallback sources

use thiserror::Error;

pub mod credentials;
pub mod health;
pub mod preset;

pub use credentials::*;
pub use health::*;
pub use preset::PresetAuthenticator;

/// Source of authenticated portal sessions
///
/// Implementations are called sequentially, never concurrently for several
/// sessions, and only while a pool is bootstrapping or refreshing.
pub trait Authenticator: Send + Sync {
    /// Establish a new session
    ///
    /// # Errors
    ///
    /// Returns an error if the portal rejected the login, the session material is
    /// incomplete, or the automation behind the login failed
    fn authenticate(&self) -> impl Future<Output = Result<Credentials, AuthError>> + Send;

    /// Release any resources held for a session that is being closed
    fn release(&self, _credentials: &Credentials) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Get the name of this authenticator
    fn name(&self) -> &'static str;
}

/// Errors that can occur while establishing a portal session
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AuthError {
    /// Portal rejected the login
    #[error("Login rejected: {message}")]
    Rejected { message: String },

    /// Session material is missing cookies or token
    #[error("Incomplete credentials: {message}")]
    IncompleteCredentials { message: String },

    /// Login did not finish in time
    #[error("Authentication timeout after {timeout_seconds} seconds")]
    Timeout { timeout_seconds: u64 },

    /// Automation behind the login failed
    #[error(transparent)]
    Automation { error: anyhow::Error },
}
