//! Polygon WebSocket Authentication
//!
//! Tracks the authentication handshake for one connection.
//!
//! # Authentication Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Server sends `[{"ev":"status","status":"connected",...}]`
//! 3. Client sends `{"action":"auth","params":"<key>"}`
//! 4. Server sends `[{"ev":"status","status":"auth_success",...}]`
//!
//! Any other status received while authenticating is a rejection. A
//! connection is only handed to the data loop after step 4.

use std::time::Duration;

use thiserror::Error;

use super::messages::{ControlRequest, StatusKind, StatusMessage};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during authentication.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Credentials were rejected or the server answered with a non-success
    /// status.
    #[error("authentication rejected ({status}): {message}")]
    Rejected {
        /// Status code from the server.
        status: String,
        /// Detail from the server.
        message: String,
    },

    /// No acknowledgment arrived within the allowed window.
    #[error("authentication timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid credentials supplied locally.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

// =============================================================================
// Authentication State
// =============================================================================

/// Current state of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Socket not yet open.
    #[default]
    Disconnected,
    /// Greeting received.
    Connected,
    /// Auth request sent, awaiting acknowledgment.
    Authenticating,
    /// Acknowledged.
    Authenticated,
    /// Rejected.
    Failed,
}

/// Outcome of feeding one status message to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProgress {
    /// Keep waiting.
    Pending,
    /// Authentication succeeded.
    Authenticated,
}

// =============================================================================
// Credentials
// =============================================================================

/// Polygon API key. `Debug` redacts the value.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self, AuthError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AuthError::InvalidCredentials(
                "API key cannot be empty".to_string(),
            ));
        }
        Ok(Self { api_key })
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authentication Handler
// =============================================================================

/// Authentication state machine for a single connection.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler in the `Disconnected` state.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Disconnected,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Build the auth request and move to `Authenticating`.
    #[must_use]
    pub fn create_auth_request(&mut self) -> ControlRequest {
        self.state = AuthState::Authenticating;
        ControlRequest::auth(self.credentials.api_key())
    }

    /// Process a status message received during the handshake.
    ///
    /// The `connected` greeting is informational. `auth_success` completes
    /// the handshake. Every other status is a rejection.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Rejected`] for any non-success acknowledgment.
    pub fn on_status(&mut self, status: &StatusMessage) -> Result<AuthProgress, AuthError> {
        match status.kind() {
            StatusKind::Connected => {
                if self.state == AuthState::Disconnected {
                    self.state = AuthState::Connected;
                }
                Ok(AuthProgress::Pending)
            }
            StatusKind::AuthSuccess => {
                self.state = AuthState::Authenticated;
                Ok(AuthProgress::Authenticated)
            }
            _ => {
                self.state = AuthState::Failed;
                Err(AuthError::Rejected {
                    status: status.status.clone(),
                    message: status.message.clone(),
                })
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
