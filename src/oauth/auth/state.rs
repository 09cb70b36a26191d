//! Anti-forgery state for in-progress authorizations.
//!
//! A state token is issued by [`generate_state`] when an authorization URL is
//! built and recorded in [`PendingAuthorizations`]. The callback is accepted
//! only if it carries a recorded, unexpired token, which is consumed on use.
//!
//! ```rust
//! use std::time::Duration;
//! use oauth2client::oauth::auth::state::{generate_state, PendingAuthorizations};
//!
//! let mut pending = PendingAuthorizations::new(Duration::from_secs(600));
//! let state = generate_state();
//! pending.begin(state.clone());
//!
//! assert!(pending.consume(&state));
//! // Single use
//! assert!(!pending.consume(&state));
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;

/// How long an issued state stays valid by default.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Generate a random state parameter for CSRF protection.
///
/// 16 random bytes encoded as base64url without padding (22 characters).
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issued state tokens awaiting their callback.
///
/// Only one authorization is in flight at a time: [`begin`](Self::begin)
/// discards anything issued earlier.
#[derive(Debug)]
pub struct PendingAuthorizations {
    ttl: Duration,
    issued: HashMap<String, Instant>,
}

impl Default for PendingAuthorizations {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl PendingAuthorizations {
    /// Create an empty set whose tokens expire after `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: HashMap::new(),
        }
    }

    /// Lifetime of an issued token.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record `state` as the one pending expectation.
    pub fn begin(&mut self, state: String) {
        self.issued.clear();
        self.issued.insert(state, Instant::now());
    }

    /// Consume `state` if it was issued and has not expired.
    ///
    /// The token is removed whether or not it was still valid, so a second
    /// call with the same value always returns `false`.
    pub fn consume(&mut self, state: &str) -> bool {
        match self.issued.remove(state) {
            Some(issued_at) => issued_at.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Drop expired tokens.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.issued.retain(|_, issued_at| issued_at.elapsed() < ttl);
    }

    /// Number of tokens still recorded, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Check if no token is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}
