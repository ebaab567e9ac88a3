//! Round-robin API key rotation.
//!
//! A rotator is created once per provider and shared as `Arc<CredentialRotator>`
//! by every worker that calls that provider.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credentials configured for '{0}'")]
    Empty(String),
}

/// Hands out credentials from an ordered pool in strict rotation.
pub struct CredentialRotator {
    name: String,
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl CredentialRotator {
    /// Build a rotator; blank keys are dropped and an empty pool is rejected.
    pub fn new(name: impl Into<String>, keys: Vec<String>) -> Result<Self, CredentialError> {
        let name = name.into();
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(CredentialError::Empty(name));
        }
        Ok(Self {
            name,
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Return the credential under the cursor and advance it.
    ///
    /// The cursor update is a single atomic read-modify-write that wraps
    /// modulo the pool size, so concurrent callers each get a distinct slot.
    pub fn next(&self) -> &str {
        let len = self.keys.len();
        let index = match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(previous) | Err(previous) => previous,
        };
        &self.keys[index]
    }
}

impl fmt::Debug for CredentialRotator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRotator")
            .field("name", &self.name)
            .field("keys", &self.keys.len())
            .finish()
    }
}
