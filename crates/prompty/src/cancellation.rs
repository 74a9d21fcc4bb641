/*
 * cancellation.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Cancellation signal for template execution.
 */

//! Cancellation for template execution.
//!
//! [`Cancellation`] wraps `tokio_util::sync::CancellationToken` so that a
//! synchronous execution can be aborted from another thread or from an
//! async task that owns the token. The executor polls it before every
//! resolver invocation and before every loop iteration.

use tokio_util::sync::CancellationToken;

/// A cloneable cancellation signal.
///
/// Clones share state: cancelling one cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    inner: CancellationToken,
}

impl Cancellation {
    /// Create a new, not yet cancelled, token.
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Request cancellation.
    ///
    /// After this is called, `is_cancelled()` will return `true`.
    pub fn cancel(&self) {
        self.inner.cancel()
    }

    /// Create a token that is cancelled when this one is, but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// The underlying tokio token, for use in async code.
    pub fn token(&self) -> &CancellationToken {
        &self.inner
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self { inner: token }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_not_cancelled() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = Cancellation::new();
        let token2 = token1.clone();

        token1.cancel();

        assert!(token1.is_cancelled());
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_child_follows_parent() {
        let parent = Cancellation::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());

        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_from_tokio_token() {
        let token = CancellationToken::new();
        let cancellation = Cancellation::from(token.clone());

        token.cancel();
        assert!(cancellation.is_cancelled());
    }
}
