//! Client session identity.
//!
//! A [`SessionToken`] names this client instance to the backend, which keys
//! its per-session state (the bound model, the active stream) on it. The
//! token is random but not secret: it must never be treated as a credential.

use std::fmt;

use uuid::Uuid;

/// Opaque identifier generated once per client instance.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generates a fresh token from a random (v4) UUID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tokens_are_distinct() {
        let tokens: HashSet<SessionToken> = (0..64).map(|_| SessionToken::generate()).collect();
        assert_eq!(tokens.len(), 64);
    }

    #[test]
    fn token_is_url_safe() {
        let token = SessionToken::generate();
        assert_eq!(token.as_str().len(), 32);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(token.to_string(), token.as_str());
    }
}
