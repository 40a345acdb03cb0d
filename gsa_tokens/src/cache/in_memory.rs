//! An in-memory token caching layer

use std::error;

use crate::{cache::TokenCache, TokenRecord};

/// An in-memory token cache
///
/// Holds the token for the life of the process only. Nothing is encrypted.
#[derive(Default, Debug, Clone)]
pub struct InMemoryTokenCache {
    token: Option<TokenRecord>,
}

impl InMemoryTokenCache {
    /// Constructs a new in-memory token cache
    pub const fn new() -> Self {
        Self { token: None }
    }
}

impl TokenCache for InMemoryTokenCache {
    fn load(&mut self) -> Option<TokenRecord> {
        self.token.clone()
    }

    fn save(
        &mut self,
        token: &TokenRecord,
    ) -> Result<(), Box<dyn error::Error + Send + Sync + 'static>> {
        self.token = Some(token.clone());
        Ok(())
    }

    fn token(&self) -> Option<&TokenRecord> {
        self.token.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use gsa_clock::{DurationSecs, UnixTime};

    use super::*;
    use crate::AccessToken;

    #[test]
    fn validity_follows_expiry() {
        let mut cache = InMemoryTokenCache::new();
        assert!(cache.load().is_none());
        assert!(!cache.is_valid(UnixTime(0)));

        let token = TokenRecord::issued(
            AccessToken::from_static("T1"),
            "Bearer",
            DurationSecs(1059),
            UnixTime(0),
        );
        cache.save(&token).unwrap();

        assert_eq!(cache.token(), Some(&token));
        assert_eq!(cache.load(), Some(token));
        assert!(cache.is_valid(UnixTime(998)));
        assert!(!cache.is_valid(UnixTime(999)));
        assert!(!cache.is_valid(UnixTime(1000)));
    }
}
