use gsa_clock::{DurationSecs, UnixTime};
use serde::{Deserialize, Serialize};

use crate::{AccessToken, AccessTokenRef};

/// Seconds shaved off the reported lifetime when computing the expiry
pub const EXPIRY_MARGIN: DurationSecs = DurationSecs(60);

/// The token type assumed when the authority does not report one
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// An access token as issued by the authority, with its computed expiry
///
/// Records are never modified; a refresh produces a replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    // Must stay first. The cache MAC covers only the ciphertext, not the IV,
    // so a flipped IV bit only alters the first decrypted block; that block is
    // exactly `{"access_token":`, and any change to it fails to parse.
    access_token: AccessToken,
    token_type: String,
    expires_in: DurationSecs,
    expires_at: UnixTime,
}

impl TokenRecord {
    /// Constructs a record for a token issued at `fetched_at`
    ///
    /// The expiry is `fetched_at + expires_in - 60s`, so that a token is
    /// abandoned shortly before the authority stops accepting it.
    pub fn issued(
        access_token: AccessToken,
        token_type: impl Into<String>,
        expires_in: DurationSecs,
        fetched_at: UnixTime,
    ) -> Self {
        Self {
            access_token,
            token_type: token_type.into(),
            expires_in,
            expires_at: fetched_at + expires_in - EXPIRY_MARGIN,
        }
    }

    /// Gets the access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the token type, usually `Bearer`
    #[inline]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Gets the lifetime reported by the authority
    #[inline]
    pub fn expires_in(&self) -> DurationSecs {
        self.expires_in
    }

    /// Gets the time after which the token is no longer used
    #[inline]
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    /// Whether the token may still be used at `now`
    #[inline]
    pub fn is_valid_at(&self, now: UnixTime) -> bool {
        now < self.expires_at
    }

    /// Seconds of use left at `now`, zero once expired
    #[inline]
    pub fn expires_in_at(&self, now: UnixTime) -> DurationSecs {
        self.expires_at - now
    }
}
