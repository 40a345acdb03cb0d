//! Token caches and the media they persist to

use std::{error, io};

use gsa_clock::UnixTime;

use crate::TokenRecord;

pub mod encrypted;
pub mod in_memory;
pub mod store;

pub use encrypted::{CacheKeys, EncryptedTokenCache};
pub use in_memory::InMemoryTokenCache;

/// A cache holding at most one token
///
/// An absent token is not an error: a cache that cannot produce a usable
/// token, for whatever reason, reports that it has none.
pub trait TokenCache {
    /// Refreshes the in-memory token from the cache's durable medium, if any
    fn load(&mut self) -> Option<TokenRecord>;

    /// Replaces the cached token, persisting it if the cache is durable
    ///
    /// The in-memory token is replaced even when persisting fails.
    ///
    /// # Errors
    ///
    /// The token could not be written to the durable medium.
    fn save(
        &mut self,
        token: &TokenRecord,
    ) -> Result<(), Box<dyn error::Error + Send + Sync + 'static>>;

    /// The currently held token, without consulting the durable medium
    fn token(&self) -> Option<&TokenRecord>;

    /// Whether a token is held and still usable at `now`
    fn is_valid(&self, now: UnixTime) -> bool {
        self.token().map_or(false, |t| t.is_valid_at(now))
    }
}

impl<T: TokenCache + ?Sized> TokenCache for Box<T> {
    fn load(&mut self) -> Option<TokenRecord> {
        (**self).load()
    }

    fn save(
        &mut self,
        token: &TokenRecord,
    ) -> Result<(), Box<dyn error::Error + Send + Sync + 'static>> {
        (**self).save(token)
    }

    fn token(&self) -> Option<&TokenRecord> {
        (**self).token()
    }

    fn is_valid(&self, now: UnixTime) -> bool {
        (**self).is_valid(now)
    }
}

/// A medium that stores one opaque blob, read and written whole
pub trait BackingStore {
    /// Reads the stored blob, or `None` if nothing has been stored
    ///
    /// # Errors
    ///
    /// The medium could not be read.
    fn read_all(&self) -> io::Result<Option<Vec<u8>>>;

    /// Replaces the stored blob
    ///
    /// Readers must observe either the old or the new blob, never a mix.
    ///
    /// # Errors
    ///
    /// The medium could not be written.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}
