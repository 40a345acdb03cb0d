//! A token cache persisted under authenticated encryption
//!
//! The stored blob is `base64(iv || mac || ciphertext)`, where the
//! ciphertext is the token's JSON form encrypted with AES-256-CBC under a
//! random IV, and the MAC is HMAC-SHA-512 over the ciphertext with an
//! independent key.

use std::{error, fmt};

use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::symm::{self, Cipher};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

use super::{BackingStore, TokenCache};
use crate::TokenRecord;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 64;

/// Length of the encryption key, in bytes
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Length of the MAC key, in bytes
pub const MAC_KEY_LEN: usize = 64;

const DEFAULT_ENCRYPTION_KEY: [u8; ENCRYPTION_KEY_LEN] = [
    0xd9, 0x43, 0x80, 0x58, 0x24, 0xdf, 0x3d, 0x0a, 0x97, 0x05, 0xe0, 0x24,
    0x1f, 0xf7, 0x3c, 0xf7, 0x87, 0x66, 0x6e, 0xca, 0xad, 0x4c, 0xfe, 0x15,
    0x44, 0xd9, 0xf2, 0xdd, 0xcc, 0xd1, 0x8c, 0xc5,
];

const DEFAULT_MAC_KEY: [u8; MAC_KEY_LEN] = [
    0xdd, 0x23, 0x40, 0x00, 0x94, 0x55, 0xfa, 0x68, 0x6e, 0x4b, 0x6a, 0x1d,
    0x00, 0x02, 0x29, 0xd7, 0x35, 0x8d, 0x86, 0x0b, 0x0a, 0xfd, 0x87, 0x2b,
    0xea, 0x14, 0xe3, 0x7f, 0x30, 0xf2, 0xc9, 0x00, 0x67, 0x82, 0x63, 0x88,
    0x9d, 0x50, 0x1d, 0xed, 0xac, 0x51, 0xa9, 0x65, 0xd1, 0x0b, 0x42, 0x8f,
    0x05, 0x79, 0xa2, 0x56, 0x06, 0x85, 0x7c, 0x75, 0x7a, 0x8f, 0x46, 0x6f,
    0xf9, 0xd2, 0x87, 0x9e,
];

/// The pair of keys protecting a cached token
#[derive(Clone, PartialEq, Eq)]
pub struct CacheKeys {
    encryption: [u8; ENCRYPTION_KEY_LEN],
    mac: [u8; MAC_KEY_LEN],
}

impl CacheKeys {
    /// Constructs keys from raw key material
    pub const fn new(encryption: [u8; ENCRYPTION_KEY_LEN], mac: [u8; MAC_KEY_LEN]) -> Self {
        Self { encryption, mac }
    }

    /// The keys compiled into this crate
    ///
    /// **These keys are public.** Anyone with this crate's source can decrypt
    /// and forge a cache protected by them, so they provide no
    /// confidentiality or integrity across installations. They exist so
    /// that a cache works with zero configuration; production deployments
    /// must supply their own keys, e.g. from [`CacheKeys::generate()`]
    /// stored in a secret manager.
    pub const fn insecure_default() -> Self {
        Self::new(DEFAULT_ENCRYPTION_KEY, DEFAULT_MAC_KEY)
    }

    /// Generates fresh random keys
    ///
    /// # Errors
    ///
    /// The system random number generator failed.
    pub fn generate() -> Result<Self, CacheKeyError> {
        let rng = SystemRandom::new();
        let mut keys = Self::new([0; ENCRYPTION_KEY_LEN], [0; MAC_KEY_LEN]);
        rng.fill(&mut keys.encryption)
            .map_err(|_| CacheKeyError::Random)?;
        rng.fill(&mut keys.mac).map_err(|_| CacheKeyError::Random)?;
        Ok(keys)
    }

    /// Constructs keys from raw key material of unchecked length
    ///
    /// # Errors
    ///
    /// Either key has the wrong length.
    pub fn from_slices(encryption: &[u8], mac: &[u8]) -> Result<Self, CacheKeyError> {
        let encryption = encryption
            .try_into()
            .map_err(|_| CacheKeyError::encryption_len(encryption.len()))?;
        let mac = mac
            .try_into()
            .map_err(|_| CacheKeyError::mac_len(mac.len()))?;
        Ok(Self::new(encryption, mac))
    }

    /// Constructs keys from their standard base64 encodings
    ///
    /// # Errors
    ///
    /// Either key is not valid base64 or decodes to the wrong length.
    pub fn from_base64(encryption: &str, mac: &str) -> Result<Self, CacheKeyError> {
        let encryption = STANDARD.decode(encryption.trim())?;
        let mac = STANDARD.decode(mac.trim())?;
        Self::from_slices(&encryption, &mac)
    }

    /// The standard base64 encodings of the encryption and MAC keys
    #[must_use]
    pub fn to_base64(&self) -> (String, String) {
        (STANDARD.encode(self.encryption), STANDARD.encode(self.mac))
    }

    fn mac_key(&self) -> ring::hmac::Key {
        ring::hmac::Key::new(ring::hmac::HMAC_SHA512, &self.mac)
    }
}

impl fmt::Debug for CacheKeys {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("CacheKeys { encryption, mac }")
    }
}

/// The provided cache keys are unusable
#[derive(Debug, Error)]
pub enum CacheKeyError {
    /// A key has the wrong length
    #[error("{name} key must be {expected} bytes, got {actual}")]
    Length {
        /// Which key was rejected
        name: &'static str,
        /// The required length
        expected: usize,
        /// The provided length
        actual: usize,
    },

    /// A key is not valid base64
    #[error("key is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    /// The system random number generator failed
    #[error("unable to generate random key material")]
    Random,
}

impl CacheKeyError {
    fn encryption_len(actual: usize) -> Self {
        Self::Length {
            name: "encryption",
            expected: ENCRYPTION_KEY_LEN,
            actual,
        }
    }

    fn mac_len(actual: usize) -> Self {
        Self::Length {
            name: "MAC",
            expected: MAC_KEY_LEN,
            actual,
        }
    }
}

/// An error while persisting a token
#[derive(Debug, Error)]
pub enum CacheWriteError {
    /// The token could not be serialized
    #[error("unable to serialize token")]
    Serialize(#[from] serde_json::Error),

    /// Encryption failed
    #[error("unable to encrypt token")]
    Encrypt(#[source] Box<dyn error::Error + Send + Sync + 'static>),

    /// The backing store could not be written
    #[error("unable to write token to backing store")]
    Store(#[from] std::io::Error),
}

#[derive(Debug, Error)]
enum IntegrityFailure {
    #[error("backing store could not be read")]
    Read(#[from] std::io::Error),
    #[error("stored blob is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("stored blob is too short to hold a token")]
    Truncated,
    #[error("stored MAC does not match")]
    MacMismatch,
    #[error("stored blob could not be decrypted")]
    Decrypt(#[source] openssl::error::ErrorStack),
    #[error("decrypted token is malformed")]
    Parse(#[from] serde_json::Error),
}

/// A token cache encrypting its token into a [`BackingStore`]
///
/// Any failure to read back a stored token, including tampering, is treated
/// as if no token had been stored.
pub struct EncryptedTokenCache<S> {
    store: S,
    keys: CacheKeys,
    token: Option<TokenRecord>,
}

impl<S: BackingStore> EncryptedTokenCache<S> {
    /// Constructs a cache protected by [`CacheKeys::insecure_default()`]
    ///
    /// Call [`set_keys()`][Self::set_keys()] or use
    /// [`with_keys()`][Self::with_keys()] outside of tests.
    pub fn new(store: S) -> Self {
        Self::with_keys(store, CacheKeys::insecure_default())
    }

    /// Constructs a cache protected by the provided keys
    pub fn with_keys(store: S, keys: CacheKeys) -> Self {
        Self {
            store,
            keys,
            token: None,
        }
    }

    /// Replaces the keys used for subsequent loads and saves
    pub fn set_keys(&mut self, keys: CacheKeys) {
        self.keys = keys;
    }

    /// The backing store
    pub fn store(&self) -> &S {
        &self.store
    }

    fn seal(&self, plaintext: &[u8]) -> Result<String, CacheWriteError> {
        let mut iv = [0; IV_LEN];
        SystemRandom::new()
            .fill(&mut iv)
            .map_err(|e| CacheWriteError::Encrypt(e.to_string().into()))?;

        let ciphertext = symm::encrypt(
            Cipher::aes_256_cbc(),
            &self.keys.encryption,
            Some(&iv),
            plaintext,
        )
        .map_err(|e| CacheWriteError::Encrypt(e.into()))?;

        let mac = ring::hmac::sign(&self.keys.mac_key(), &ciphertext);

        let mut bundle = Vec::with_capacity(IV_LEN + MAC_LEN + ciphertext.len());
        bundle.extend_from_slice(&iv);
        bundle.extend_from_slice(mac.as_ref());
        bundle.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(bundle))
    }

    fn open(&self, data: &[u8]) -> Result<TokenRecord, IntegrityFailure> {
        let end = data
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |idx| idx + 1);
        let bundle = STANDARD.decode(&data[..end])?;

        if bundle.len() < IV_LEN + MAC_LEN {
            return Err(IntegrityFailure::Truncated);
        }

        let (iv, rest) = bundle.split_at(IV_LEN);
        let (mac, ciphertext) = rest.split_at(MAC_LEN);

        ring::hmac::verify(&self.keys.mac_key(), ciphertext, mac)
            .map_err(|_| IntegrityFailure::MacMismatch)?;

        let plaintext = symm::decrypt(
            Cipher::aes_256_cbc(),
            &self.keys.encryption,
            Some(iv),
            ciphertext,
        )
        .map_err(IntegrityFailure::Decrypt)?;

        // The IV is outside the MAC. Tampering with it only garbles the first
        // block, `{"access_token":`, which then fails to parse below.
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn read_token(&self) -> Result<Option<TokenRecord>, IntegrityFailure> {
        match self.store.read_all()? {
            Some(data) => self.open(&data).map(Some),
            None => Ok(None),
        }
    }

    fn write_token(&mut self, token: &TokenRecord) -> Result<(), CacheWriteError> {
        let plaintext = serde_json::to_vec(token)?;
        let sealed = self.seal(&plaintext)?;
        self.store.write_all(sealed.as_bytes())?;
        Ok(())
    }
}

impl<S: BackingStore> TokenCache for EncryptedTokenCache<S> {
    fn load(&mut self) -> Option<TokenRecord> {
        self.token = match self.read_token() {
            Ok(Some(token)) => {
                tracing::debug!(expires_at = token.expires_at().0, "loaded cached token");
                Some(token)
            }
            Ok(None) => {
                tracing::trace!("no cached token stored");
                None
            }
            Err(error) => {
                tracing::warn!(
                    error = (&error as &dyn error::Error),
                    "discarding unreadable cached token"
                );
                None
            }
        };

        self.token.clone()
    }

    fn save(
        &mut self,
        token: &TokenRecord,
    ) -> Result<(), Box<dyn error::Error + Send + Sync + 'static>> {
        self.token = Some(token.clone());
        self.write_token(token)?;
        tracing::trace!(expires_at = token.expires_at().0, "persisted token");
        Ok(())
    }

    fn token(&self) -> Option<&TokenRecord> {
        self.token.as_ref()
    }
}

impl<S: fmt::Debug> fmt::Debug for EncryptedTokenCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("EncryptedTokenCache")
            .field("store", &self.store)
            .field("keys", &self.keys)
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use gsa_clock::{DurationSecs, UnixTime};

    use super::*;
    use crate::{cache::store::MemoryStore, AccessToken};

    fn record() -> TokenRecord {
        TokenRecord::issued(
            AccessToken::from_static("ya29.c.secret-token-value"),
            "Bearer",
            DurationSecs(3600),
            UnixTime(1000),
        )
    }

    fn saved(keys: CacheKeys) -> (MemoryStore, Vec<u8>) {
        let store = MemoryStore::new();
        let mut cache = EncryptedTokenCache::with_keys(store.clone(), keys);
        cache.save(&record()).unwrap();
        let blob = store.contents().unwrap();
        (store, blob)
    }

    #[test]
    fn saves_and_loads_idempotently() {
        let keys = CacheKeys::generate().unwrap();
        let store = MemoryStore::new();
        let mut cache = EncryptedTokenCache::with_keys(store.clone(), keys.clone());

        cache.save(&record()).unwrap();
        let first = store.contents();
        cache.save(&record()).unwrap();
        assert_ne!(store.contents(), first, "IV should be fresh per save");

        let mut reader = EncryptedTokenCache::with_keys(store, keys);
        assert_eq!(reader.load(), Some(record()));
        assert_eq!(reader.token(), Some(&record()));
        assert!(reader.is_valid(UnixTime(4539)));
        assert!(!reader.is_valid(UnixTime(4540)));
    }

    #[test]
    fn blob_layout_is_iv_mac_ciphertext() {
        let (_, blob) = saved(CacheKeys::insecure_default());
        let bundle = STANDARD.decode(&blob).unwrap();

        let plaintext_len = serde_json::to_vec(&record()).unwrap().len();
        let padded_len = (plaintext_len / 16 + 1) * 16;
        assert_eq!(bundle.len(), IV_LEN + MAC_LEN + padded_len);
        assert!(!String::from_utf8_lossy(&bundle).contains("secret-token-value"));
    }

    #[test]
    fn any_flipped_bit_reads_as_absent() {
        let keys = CacheKeys::generate().unwrap();
        let (store, blob) = saved(keys.clone());
        let bundle = STANDARD.decode(&blob).unwrap();

        for byte in 0..bundle.len() {
            for bit in 0..8 {
                let mut tampered = bundle.clone();
                tampered[byte] ^= 1 << bit;
                store.replace(Some(STANDARD.encode(&tampered).into_bytes()));

                let mut cache = EncryptedTokenCache::with_keys(store.clone(), keys.clone());
                assert_eq!(cache.load(), None, "byte {} bit {} accepted", byte, bit);
                assert!(!cache.is_valid(UnixTime(1000)));
            }
        }
    }

    #[test]
    fn first_plaintext_block_is_access_token_key() {
        let plaintext = serde_json::to_vec(&record()).unwrap();
        assert_eq!(&plaintext[..IV_LEN], br#"{"access_token":"#);
    }

    #[test]
    fn flipped_iv_bits_read_as_absent_despite_valid_mac() {
        let keys = CacheKeys::generate().unwrap();
        let (store, blob) = saved(keys.clone());
        let bundle = STANDARD.decode(&blob).unwrap();

        for byte in 0..IV_LEN {
            let mut tampered = bundle.clone();
            tampered[byte] ^= 0x01;
            store.replace(Some(STANDARD.encode(&tampered).into_bytes()));

            let mut cache = EncryptedTokenCache::with_keys(store.clone(), keys.clone());
            assert_eq!(cache.load(), None, "IV byte {} accepted", byte);
        }
    }

    #[test]
    fn wrong_keys_read_as_absent() {
        let (store, _) = saved(CacheKeys::generate().unwrap());

        let mut cache = EncryptedTokenCache::new(store.clone());
        assert_eq!(cache.load(), None);

        let mut cache = EncryptedTokenCache::with_keys(store, CacheKeys::generate().unwrap());
        assert_eq!(cache.load(), None);
    }

    #[test]
    fn garbage_and_truncation_read_as_absent() {
        let store = MemoryStore::new();
        let mut cache = EncryptedTokenCache::new(store.clone());

        for junk in [
            &b"not base64 at all!"[..],
            b"",
            b"AAAA",
            &[0xff, 0xfe, 0xfd],
        ] {
            store.replace(Some(junk.to_vec()));
            assert_eq!(cache.load(), None);
        }
    }

    #[test]
    fn failed_load_clears_previous_token() {
        let (store, _) = saved(CacheKeys::insecure_default());
        let mut cache = EncryptedTokenCache::new(store.clone());
        assert!(cache.load().is_some());

        store.replace(Some(b"corrupted".to_vec()));
        assert_eq!(cache.load(), None);
        assert_eq!(cache.token(), None);
    }

    #[test]
    fn set_keys_applies_to_later_loads() {
        let keys = CacheKeys::generate().unwrap();
        let (store, _) = saved(keys.clone());

        let mut cache = EncryptedTokenCache::new(store);
        assert_eq!(cache.load(), None);
        cache.set_keys(keys);
        assert_eq!(cache.load(), Some(record()));
    }

    #[test]
    #[tracing_test::traced_test]
    fn tampering_is_logged_without_secrets() {
        let (store, _) = saved(CacheKeys::insecure_default());
        let mut cache = EncryptedTokenCache::with_keys(store, CacheKeys::generate().unwrap());
        assert_eq!(cache.load(), None);
        assert!(logs_contain("discarding unreadable cached token"));
        assert!(!logs_contain("secret-token-value"));
    }

    #[test]
    fn key_validation() {
        assert!(matches!(
            CacheKeys::from_slices(&[0; 16], &[0; 64]),
            Err(CacheKeyError::Length { name: "encryption", expected: 32, actual: 16 })
        ));
        assert!(matches!(
            CacheKeys::from_slices(&[0; 32], &[0; 32]),
            Err(CacheKeyError::Length { name: "MAC", .. })
        ));
        assert!(matches!(
            CacheKeys::from_base64("%%%", "AAAA"),
            Err(CacheKeyError::Encoding(_))
        ));

        let (enc, mac) = CacheKeys::insecure_default().to_base64();
        assert_eq!(enc, "2UOAWCTfPQqXBeAkH/c894dmbsqtTP4VRNny3czRjMU=");
        assert!(mac.starts_with("3SNAAJRV+mhuS2od"));

        let keys = CacheKeys::generate().unwrap();
        let (enc, mac) = keys.to_base64();
        assert_eq!(CacheKeys::from_base64(&enc, &mac).unwrap(), keys);
        assert_eq!(format!("{:?}", keys), "CacheKeys { encryption, mac }");
    }
}
