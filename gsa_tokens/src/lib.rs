//! Access tokens for service accounts via the OAuth2 JWT-bearer grant
//!
//! A service account authenticates by signing a short-lived JWT assertion
//! with its private key and exchanging it at the token endpoint for an
//! access token. This crate performs that exchange, and caches the resulting
//! token until shortly before it expires so that repeated requests for a
//! token are cheap.
//!
//! The cache may be kept only in memory or persisted, encrypted and
//! authenticated, so that a token survives process restarts. A persisted
//! token that cannot be read back intact is simply ignored and a fresh one
//! is fetched.
//!
//! ```no_run
//! use gsa_tokens::{
//!     cache::{store::FileStore, CacheKeys, EncryptedTokenCache},
//!     transport::ReqwestTransport,
//!     ServiceAccountConfig, TokenManager,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = ServiceAccountConfig::from_file("service-account.json")?;
//! let keys = CacheKeys::from_base64(
//!     &std::env::var("TOKEN_CACHE_ENC_KEY")?,
//!     &std::env::var("TOKEN_CACHE_MAC_KEY")?,
//! )?;
//!
//! let manager = TokenManager::new(config, ReqwestTransport::new()?)
//!     .with_cache(EncryptedTokenCache::with_keys(FileStore::new(".token.cache"), keys));
//!
//! let token = manager.fetch_access_token("https://www.googleapis.com/auth/cloud-platform")?;
//!
//! tracing::info!(
//!     token = format_args!("{:#?}", token.access_token()),
//!     expires_at = token.expires_at().0,
//!     "access token"
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! The following features are supported by this crate, all of which are enabled by default:
//!
//! * `file`: Provides a [`FileStore`][cache::store::FileStore] for persisting
//!   the encrypted cache on the local filesystem.
//! * `reqwest`: Provides a [`Transport`][transport::Transport] backed by the
//!   blocking [reqwest] client.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
pub mod cache;
pub mod config;
pub mod manager;
mod tokens;
pub mod transport;

pub use braids::*;
pub use config::{ConfigError, ServiceAccountConfig, DEFAULT_TOKEN_URI};
pub use manager::{ErrorResponse, FetchError, Scopes, TokenManager};
pub use tokens::{TokenRecord, DEFAULT_TOKEN_TYPE, EXPIRY_MARGIN};
