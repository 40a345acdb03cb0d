//! Fetching access tokens with the JWT-bearer grant

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use gsa_clock::{Clock, System, UnixTime};
use gsa_jws::{
    jwa::Algorithm,
    jwt::{JwtClaims, JwtHeader},
    JwsSigner, JwtSigner, SigningError,
};
use thiserror::Error;

use crate::{
    cache::{InMemoryTokenCache, TokenCache},
    config::{ConfigError, ServiceAccountConfig},
    transport::{HttpRequest, Transport},
    TokenRecord,
};

pub mod dto;

pub use dto::ErrorResponse;

/// The algorithm named in the header of every assertion
pub const ASSERTION_ALGORITHM: Algorithm = Algorithm::RS256;

/// The scopes a token is requested for
///
/// A single scope string is passed through as-is; a list of scopes is joined
/// with spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Scopes(Vec<String>);

impl Scopes {
    /// No scopes
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a scope
    #[must_use]
    pub fn with(mut self, scope: impl Into<String>) -> Self {
        self.0.push(scope.into());
        self
    }

    /// The individual scopes
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for Scopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&'_ str> for Scopes {
    fn from(scope: &str) -> Self {
        Self(vec![scope.to_owned()])
    }
}

impl From<String> for Scopes {
    fn from(scope: String) -> Self {
        Self(vec![scope])
    }
}

impl From<Vec<String>> for Scopes {
    fn from(scopes: Vec<String>) -> Self {
        Self(scopes)
    }
}

impl From<&'_ [&'_ str]> for Scopes {
    fn from(scopes: &[&str]) -> Self {
        scopes.iter().copied().collect()
    }
}

impl<const N: usize> From<[&'_ str; N]> for Scopes {
    fn from(scopes: [&str; N]) -> Self {
        scopes.into_iter().collect()
    }
}

/// An error while fetching an access token
///
/// Configuration and signing errors are raised before any request is sent.
/// Transport and protocol errors carry an [`ErrorResponse`] describing what
/// the caller may inspect or retry on.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The service account configuration is incomplete
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The assertion could not be signed
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// No response was obtained from the token endpoint
    #[error("error sending token request to authority: {0}")]
    Transport(ErrorResponse),

    /// The token endpoint answered with an error, or with something unusable
    #[error("error requesting token from authority: {0}")]
    Protocol(ErrorResponse),
}

impl FetchError {
    /// The error record of a transport or protocol error
    #[must_use]
    pub fn error_response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Transport(resp) | Self::Protocol(resp) => Some(resp),
            _ => None,
        }
    }

    /// Converts into the error record of a transport or protocol error
    #[must_use]
    pub fn into_error_response(self) -> Option<ErrorResponse> {
        match self {
            Self::Transport(resp) | Self::Protocol(resp) => Some(resp),
            _ => None,
        }
    }

    /// Whether the error is a failure to reach the token endpoint
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the token endpoint answered with an error
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Issues and caches access tokens for a single service account
///
/// Calls to [`fetch_access_token()`][Self::fetch_access_token()] on one
/// manager are serialized: the cache check, the exchange, and the cache
/// update happen under one lock, so concurrent callers that all find the
/// cache stale cause a single exchange.
///
/// The cache is not keyed by scope. A token cached for one set of scopes is
/// returned for any other until it expires.
pub struct TokenManager<T, S = JwsSigner, C = System> {
    config: ServiceAccountConfig,
    transport: T,
    signer: S,
    clock: C,
    signing_override: Option<Algorithm>,
    cache: Mutex<Box<dyn TokenCache + Send>>,
}

impl<T: Transport> TokenManager<T, JwsSigner, System> {
    /// Constructs a manager with an in-memory cache and the default signer
    pub fn new(config: ServiceAccountConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            signer: JwsSigner,
            clock: System,
            signing_override: None,
            cache: Mutex::new(Box::new(InMemoryTokenCache::new())),
        }
    }
}

impl<T, S, C> TokenManager<T, S, C> {
    /// Replaces the token cache, loading whatever token it holds
    pub fn with_cache(self, mut cache: impl TokenCache + Send + 'static) -> Self {
        if let Some(token) = cache.load() {
            tracing::debug!(expires_at = token.expires_at().0, "cache holds a token");
        }

        Self {
            cache: Mutex::new(Box::new(cache)),
            ..self
        }
    }

    /// Sets a custom signer
    pub fn with_signer<R>(self, signer: R) -> TokenManager<T, R, C> {
        TokenManager {
            config: self.config,
            transport: self.transport,
            signer,
            clock: self.clock,
            signing_override: self.signing_override,
            cache: self.cache,
        }
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> TokenManager<T, S, D> {
        TokenManager {
            config: self.config,
            transport: self.transport,
            signer: self.signer,
            clock,
            signing_override: self.signing_override,
            cache: self.cache,
        }
    }

    /// Signs assertions with `alg` while their header still names `RS256`
    ///
    /// Intended for rotating signing keys without changing the header. Token
    /// endpoints that trust the header's `alg` will reject such assertions.
    #[must_use]
    pub fn with_signing_override(mut self, alg: Algorithm) -> Self {
        self.signing_override = Some(alg);
        self
    }

    /// The service account configuration
    #[must_use]
    pub fn config(&self) -> &ServiceAccountConfig {
        &self.config
    }

    /// A copy of the currently cached token, valid or not
    #[must_use]
    pub fn cached_token(&self) -> Option<TokenRecord> {
        self.lock_cache().token().cloned()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Box<dyn TokenCache + Send>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, S, C> TokenManager<T, S, C>
where
    T: Transport,
    S: JwtSigner,
    C: Clock,
{
    /// Returns a usable access token for `scopes`
    ///
    /// A valid cached token is returned without contacting the token
    /// endpoint. Otherwise a signed assertion is exchanged for a new token,
    /// which is cached before being returned. Failing to persist the new
    /// token is logged but does not fail the call.
    ///
    /// # Errors
    ///
    /// * The configuration lacks a required credential
    /// * The assertion cannot be signed
    /// * The token endpoint cannot be reached
    /// * The token endpoint reports an error or answers unintelligibly
    pub fn fetch_access_token(&self, scopes: impl Into<Scopes>) -> Result<TokenRecord, FetchError> {
        let scopes = scopes.into();
        let mut cache = self.lock_cache();
        let now = self.clock.now();

        if cache.is_valid(now) {
            if let Some(token) = cache.token() {
                tracing::debug!(
                    expires_at = token.expires_at().0,
                    now = now.0,
                    "using cached token"
                );
                return Ok(token.clone());
            }
        }

        let token = self.request_token(&scopes, now)?;

        if let Err(error) = cache.save(&token) {
            tracing::warn!(
                error = (&*error as &dyn std::error::Error),
                "unable to persist new token to cache"
            );
        }

        Ok(token)
    }

    #[tracing::instrument(
        err,
        skip(self, scopes, now),
        fields(
            token_uri = self.config.token_uri(),
            scope = %scopes,
            now = now.0,
        ),
    )]
    fn request_token(&self, scopes: &Scopes, now: UnixTime) -> Result<TokenRecord, FetchError> {
        let creds = self.config.credentials()?;

        let header = JwtHeader::new(ASSERTION_ALGORITHM).with_key_id(creds.private_key_id.to_owned());
        let claims = JwtClaims::new(
            creds.client_email.as_str(),
            scopes.to_string(),
            creds.token_uri,
            now,
        );

        let assertion = self.signer.create_assertion(
            &header,
            &claims,
            creds.private_key.as_str().as_bytes(),
            self.signing_override,
        )?;

        let request = HttpRequest::form_post(creds.token_uri, dto::form_body(&assertion));

        tracing::trace!("requesting token from authority");

        let resp = match self.transport.request(&request) {
            Ok(resp) => resp,
            Err(failure) => return Err(FetchError::Transport(dto::transport_error(failure))),
        };

        tracing::debug!(
            response.status = resp.status,
            "received token response from issuing authority"
        );

        match dto::interpret_response(resp, now) {
            dto::TokenOutcome::Issued(token) => {
                tracing::info!(
                    lifetime = token.expires_in().0,
                    expires_at = token.expires_at().0,
                    "received new token"
                );
                Ok(token)
            }
            dto::TokenOutcome::Rejected(error) | dto::TokenOutcome::Unintelligible(error) => {
                Err(FetchError::Protocol(error))
            }
        }
    }
}

impl<T, S, C> fmt::Debug for TokenManager<T, S, C>
where
    T: fmt::Debug,
    S: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("signer", &self.signer)
            .field("clock", &self.clock)
            .field("signing_override", &self.signing_override)
            .finish_non_exhaustive()
    }
}
