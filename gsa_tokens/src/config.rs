//! Service account credentials

use std::{fs, io, path::Path};

use gsa_jws::jwt::{KeyId, KeyIdRef};
use serde::Deserialize;
use thiserror::Error;

use crate::{ClientEmail, ClientEmailRef, PrivateKey, PrivateKeyRef};

/// The token endpoint used when the credentials do not name one
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The credentials of a service account, as found in its JSON key file
///
/// Fields the token exchange does not use, such as `type` or `project_id`,
/// are ignored. Required fields may be absent here; their absence is
/// reported when a token is first fetched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceAccountConfig {
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    client_email: Option<ClientEmail>,
    #[serde(default)]
    private_key_id: Option<KeyId>,
    #[serde(default)]
    private_key: Option<PrivateKey>,
}

impl ServiceAccountConfig {
    /// Constructs a complete configuration using the default token endpoint
    pub fn new(
        client_email: impl Into<ClientEmail>,
        private_key_id: impl Into<KeyId>,
        private_key: impl Into<PrivateKey>,
    ) -> Self {
        Self {
            token_uri: None,
            client_email: Some(client_email.into()),
            private_key_id: Some(private_key_id.into()),
            private_key: Some(private_key.into()),
        }
    }

    /// Overrides the token endpoint
    #[must_use]
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = Some(token_uri.into());
        self
    }

    /// Parses the JSON credential blob
    ///
    /// # Errors
    ///
    /// The blob is not a JSON object of the expected shape.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(ConfigError::Malformed)
    }

    /// Parses the JSON credential blob from raw bytes
    ///
    /// # Errors
    ///
    /// The blob is not a JSON object of the expected shape.
    pub fn from_json_slice(json: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(json).map_err(ConfigError::Malformed)
    }

    /// Reads and parses a service account key file
    ///
    /// # Errors
    ///
    /// The file cannot be read, or its contents are malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read(path.as_ref()).map_err(ConfigError::Unreadable)?;
        Self::from_json_slice(&data)
    }

    /// The token endpoint, falling back to [`DEFAULT_TOKEN_URI`]
    #[must_use]
    pub fn token_uri(&self) -> &str {
        self.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    /// The service account email, if present
    #[must_use]
    pub fn client_email(&self) -> Option<&ClientEmailRef> {
        self.client_email.as_deref()
    }

    /// The ID of the signing key, if present
    #[must_use]
    pub fn private_key_id(&self) -> Option<&KeyIdRef> {
        self.private_key_id.as_deref()
    }

    /// The signing key material, if present
    #[must_use]
    pub fn private_key(&self) -> Option<&PrivateKeyRef> {
        self.private_key.as_deref()
    }

    /// Checks that every field needed to sign an assertion is present
    ///
    /// # Errors
    ///
    /// Reports the first of `client_email`, `private_key_id`, or
    /// `private_key` that is missing.
    pub fn credentials(&self) -> Result<Credentials<'_>, ConfigError> {
        Ok(Credentials {
            token_uri: self.token_uri(),
            client_email: self
                .client_email()
                .ok_or(ConfigError::MissingField("client_email"))?,
            private_key_id: self
                .private_key_id()
                .ok_or(ConfigError::MissingField("private_key_id"))?,
            private_key: self
                .private_key()
                .ok_or(ConfigError::MissingField("private_key"))?,
        })
    }
}

/// A borrowed view of a complete set of credentials
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    /// The token endpoint
    pub token_uri: &'a str,
    /// The service account email
    pub client_email: &'a ClientEmailRef,
    /// The ID of the signing key
    pub private_key_id: &'a KeyIdRef,
    /// The signing key material
    pub private_key: &'a PrivateKeyRef,
}

/// The service account configuration is unusable
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field required to sign an assertion is absent
    #[error("{0} in service account config not set")]
    MissingField(&'static str),

    /// The credential blob could not be parsed
    #[error("malformed service account config")]
    Malformed(#[source] serde_json::Error),

    /// The credential file could not be read
    #[error("unable to read service account config")]
    Unreadable(#[source] io::Error),
}

impl ConfigError {
    /// The name of the missing field, if that is the cause
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField(field) => Some(*field),
            _ => None,
        }
    }
}
