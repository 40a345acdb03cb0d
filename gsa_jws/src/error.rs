//! Common errors

#![allow(missing_copy_implementations)]

use std::{error::Error as StdError, fmt};

use thiserror::Error;

use crate::jwa;

/// The provided algorithm code could not be matched with a supported algorithm
///
/// Supported codes are a two-letter family (`HS`, `RS`, `ES`) followed by a
/// three-digit hash width (`256`, `384`, `512`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{alg}' is not a supported algorithm; expected HS, RS, or ES with 256, 384, or 512")]
pub struct InvalidAlgorithm {
    alg: String,
}

impl InvalidAlgorithm {
    /// The rejected algorithm code
    #[must_use]
    pub fn alg(&self) -> &str {
        &self.alg
    }
}

#[inline]
pub(crate) fn invalid_algorithm(alg: impl Into<String>) -> InvalidAlgorithm {
    InvalidAlgorithm { alg: alg.into() }
}

/// The key material could not be loaded as a private key
#[derive(Debug, Error)]
#[error("unable to load key material")]
pub struct KeyLoadError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_load(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> KeyLoadError {
    KeyLoadError {
        source: source.into(),
    }
}

/// The kind of asymmetric key that was loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// An RSA private key
    Rsa,
    /// An elliptic curve private key
    EllipticCurve,
    /// Some other kind of key, identified by its OpenSSL NID
    Other(i32),
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Rsa => f.write_str("an RSA key"),
            Self::EllipticCurve => f.write_str("an EC key"),
            Self::Other(id) => write!(f, "an unsupported key type (nid {})", id),
        }
    }
}

/// The loaded key does not belong to the family the algorithm requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("provided key is {actual}, which cannot be used with '{alg}'")]
pub struct KeyTypeMismatch {
    alg: jwa::Algorithm,
    actual: KeyKind,
}

impl KeyTypeMismatch {
    /// The requested algorithm
    #[must_use]
    pub fn alg(&self) -> jwa::Algorithm {
        self.alg
    }

    /// The kind of key actually provided
    #[must_use]
    pub fn actual(&self) -> KeyKind {
        self.actual
    }
}

pub(crate) fn key_type_mismatch(alg: impl Into<jwa::Algorithm>, actual: KeyKind) -> KeyTypeMismatch {
    KeyTypeMismatch {
        alg: alg.into(),
        actual,
    }
}

/// The signing engine failed to produce a signature
#[derive(Debug, Error)]
#[error("failed to produce signature")]
pub struct SignatureError {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn signature_error(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> SignatureError {
    SignatureError {
        source: source.into(),
    }
}

/// The JWT header could not be serialized
#[derive(Debug, Error)]
#[error("malformed JWT header")]
pub struct MalformedJwtHeader {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_header(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtHeader {
    MalformedJwtHeader {
        source: source.into(),
    }
}

/// The JWT payload could not be serialized
#[derive(Debug, Error)]
#[error("malformed JWT payload")]
pub struct MalformedJwtPayload {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn malformed_jwt_payload(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwtPayload {
    MalformedJwtPayload {
        source: source.into(),
    }
}

/// An error occurring while creating a signature or a signed assertion
#[derive(Debug, Error)]
pub enum SigningError {
    /// The algorithm code is malformed or unsupported
    #[error(transparent)]
    InvalidAlgorithm(#[from] InvalidAlgorithm),

    /// The key could not be loaded
    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    /// The key does not match the algorithm family
    #[error(transparent)]
    KeyTypeMismatch(#[from] KeyTypeMismatch),

    /// The signing engine failed
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The header could not be serialized
    #[error(transparent)]
    MalformedHeader(#[from] MalformedJwtHeader),

    /// The payload could not be serialized
    #[error(transparent)]
    MalformedPayload(#[from] MalformedJwtPayload),
}

impl SigningError {
    /// Whether the error is due to an unsupported algorithm code
    #[must_use]
    pub fn is_invalid_algorithm(&self) -> bool {
        matches!(self, Self::InvalidAlgorithm(_))
    }

    /// Whether the error is due to unloadable key material
    #[must_use]
    pub fn is_key_load(&self) -> bool {
        matches!(self, Self::KeyLoad(_))
    }

    /// Whether the error is due to a key of the wrong family
    #[must_use]
    pub fn is_key_type_mismatch(&self) -> bool {
        matches!(self, Self::KeyTypeMismatch(_))
    }
}

/// The compact token does not have a decodable claims section
#[derive(Debug, Error)]
#[error("malformed JWT")]
pub struct MalformedJwt {
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

pub(crate) fn malformed_jwt() -> MalformedJwt {
    MalformedJwt { source: None }
}

pub(crate) fn malformed_jwt_with(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> MalformedJwt {
    MalformedJwt {
        source: Some(source.into()),
    }
}
