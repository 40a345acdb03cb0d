//! JSON Web Algorithms usable for signing assertions
//!
//! An algorithm is named by a five character code: a two-letter family
//! (`HS`, `RS`, `ES`) followed by the hash width in bits (`256`, `384`,
//! `512`). The specifications for these algorithms can be found in [RFC7518][].
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

use std::{fmt, str::FromStr};

use openssl::pkey::{Id, PKey, Private};
use serde::{Deserialize, Serialize};

use crate::error;

pub mod ec;
pub mod hmac;
pub mod rsa;

#[doc(inline)]
pub use hmac::Hmac;

/// A signing algorithm
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub enum Algorithm {
    /// HMAC symmetric
    Hmac(hmac::SigningAlgorithm),

    /// RSA public/private key pair
    Rsa(rsa::SigningAlgorithm),

    /// Elliptic curve cryptography
    EllipticCurve(ec::SigningAlgorithm),
}

impl Algorithm {
    /// The HS256 signing algorithm
    pub const HS256: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS256);
    /// The HS384 signing algorithm
    pub const HS384: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS384);
    /// The HS512 signing algorithm
    pub const HS512: Algorithm = Self::Hmac(hmac::SigningAlgorithm::HS512);
    /// The RS256 signing algorithm
    pub const RS256: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS256);
    /// The RS384 signing algorithm
    pub const RS384: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS384);
    /// The RS512 signing algorithm
    pub const RS512: Algorithm = Self::Rsa(rsa::SigningAlgorithm::RS512);
    /// The ES256 signing algorithm
    pub const ES256: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES256);
    /// The ES384 signing algorithm
    pub const ES384: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES384);
    /// The ES512 signing algorithm
    pub const ES512: Algorithm = Self::EllipticCurve(ec::SigningAlgorithm::ES512);

    /// Every supported algorithm
    pub const ALL: [Algorithm; 9] = [
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
    ];

    /// The two-letter family code of this algorithm
    #[must_use]
    pub fn family(self) -> &'static str {
        match self {
            Self::Hmac(_) => "HS",
            Self::Rsa(_) => "RS",
            Self::EllipticCurve(_) => "ES",
        }
    }

    /// The width of the hash used by this algorithm, in bits
    #[must_use]
    pub fn hash_bits(self) -> u16 {
        match self {
            Self::Hmac(a) => a.hash_bits(),
            Self::Rsa(a) => a.hash_bits(),
            Self::EllipticCurve(a) => a.hash_bits(),
        }
    }

    /// Whether this algorithm signs with an asymmetric private key
    #[must_use]
    pub fn is_asymmetric(self) -> bool {
        !matches!(self, Self::Hmac(_))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Hmac(a) => fmt::Display::fmt(a, f),
            Self::Rsa(a) => fmt::Display::fmt(a, f),
            Self::EllipticCurve(a) => fmt::Display::fmt(a, f),
        }
    }
}

impl TryFrom<&'_ str> for Algorithm {
    type Error = error::InvalidAlgorithm;

    #[inline]
    fn try_from(value: &'_ str) -> Result<Self, Self::Error> {
        match value {
            "ES256" => Ok(Algorithm::ES256),
            "ES384" => Ok(Algorithm::ES384),
            "ES512" => Ok(Algorithm::ES512),
            "RS256" => Ok(Algorithm::RS256),
            "RS384" => Ok(Algorithm::RS384),
            "RS512" => Ok(Algorithm::RS512),
            "HS256" => Ok(Algorithm::HS256),
            "HS384" => Ok(Algorithm::HS384),
            "HS512" => Ok(Algorithm::HS512),
            _ => Err(error::invalid_algorithm(value)),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = error::InvalidAlgorithm;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = error::InvalidAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl From<Algorithm> for String {
    fn from(alg: Algorithm) -> Self {
        alg.to_string()
    }
}

/// Loads PEM-encoded private key material
///
/// Accepts PKCS#8 as well as the traditional RSA and EC PEM forms.
pub(crate) fn load_private_key(pem: &[u8]) -> Result<PKey<Private>, error::KeyLoadError> {
    if pem.is_empty() {
        return Err(error::key_load("empty key material"));
    }

    PKey::private_key_from_pem(pem).map_err(error::key_load)
}

pub(crate) fn key_kind(key: &PKey<Private>) -> error::KeyKind {
    let id = key.id();
    if id == Id::RSA {
        error::KeyKind::Rsa
    } else if id == Id::EC {
        error::KeyKind::EllipticCurve
    } else {
        error::KeyKind::Other(id.as_raw())
    }
}
