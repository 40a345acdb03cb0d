//! HMAC JSON Web Algorithm implementations

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error, jwa};

/// HMAC secret
#[derive(Clone, PartialEq, Eq)]
#[must_use]
pub struct Hmac {
    secret: Vec<u8>,
}

impl fmt::Debug for Hmac {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Hmac { secret }")
    }
}

impl Hmac {
    /// HMAC using the provided secret
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signs `data` with this secret
    ///
    /// No key-type check applies: any byte string is a usable HMAC secret.
    #[must_use]
    pub fn sign(&self, alg: SigningAlgorithm, data: &[u8]) -> Vec<u8> {
        let key = ring::hmac::Key::new(alg.into_ring_algorithm(), &self.secret);
        ring::hmac::sign(&key, data).as_ref().to_owned()
    }

    /// Verifies that `signature` is the HMAC of `data`, in constant time
    #[must_use]
    pub fn verify(&self, alg: SigningAlgorithm, data: &[u8], signature: &[u8]) -> bool {
        let key = ring::hmac::Key::new(alg.into_ring_algorithm(), &self.secret);
        ring::hmac::verify(&key, data, signature).is_ok()
    }
}

/// HMAC signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum SigningAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl SigningAlgorithm {
    /// The width of the underlying hash, in bits
    #[must_use]
    pub const fn hash_bits(self) -> u16 {
        match self {
            Self::HS256 => 256,
            Self::HS384 => 384,
            Self::HS512 => 512,
        }
    }

    /// The size in bytes of an HMAC signature
    #[must_use]
    pub const fn signature_size(self) -> usize {
        self.hash_bits() as usize / 8
    }

    fn into_ring_algorithm(self) -> ring::hmac::Algorithm {
        match self {
            SigningAlgorithm::HS256 => ring::hmac::HMAC_SHA256,
            SigningAlgorithm::HS384 => ring::hmac::HMAC_SHA384,
            SigningAlgorithm::HS512 => ring::hmac::HMAC_SHA512,
        }
    }
}

impl From<SigningAlgorithm> for jwa::Algorithm {
    fn from(alg: SigningAlgorithm) -> Self {
        Self::Hmac(alg)
    }
}

impl TryFrom<jwa::Algorithm> for SigningAlgorithm {
    type Error = error::InvalidAlgorithm;

    fn try_from(alg: jwa::Algorithm) -> Result<Self, Self::Error> {
        match alg {
            jwa::Algorithm::Hmac(alg) => Ok(alg),
            _ => Err(error::invalid_algorithm(alg.to_string())),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        };

        f.write_str(s)
    }
}
