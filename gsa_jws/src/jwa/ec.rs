//! Elliptic curve cryptography JSON Web Algorithm implementations

use std::fmt;

use openssl::{
    ecdsa::EcdsaSig,
    hash::MessageDigest,
    pkey::{PKey, Private},
    sign::Signer,
};
use serde::{Deserialize, Serialize};

use crate::{error, jwa};

/// ECC private key
///
/// The hash width comes from the requested algorithm rather than the key's
/// curve, so a P-256 key can be used with `ES384` and vice versa.
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    key: PKey<Private>,
    field_size: usize,
}

impl PrivateKey {
    /// Constructs an ECC private key from a PEM file
    ///
    /// # Errors
    ///
    /// * The provided PEM file cannot be parsed as a private key
    /// * The key is not an elliptic curve key
    pub fn from_pem(pem: &[u8]) -> Result<Self, error::SigningError> {
        let key = jwa::load_private_key(pem)?;
        Self::from_openssl_key(key, SigningAlgorithm::ES256)
    }

    pub(crate) fn from_openssl_key(
        key: PKey<Private>,
        alg: SigningAlgorithm,
    ) -> Result<Self, error::SigningError> {
        let kind = jwa::key_kind(&key);
        if kind != error::KeyKind::EllipticCurve {
            return Err(error::key_type_mismatch(alg, kind).into());
        }

        let degree = key.ec_key().map_err(error::key_load)?.group().degree();
        let field_size = (degree as usize + 7) / 8;

        Ok(Self { key, field_size })
    }

    /// The byte length of each of the `r` and `s` signature halves
    #[must_use]
    pub fn field_size(&self) -> usize {
        self.field_size
    }

    /// Signs `data`, returning the fixed-width `r || s` form used by JWS
    ///
    /// # Errors
    ///
    /// The signing engine failed.
    pub fn sign(&self, alg: SigningAlgorithm, data: &[u8]) -> Result<Vec<u8>, error::SignatureError> {
        let mut signer =
            Signer::new(alg.message_digest(), &self.key).map_err(error::signature_error)?;
        signer.update(data).map_err(error::signature_error)?;
        let der = signer.sign_to_vec().map_err(error::signature_error)?;

        let sig = EcdsaSig::from_der(&der).map_err(error::signature_error)?;
        let width = self.field_size as i32;

        let mut raw = sig.r().to_vec_padded(width).map_err(error::signature_error)?;
        raw.extend(sig.s().to_vec_padded(width).map_err(error::signature_error)?);

        Ok(raw)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("field_size", &self.field_size)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Elliptic curve cryptography signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum SigningAlgorithm {
    /// ECDSA using SHA-256
    ES256,
    /// ECDSA using SHA-384
    ES384,
    /// ECDSA using SHA-512
    ES512,
}

impl SigningAlgorithm {
    /// The width of the underlying hash, in bits
    #[must_use]
    pub const fn hash_bits(self) -> u16 {
        match self {
            Self::ES256 => 256,
            Self::ES384 => 384,
            Self::ES512 => 512,
        }
    }

    pub(crate) fn message_digest(self) -> MessageDigest {
        match self {
            Self::ES256 => MessageDigest::sha256(),
            Self::ES384 => MessageDigest::sha384(),
            Self::ES512 => MessageDigest::sha512(),
        }
    }
}

impl From<SigningAlgorithm> for jwa::Algorithm {
    fn from(alg: SigningAlgorithm) -> Self {
        Self::EllipticCurve(alg)
    }
}

impl TryFrom<jwa::Algorithm> for SigningAlgorithm {
    type Error = error::InvalidAlgorithm;

    fn try_from(alg: jwa::Algorithm) -> Result<Self, Self::Error> {
        match alg {
            jwa::Algorithm::EllipticCurve(alg) => Ok(alg),
            _ => Err(error::invalid_algorithm(alg.to_string())),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
        };

        f.write_str(s)
    }
}
