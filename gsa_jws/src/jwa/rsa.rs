//! RSA JSON Web Algorithm implementations

use std::{fmt, sync::Arc};

use openssl::pkey::{PKey, Private};
use ring::signature::RsaKeyPair;
use serde::{Deserialize, Serialize};

use crate::{error, jwa};

/// RSA private key
#[derive(Clone)]
#[must_use]
pub struct PrivateKey {
    der: Vec<u8>,
    ring_cache: Arc<RsaKeyPair>,
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for PrivateKey {}

impl PrivateKey {
    /// Imports an RSA private key from a PEM file
    ///
    /// Both PKCS#8 (`BEGIN PRIVATE KEY`) and PKCS#1 (`BEGIN RSA PRIVATE KEY`)
    /// forms are accepted.
    ///
    /// # Errors
    ///
    /// * The provided PEM file cannot be parsed as a private key
    /// * The key is not an RSA key
    pub fn from_pem(pem: &[u8]) -> Result<Self, error::SigningError> {
        let key = jwa::load_private_key(pem)?;
        Ok(Self::from_openssl_key(&key, SigningAlgorithm::RS256)?)
    }

    pub(crate) fn from_openssl_key(
        key: &PKey<Private>,
        alg: SigningAlgorithm,
    ) -> Result<Self, error::SigningError> {
        let kind = jwa::key_kind(key);
        if kind != error::KeyKind::Rsa {
            return Err(error::key_type_mismatch(alg, kind).into());
        }

        let rsa = key.rsa().map_err(error::key_load)?;
        let der = rsa.private_key_to_der().map_err(error::key_load)?;

        let ring_cache =
            Arc::new(RsaKeyPair::from_der(&der).map_err(|e| error::key_load(e.to_string()))?);

        Ok(Self { der, ring_cache })
    }

    /// The RSA key pair in DER encoding
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Signs `data` using PKCS#1 v1.5 padding and the algorithm's hash
    ///
    /// # Errors
    ///
    /// The signing engine failed.
    pub fn sign(&self, alg: SigningAlgorithm, data: &[u8]) -> Result<Vec<u8>, error::SignatureError> {
        let mut buf = vec![0; self.ring_cache.public().modulus_len()];
        self.ring_cache
            .sign(
                alg.into_signing_params(),
                &ring::rand::SystemRandom::new(),
                data,
                &mut buf,
            )
            .map_err(|e| error::signature_error(e.to_string()))?;
        Ok(buf)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("modulus_len", &self.ring_cache.public().modulus_len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// RSA public/private key signing algorithms
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
pub enum SigningAlgorithm {
    /// RSA using SHA-256 and PKCS 1.5
    RS256,
    /// RSA using SHA-384 and PKCS 1.5
    RS384,
    /// RSA using SHA-512 and PKCS 1.5
    RS512,
}

impl SigningAlgorithm {
    /// The width of the underlying hash, in bits
    #[must_use]
    pub const fn hash_bits(self) -> u16 {
        match self {
            Self::RS256 => 256,
            Self::RS384 => 384,
            Self::RS512 => 512,
        }
    }

    fn into_signing_params(self) -> &'static dyn ring::signature::RsaEncoding {
        match self {
            SigningAlgorithm::RS256 => &ring::signature::RSA_PKCS1_SHA256,
            SigningAlgorithm::RS384 => &ring::signature::RSA_PKCS1_SHA384,
            SigningAlgorithm::RS512 => &ring::signature::RSA_PKCS1_SHA512,
        }
    }
}

impl From<SigningAlgorithm> for jwa::Algorithm {
    fn from(alg: SigningAlgorithm) -> Self {
        Self::Rsa(alg)
    }
}

impl TryFrom<jwa::Algorithm> for SigningAlgorithm {
    type Error = error::InvalidAlgorithm;

    fn try_from(alg: jwa::Algorithm) -> Result<Self, Self::Error> {
        match alg {
            jwa::Algorithm::Rsa(alg) => Ok(alg),
            _ => Err(error::invalid_algorithm(alg.to_string())),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
        };

        f.write_str(s)
    }
}
