//! Creation of JSON Web Signatures
//!
//! The specifications for this standard can be found in [RFC7515][].
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515

use serde::Serialize;

use crate::{
    b64, error,
    jwa::{self, Algorithm},
    jwt::{HasAlgorithm, SignedAssertion},
};

/// Produces signatures and signed compact assertions
///
/// `key` is either PEM-encoded private key material (for `RS*` and `ES*`)
/// or the raw shared secret (for `HS*`).
pub trait JwtSigner {
    /// Signs `data` with `key` using `alg`, returning the raw signature bytes
    ///
    /// # Errors
    ///
    /// * The key cannot be loaded
    /// * The key does not belong to the family required by `alg`
    /// * The signing engine fails
    fn sign(&self, data: &[u8], key: &[u8], alg: Algorithm) -> Result<Vec<u8>, error::SigningError>;

    /// Serializes `header` and `claims`, signs them, and returns the compact token
    ///
    /// The signature is produced with `alg_override` when given, otherwise with
    /// the algorithm named in the header's `alg` field. An override is not
    /// written back into the header, so the two may deliberately diverge:
    /// callers rotate signing algorithms this way without rebuilding headers.
    /// Strict JWT consumers will reject such a token, since they trust `alg`.
    ///
    /// # Errors
    ///
    /// * The header's `alg` is not a supported code and no override is given
    /// * Serialization of either the header or claims fails
    /// * Any error from [`sign()`][Self::sign()]
    fn create_assertion<H, C>(
        &self,
        header: &H,
        claims: &C,
        key: &[u8],
        alg_override: Option<Algorithm>,
    ) -> Result<SignedAssertion, error::SigningError>
    where
        H: Serialize + HasAlgorithm,
        C: Serialize,
    {
        use std::fmt::Write;

        let alg = match alg_override {
            Some(alg) => alg,
            None => header.alg().parse()?,
        };

        let h_raw = serde_json::to_vec(header).map_err(error::malformed_jwt_header)?;
        let c_raw = serde_json::to_vec(claims).map_err(error::malformed_jwt_payload)?;

        let mut message = String::new();
        write!(message, "{}.{}", b64::encode(h_raw), b64::encode(c_raw))
            .map_err(error::malformed_jwt_header)?;

        let signature = self.sign(message.as_bytes(), key, alg)?;

        message.push('.');
        message.push_str(&b64::encode(signature));

        Ok(SignedAssertion::new(message))
    }
}

impl<T: JwtSigner + ?Sized> JwtSigner for &'_ T {
    #[inline]
    fn sign(&self, data: &[u8], key: &[u8], alg: Algorithm) -> Result<Vec<u8>, error::SigningError> {
        (**self).sign(data, key, alg)
    }
}

/// The default signer, backed by `ring` and OpenSSL
#[derive(Clone, Copy, Debug, Default)]
pub struct JwsSigner;

impl JwtSigner for JwsSigner {
    fn sign(&self, data: &[u8], key: &[u8], alg: Algorithm) -> Result<Vec<u8>, error::SigningError> {
        let signature = match alg {
            Algorithm::Hmac(alg) => {
                if key.is_empty() {
                    return Err(error::key_load("empty HMAC secret").into());
                }
                jwa::Hmac::new(key).sign(alg, data)
            }
            Algorithm::Rsa(alg) => {
                let pkey = jwa::load_private_key(key)?;
                jwa::rsa::PrivateKey::from_openssl_key(&pkey, alg)?.sign(alg, data)?
            }
            Algorithm::EllipticCurve(alg) => {
                let pkey = jwa::load_private_key(key)?;
                jwa::ec::PrivateKey::from_openssl_key(pkey, alg)?.sign(alg, data)?
            }
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(%alg, signature_len = signature.len(), "produced signature");

        Ok(signature)
    }
}
