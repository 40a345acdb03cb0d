//! Headers, claims, and signed assertions for the JWT-bearer grant
//!
//! An assertion is a compact JSON Web Token ([RFC7519][]) whose claims
//! identify the service account (`iss`), the requested scopes (`scope`),
//! and the token endpoint it is presented to (`aud`).
//!
//! [RFC7519]: https://tools.ietf.org/html/rfc7519

use std::fmt;

use aliri_braid::braid;
use gsa_clock::{DurationSecs, UnixTime};
use serde::{Deserialize, Serialize};

use crate::{b64, error, jwa};

/// How long a freshly minted assertion remains acceptable to the token endpoint
pub const ASSERTION_LIFETIME: DurationSecs = DurationSecs(3600);

/// The `typ` header value of every assertion
pub const JWT_TYPE: &str = "JWT";

/// Indicates that the type names the algorithm used to sign it
pub trait HasAlgorithm {
    /// The algorithm code, which may not be a supported one
    fn alg(&self) -> &str;
}

impl HasAlgorithm for serde_json::Map<String, serde_json::Value> {
    fn alg(&self) -> &str {
        self.get("alg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

impl<T: HasAlgorithm + ?Sized> HasAlgorithm for &'_ T {
    #[inline]
    fn alg(&self) -> &str {
        (**self).alg()
    }
}

/// Identifies the key an assertion was signed with
#[braid(serde, ref_doc = "A borrowed reference to a [`KeyId`]")]
pub struct KeyId;

/// The header of an assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    alg: String,
    typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kid: Option<KeyId>,
}

impl JwtHeader {
    /// A header for the given algorithm, without a key ID
    pub fn new(alg: jwa::Algorithm) -> Self {
        Self::with_alg_code(alg.to_string())
    }

    /// A header naming an arbitrary algorithm code
    ///
    /// The code is checked only when the header is used for signing.
    pub fn with_alg_code(alg: impl Into<String>) -> Self {
        Self {
            alg: alg.into(),
            typ: JWT_TYPE.to_owned(),
            kid: None,
        }
    }

    /// Sets the key ID
    #[must_use]
    pub fn with_key_id(mut self, kid: impl Into<KeyId>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// The key ID, if set
    #[must_use]
    pub fn kid(&self) -> Option<&KeyIdRef> {
        self.kid.as_deref()
    }

    /// The token type, always `JWT`
    #[must_use]
    pub fn typ(&self) -> &str {
        &self.typ
    }
}

impl HasAlgorithm for JwtHeader {
    fn alg(&self) -> &str {
        &self.alg
    }
}

/// The claims of a JWT-bearer assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    iss: String,
    scope: String,
    aud: String,
    exp: UnixTime,
    iat: UnixTime,
}

impl JwtClaims {
    /// Claims issued at `issued_at`, expiring [`ASSERTION_LIFETIME`] later
    pub fn new(
        iss: impl Into<String>,
        scope: impl Into<String>,
        aud: impl Into<String>,
        issued_at: UnixTime,
    ) -> Self {
        Self {
            iss: iss.into(),
            scope: scope.into(),
            aud: aud.into(),
            exp: issued_at + ASSERTION_LIFETIME,
            iat: issued_at,
        }
    }

    /// The issuing service account
    #[must_use]
    pub fn iss(&self) -> &str {
        &self.iss
    }

    /// The space-separated scopes requested
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The intended audience, the token endpoint
    #[must_use]
    pub fn aud(&self) -> &str {
        &self.aud
    }

    /// When the assertion stops being acceptable
    #[must_use]
    pub fn exp(&self) -> UnixTime {
        self.exp
    }

    /// When the assertion was issued
    #[must_use]
    pub fn iat(&self) -> UnixTime {
        self.iat
    }
}

/// A signed compact assertion
///
/// This type provides custom implementations of [`Display`][SignedAssertionRef#impl-Display] and
/// [`Debug`][SignedAssertionRef#impl-Debug] to prevent unintentional disclosures of the
/// assertion, which is a bearer credential until it expires.
#[braid(
    serde,
    debug = "owned",
    display = "owned",
    ord = "omit",
    ref_doc = "A borrowed reference to a [`SignedAssertion`]"
)]
#[must_use]
pub struct SignedAssertion;

impl SignedAssertionRef {
    /// Reads a field of the claims segment without verifying the signature
    ///
    /// Only useful for diagnostics. Nothing read this way is trustworthy.
    ///
    /// # Errors
    ///
    /// The assertion is not three dot-separated segments, or its claims
    /// segment is not a base64url-encoded JSON object.
    pub fn claims_field(&self, name: &str) -> Result<Option<serde_json::Value>, error::MalformedJwt> {
        self.segment_field(1, name)
    }

    /// Reads a field of the header segment
    ///
    /// # Errors
    ///
    /// The assertion is not three dot-separated segments, or its header
    /// segment is not a base64url-encoded JSON object.
    pub fn header_field(&self, name: &str) -> Result<Option<serde_json::Value>, error::MalformedJwt> {
        self.segment_field(0, name)
    }

    /// The signing input, `header.claims`
    #[must_use]
    pub fn message(&self) -> &str {
        self.0.rsplit_once('.').map_or(&self.0, |(message, _)| message)
    }

    fn segment_field(
        &self,
        idx: usize,
        name: &str,
    ) -> Result<Option<serde_json::Value>, error::MalformedJwt> {
        let segments: Vec<&str> = self.0.split('.').collect();
        if segments.len() != 3 {
            return Err(error::malformed_jwt());
        }

        let raw = b64::decode(segments[idx]).map_err(error::malformed_jwt_with)?;
        let mut map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_slice(&raw).map_err(error::malformed_jwt_with)?;

        Ok(map.remove(name))
    }
}

/// By default, this type holds potentially sensitive information. To prevent
/// unintentional disclosure, it will not print its contents unless the
/// alternate format is requested, i.e. `{:#?}`. In that form the header and
/// claims are printed, and the signature is elided entirely unless a width
/// is given, e.g. `{:#10?}` reveals up to nine characters of it.
impl fmt::Debug for SignedAssertionRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            f.write_str("\"")?;
            reveal_message(&self.0, f, 0)?;
            f.write_str("\"")
        } else {
            f.write_str("***ASSERTION***")
        }
    }
}

/// Like [`Debug`][SignedAssertionRef#impl-Debug], but with the alternate
/// form `{:#}` printing the full assertion unless a width limits the
/// signature.
impl fmt::Display for SignedAssertionRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if f.alternate() {
            reveal_message(&self.0, f, usize::MAX)
        } else {
            f.write_str("***ASSERTION***")
        }
    }
}

fn reveal_message(token: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    match token.rfind('.') {
        Some(last_period) => {
            f.write_str(&token[..=last_period])?;
            limited_reveal(&token[last_period + 1..], f, default_len)
        }
        None => limited_reveal(token, f, default_len),
    }
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use serde_json::json;

    use super::*;
    use crate::jws::{JwsSigner, JwtSigner};

    fn hs256_assertion() -> Result<SignedAssertion> {
        let header = JwtHeader::new(jwa::Algorithm::HS256).with_key_id("abc123");
        let claims = JwtClaims::new(
            "svc@example.iam.gserviceaccount.com",
            "scope-a scope-b",
            "https://oauth2.googleapis.com/token",
            UnixTime(1000),
        );
        Ok(JwsSigner.create_assertion(&header, &claims, b"secret", None)?)
    }

    #[test]
    fn claims_expire_an_hour_after_issue() {
        let claims = JwtClaims::new("iss", "scope", "aud", UnixTime(1000));
        assert_eq!(claims.iat(), UnixTime(1000));
        assert_eq!(claims.exp(), UnixTime(4600));
    }

    #[test]
    fn serialized_claims_keep_field_set() -> Result<()> {
        let claims = JwtClaims::new("iss", "a b", "aud", UnixTime(1000));
        let value = serde_json::to_value(&claims)?;
        assert_eq!(
            value,
            json!({"iss": "iss", "scope": "a b", "aud": "aud", "exp": 4600, "iat": 1000})
        );
        let back: JwtClaims = serde_json::from_value(value)?;
        assert_eq!(back, claims);
        Ok(())
    }

    #[test]
    fn header_omits_missing_key_id() -> Result<()> {
        let header = JwtHeader::new(jwa::Algorithm::RS256);
        assert_eq!(
            serde_json::to_value(&header)?,
            json!({"alg": "RS256", "typ": "JWT"})
        );

        let header = header.with_key_id("k1");
        assert_eq!(header.kid().map(KeyIdRef::as_str), Some("k1"));
        assert_eq!(
            serde_json::to_value(&header)?,
            json!({"alg": "RS256", "typ": "JWT", "kid": "k1"})
        );
        Ok(())
    }

    #[test]
    fn map_headers_name_their_algorithm() -> Result<()> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_value(json!({"alg": "ES384", "typ": "JWT"}))?;
        assert_eq!(map.alg(), "ES384");

        let map = serde_json::Map::new();
        assert_eq!(map.alg(), "");
        let err = JwsSigner
            .create_assertion(&map, &json!({}), b"secret", None)
            .unwrap_err();
        assert!(err.is_invalid_algorithm());
        Ok(())
    }

    #[test]
    fn reads_claims_without_verification() -> Result<()> {
        let token = hs256_assertion()?;
        assert_eq!(
            token.claims_field("iss")?,
            Some(json!("svc@example.iam.gserviceaccount.com"))
        );
        assert_eq!(token.claims_field("exp")?, Some(json!(4600)));
        assert_eq!(token.claims_field("sub")?, None);
        assert_eq!(token.header_field("kid")?, Some(json!("abc123")));
        Ok(())
    }

    #[test]
    fn rejects_malformed_assertions() {
        for raw in ["", "a.b", "a.b.c.d", "e30.!!!.sig", "e30.bm90IGpzb24.sig"] {
            let token = SignedAssertionRef::from_str(raw);
            assert!(token.claims_field("iss").is_err(), "accepted {:?}", raw);
        }
    }

    #[test]
    fn message_excludes_signature() -> Result<()> {
        let token = hs256_assertion()?;
        let message = token.message();
        assert_eq!(message.matches('.').count(), 1);
        assert!(token.as_str().starts_with(message));
        Ok(())
    }

    #[test]
    fn formatting_hides_assertion() -> Result<()> {
        let token = hs256_assertion()?;
        let signature = token.as_str().rsplit('.').next().unwrap_or_default();

        assert_eq!(format!("{}", token), "***ASSERTION***");
        assert_eq!(format!("{:?}", token), "***ASSERTION***");
        assert_eq!(format!("{:#}", token), token.as_str());

        let debug = format!("{:#?}", token);
        assert_eq!(debug, format!("\"{}.…\"", token.message()));
        assert!(!debug.contains(signature));

        let partial = format!("{:#5?}", token);
        assert!(partial.ends_with(&format!("{}…\"", &signature[..4])));
        Ok(())
    }
}
