//! Signed JSON Web Token assertions for the OAuth2 JWT-bearer grant
//!
//! This crate implements the creation side of the JOSE standards needed to
//! authenticate a service account:
//!
//! * JSON Web Signature (JWS): [RFC7515][]
//! * JSON Web Algorithms (JWA): [RFC7518][], restricted to `HS`, `RS`, and
//!   `ES` with 256, 384, or 512 bit hashes
//! * JSON Web Token (JWT): [RFC7519][]
//!
//! Validation of received tokens is out of scope.
//!
//! [RFC7515]: https://tools.ietf.org/html/rfc7515
//! [RFC7518]: https://tools.ietf.org/html/rfc7518
//! [RFC7519]: https://tools.ietf.org/html/rfc7519
//!
//! # Example
//!
//! ```
//! use gsa_clock::UnixTime;
//! use gsa_jws::{jwa, jwt, JwsSigner, JwtSigner};
//!
//! let header = jwt::JwtHeader::new(jwa::Algorithm::HS256).with_key_id("test key");
//! let claims = jwt::JwtClaims::new(
//!     "svc@example.iam.gserviceaccount.com",
//!     "https://www.googleapis.com/auth/devstorage.read_only",
//!     "https://oauth2.googleapis.com/token",
//!     UnixTime(1_000),
//! );
//!
//! let assertion = JwsSigner
//!     .create_assertion(&header, &claims, b"shared secret", None)
//!     .unwrap();
//!
//! assert_eq!(assertion.to_string(), "***ASSERTION***");
//! assert_eq!(
//!     assertion.claims_field("exp").unwrap(),
//!     Some(serde_json::Value::from(4_600))
//! );
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod b64;
pub mod error;
pub mod jwa;
pub mod jws;
pub mod jwt;

#[doc(inline)]
pub use error::SigningError;
#[doc(inline)]
pub use jws::{JwsSigner, JwtSigner};
#[doc(inline)]
pub use jwt::{SignedAssertion, SignedAssertionRef};
