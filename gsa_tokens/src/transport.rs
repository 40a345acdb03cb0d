//! The HTTP collaborator used to reach the token endpoint
//!
//! The token manager never deals with HTTP framing. A [`Transport`] sends a
//! request and reports either the response it received, whatever its
//! status, or a failure to obtain one.

use std::{collections::BTreeMap, fmt, sync::Arc};

use thiserror::Error;

#[cfg(feature = "reqwest")]
mod blocking;

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use blocking::ReqwestTransport;

/// Response headers keyed by lower-cased name, each with every value received
pub type Headers = BTreeMap<String, Vec<String>>;

/// An outgoing request
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// The HTTP method
    pub method: String,
    /// The target URL
    pub url: String,
    /// Request headers as name/value pairs
    pub headers: Vec<(String, String)>,
    /// The request body
    pub body: String,
}

impl HttpRequest {
    /// Constructs a `POST` of a URL-encoded form
    pub fn form_post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: "POST".to_owned(),
            url: url.into(),
            headers: vec![(
                "Content-Type".to_owned(),
                "application/x-www-form-urlencoded".to_owned(),
            )],
            body: body.into(),
        }
    }

    /// The first value of the named header, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A response received from the server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// The HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// The raw response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Constructs a response with no headers
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Adds a header value, lower-casing its name
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }
}

/// No usable response was obtained
///
/// If the failure happened after a response started arriving, whatever was
/// received is kept.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportFailure {
    message: String,
    response: Option<HttpResponse>,
}

impl TransportFailure {
    /// A failure before any response was received
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// A failure after a partial response was received
    pub fn with_response(message: impl Into<String>, response: HttpResponse) -> Self {
        Self {
            message: message.into(),
            response: Some(response),
        }
    }

    /// A description of the failure
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The partial response, if any
    #[must_use]
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }
}

/// Sends requests on behalf of the token manager
///
/// Implementations should enforce a bounded timeout and report it as an
/// ordinary [`TransportFailure`].
pub trait Transport {
    /// Sends `request`, returning the response regardless of its status
    ///
    /// # Errors
    ///
    /// No response could be obtained.
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

impl<T: Transport + ?Sized> Transport for &'_ T {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        (**self).request(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        (**self).request(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        (**self).request(request)
    }
}
