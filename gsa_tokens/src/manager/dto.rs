//! DTOs for interacting with the OAuth2 token endpoint

use std::fmt;

use gsa_clock::{DurationSecs, UnixTime};
use gsa_jws::SignedAssertionRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    tokens::DEFAULT_TOKEN_TYPE,
    transport::{Headers, HttpResponse, TransportFailure},
    AccessToken, TokenRecord,
};

/// The grant type of the JWT-bearer flow
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// The `error` reported when the authority's answer is neither a token nor an error
pub const INVALID_RESPONSE: &str = "invalid_response";

/// An error reported by, or on the way to, the token endpoint
///
/// Fields returned by the authority beyond `error` and `error_description`
/// are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// The error code, or a description of a transport failure
    pub error: String,

    /// A human-readable explanation, if provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// The HTTP status, or `0` if no response was received
    #[serde(default)]
    pub httpcode: u16,

    /// The response headers
    #[serde(default)]
    pub headers: Headers,

    /// Any other fields of the error body
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorResponse {
    /// Constructs an error record with no response details
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: None,
            httpcode: 0,
            headers: Headers::new(),
            extra: Map::new(),
        }
    }

    fn from_body(mut body: Map<String, Value>, fallback_error: &str) -> Self {
        let error = match body.remove("error") {
            Some(Value::String(error)) => error,
            Some(Value::Null) | None => fallback_error.to_owned(),
            Some(other) => other.to_string(),
        };
        let error_description = match body.remove("error_description") {
            Some(Value::String(desc)) => Some(desc),
            Some(other) => {
                body.insert("error_description".to_owned(), other);
                None
            }
            None => None,
        };
        body.remove("httpcode");
        body.remove("headers");

        Self {
            error,
            error_description,
            httpcode: 0,
            headers: Headers::new(),
            extra: body,
        }
    }

    fn with_response(mut self, httpcode: u16, headers: Headers) -> Self {
        self.httpcode = httpcode;
        self.headers = headers;
        self
    }

    /// The first value of the named response header
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// When the authority asked to be retried, per its `retry-after` header
    ///
    /// The header may hold either a number of seconds after `now` or an HTTP
    /// date. Nothing is scheduled; acting on the time is left to the caller.
    #[must_use]
    pub fn retry_after(&self, now: UnixTime) -> Option<UnixTime> {
        let value = self.header("retry-after")?.trim();

        if let Ok(secs) = value.parse::<u64>() {
            return Some(now + DurationSecs(secs));
        }

        let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
        u64::try_from(date.timestamp()).ok().map(UnixTime)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.error)?;
        if let Some(desc) = &self.error_description {
            write!(f, ": {}", desc)?;
        }
        if self.httpcode != 0 {
            write!(f, " (HTTP {})", self.httpcode)?;
        }
        Ok(())
    }
}

/// The URL-encoded token request body
pub(super) fn form_body(assertion: &SignedAssertionRef) -> String {
    format!(
        "grant_type={}&assertion={}",
        urlencoding::encode(JWT_BEARER_GRANT_TYPE),
        urlencoding::encode(assertion.as_str()),
    )
}

/// What the authority's answer amounts to
#[derive(Debug)]
pub(super) enum TokenOutcome {
    Issued(TokenRecord),
    Rejected(ErrorResponse),
    Unintelligible(ErrorResponse),
}

/// Interprets a response received from the authority, whatever its status
pub(super) fn interpret_response(resp: HttpResponse, fetched_at: UnixTime) -> TokenOutcome {
    let body = match serde_json::from_slice::<Map<String, Value>>(&resp.body) {
        Ok(body) => body,
        Err(_) => {
            let mut error = ErrorResponse::new(INVALID_RESPONSE);
            error.error_description = Some("response body is not a JSON object".to_owned());
            return TokenOutcome::Unintelligible(error.with_response(resp.status, resp.headers));
        }
    };

    if body.get("error").map_or(false, |error| !error.is_null()) {
        let error = ErrorResponse::from_body(body, INVALID_RESPONSE);
        return TokenOutcome::Rejected(error.with_response(resp.status, resp.headers));
    }

    match token_from_body(&body, fetched_at) {
        Some(token) => TokenOutcome::Issued(token),
        None => {
            let mut error = ErrorResponse::new(INVALID_RESPONSE);
            error.error_description =
                Some("response lacks an access_token or expires_in".to_owned());
            TokenOutcome::Unintelligible(error.with_response(resp.status, resp.headers))
        }
    }
}

/// Builds the error record for a failed exchange
///
/// A partial response body that parses as a JSON object contributes its
/// fields. Its `error`, if any, is preferred over the transport's message.
pub(super) fn transport_error(failure: TransportFailure) -> ErrorResponse {
    let message = failure.message().to_owned();
    match failure.response() {
        Some(resp) => {
            let body = serde_json::from_slice::<Map<String, Value>>(&resp.body).unwrap_or_default();
            ErrorResponse::from_body(body, &message).with_response(resp.status, resp.headers.clone())
        }
        None => ErrorResponse::new(message),
    }
}

fn token_from_body(body: &Map<String, Value>, fetched_at: UnixTime) -> Option<TokenRecord> {
    let access_token = body.get("access_token")?.as_str()?;
    let expires_in = match body.get("expires_in")? {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let token_type = body
        .get("token_type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TOKEN_TYPE);

    Some(TokenRecord::issued(
        AccessToken::from(access_token),
        token_type,
        DurationSecs(expires_in),
        fetched_at,
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(status: u16, body: Value) -> HttpResponse {
        HttpResponse::new(status, body.to_string()).with_header("Content-Type", "application/json")
    }

    #[test]
    fn form_body_is_url_encoded() {
        let assertion = SignedAssertionRef::from_str("aGVhZA.Y2xhaW1z.c2ln-_");
        assert_eq!(
            form_body(assertion),
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer&assertion=aGVhZA.Y2xhaW1z.c2ln-_"
        );
    }

    #[test]
    fn issued_token_gets_expiry() {
        let outcome = interpret_response(
            response(200, json!({"access_token": "T1", "expires_in": 3600, "token_type": "Bearer"})),
            UnixTime(1000),
        );
        match outcome {
            TokenOutcome::Issued(token) => {
                assert_eq!(token.access_token().as_str(), "T1");
                assert_eq!(token.expires_at(), UnixTime(4540));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn lenient_token_fields() {
        let outcome = interpret_response(
            response(200, json!({"access_token": "T1", "expires_in": "120"})),
            UnixTime(0),
        );
        match outcome {
            TokenOutcome::Issued(token) => {
                assert_eq!(token.token_type(), "Bearer");
                assert_eq!(token.expires_in(), DurationSecs(120));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn error_wins_over_token_fields() {
        let outcome = interpret_response(
            response(
                400,
                json!({"error": "invalid_grant", "access_token": "T1", "expires_in": 3600}),
            ),
            UnixTime(0),
        );
        match outcome {
            TokenOutcome::Rejected(error) => {
                assert_eq!(error.error, "invalid_grant");
                assert_eq!(error.httpcode, 400);
                assert_eq!(error.extra.get("access_token"), Some(&json!("T1")));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn null_error_does_not_reject_token() {
        let outcome = interpret_response(
            response(
                200,
                json!({"access_token": "T1", "expires_in": 3600, "token_type": "Bearer", "error": null}),
            ),
            UnixTime(1000),
        );
        match outcome {
            TokenOutcome::Issued(token) => {
                assert_eq!(token.access_token().as_str(), "T1");
                assert_eq!(token.expires_at(), UnixTime(4540));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn null_error_without_token_is_unintelligible() {
        match interpret_response(response(200, json!({"error": null})), UnixTime(0)) {
            TokenOutcome::Unintelligible(error) => assert_eq!(error.error, INVALID_RESPONSE),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn structured_error_description_is_kept() {
        let outcome = interpret_response(
            response(400, json!({"error": "invalid_grant", "error_description": {"detail": "x"}})),
            UnixTime(0),
        );
        match outcome {
            TokenOutcome::Rejected(error) => {
                assert_eq!(error.error, "invalid_grant");
                assert_eq!(error.error_description, None);
                assert_eq!(
                    error.extra.get("error_description"),
                    Some(&json!({"detail": "x"}))
                );
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let outcome = interpret_response(
            response(400, json!({"error": "invalid_grant", "error_description": 17})),
            UnixTime(0),
        );
        match outcome {
            TokenOutcome::Rejected(error) => {
                assert_eq!(error.extra.get("error_description"), Some(&json!(17)));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn unintelligible_responses_become_errors() {
        for (status, body) in [
            (502, b"<html>Bad Gateway</html>".to_vec()),
            (200, b"[]".to_vec()),
            (200, br#"{"access_token": "T1"}"#.to_vec()),
            (200, br#"{"expires_in": 3600}"#.to_vec()),
            (200, br#"{"access_token": 7, "expires_in": 3600}"#.to_vec()),
            (200, br#"{"access_token": "T1", "expires_in": -5}"#.to_vec()),
        ] {
            match interpret_response(HttpResponse::new(status, body), UnixTime(0)) {
                TokenOutcome::Unintelligible(error) => {
                    assert_eq!(error.error, INVALID_RESPONSE);
                    assert_eq!(error.httpcode, status);
                    assert!(error.error_description.is_some());
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[test]
    fn transport_error_without_response() {
        let error = transport_error(TransportFailure::new("connection refused"));
        assert_eq!(error, ErrorResponse::new("connection refused"));
        assert_eq!(error.to_string(), "connection refused");
    }

    #[test]
    fn transport_error_keeps_partial_response() {
        let partial = response(503, json!({"error_description": "try later"}))
            .with_header("Retry-After", "120");
        let error = transport_error(TransportFailure::with_response("body truncated", partial));

        assert_eq!(error.error, "body truncated");
        assert_eq!(error.error_description.as_deref(), Some("try later"));
        assert_eq!(error.httpcode, 503);
        assert_eq!(error.header("retry-after"), Some("120"));
        assert_eq!(error.retry_after(UnixTime(1000)), Some(UnixTime(1120)));
    }

    #[test]
    fn transport_error_prefers_body_error() {
        let partial = HttpResponse::new(500, br#"{"error": "internal_failure"}"#.to_vec());
        let error = transport_error(TransportFailure::with_response("reset", partial));
        assert_eq!(error.error, "internal_failure");
    }

    #[test]
    fn retry_after_accepts_http_dates() {
        let mut error = ErrorResponse::new("rate_limited");
        assert_eq!(error.retry_after(UnixTime(0)), None);

        error
            .headers
            .insert("retry-after".to_owned(), vec!["Wed, 21 Oct 2015 07:28:00 GMT".to_owned()]);
        assert_eq!(error.retry_after(UnixTime(0)), Some(UnixTime(1_445_412_480)));

        error
            .headers
            .insert("retry-after".to_owned(), vec!["soon".to_owned()]);
        assert_eq!(error.retry_after(UnixTime(0)), None);
    }

    #[test]
    fn serializes_as_flat_record() -> color_eyre::Result<()> {
        let error = ErrorResponse::from_body(
            serde_json::from_value(json!({
                "error": "invalid_grant",
                "error_description": "Invalid JWT Signature.",
                "error_uri": "https://example.com/help",
            }))?,
            INVALID_RESPONSE,
        )
        .with_response(400, Headers::new());

        assert_eq!(
            serde_json::to_value(&error)?,
            json!({
                "error": "invalid_grant",
                "error_description": "Invalid JWT Signature.",
                "error_uri": "https://example.com/help",
                "httpcode": 400,
                "headers": {},
            })
        );
        assert_eq!(error.to_string(), "invalid_grant: Invalid JWT Signature. (HTTP 400)");
        Ok(())
    }
}
