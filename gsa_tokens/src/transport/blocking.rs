use std::time::Duration;

use reqwest::{blocking::Client, Method};

use super::{Headers, HttpRequest, HttpResponse, Transport, TransportFailure};

/// The default bound on a whole request, connection through body
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A transport backed by a blocking `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Constructs a transport with a [`DEFAULT_TIMEOUT`]
    ///
    /// # Errors
    ///
    /// The TLS backend could not be initialized.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Uses a preconfigured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    #[tracing::instrument(
        skip(self, request),
        fields(method = %request.method, url = %request.url),
    )]
    fn request(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder
            .body(request.body.clone())
            .send()
            .map_err(|e| TransportFailure::new(e.to_string()))?;

        let status = resp.status().as_u16();
        let mut headers = Headers::new();
        for (name, value) in resp.headers() {
            headers
                .entry(name.as_str().to_ascii_lowercase())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).trim().to_owned());
        }

        tracing::debug!(response.status = status, "received response");

        match resp.bytes() {
            Ok(body) => Ok(HttpResponse {
                status,
                headers,
                body: body.to_vec(),
            }),
            Err(error) => Err(TransportFailure::with_response(
                error.to_string(),
                HttpResponse {
                    status,
                    headers,
                    body: Vec::new(),
                },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Serves one canned response, returning the raw request it received
    fn serve_once(response: &'static str) -> std::io::Result<(String, thread::JoinHandle<String>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let url = format!("http://{}/token", listener.local_addr()?);

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0; 1024];
            while !received.ends_with(b"\r\n\r\ngrant=x") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response.as_bytes()).unwrap();
            String::from_utf8_lossy(&received).into_owned()
        });

        Ok((url, handle))
    }

    #[test]
    fn error_status_is_a_response() -> color_eyre::Result<()> {
        let body = r#"{"error":"invalid_grant"}"#;
        let (url, server) = serve_once(
            "HTTP/1.1 400 Bad Request\r\n\
             Content-Type: application/json\r\n\
             Vary: Origin\r\n\
             Vary: Referer\r\n\
             Content-Length: 25\r\n\
             Connection: close\r\n\
             \r\n\
             {\"error\":\"invalid_grant\"}",
        )?;

        let transport = ReqwestTransport::new()?;
        let resp = transport
            .request(&HttpRequest::form_post(url, "grant=x"))
            .expect("a 400 answer is still a response");

        assert_eq!(resp.status, 400);
        assert_eq!(resp.body, body.as_bytes());
        assert_eq!(
            resp.headers.get("content-type"),
            Some(&vec!["application/json".to_owned()])
        );
        assert_eq!(
            resp.headers.get("vary"),
            Some(&vec!["Origin".to_owned(), "Referer".to_owned()])
        );

        let request = server.join().expect("server thread panicked");
        assert!(request.starts_with("POST /token HTTP/1.1\r\n"));
        assert!(request
            .to_ascii_lowercase()
            .contains("content-type: application/x-www-form-urlencoded\r\n"));
        assert!(request.ends_with("\r\n\r\ngrant=x"));
        Ok(())
    }

    #[test]
    fn connection_failure_is_a_transport_failure() -> color_eyre::Result<()> {
        let transport = ReqwestTransport::new()?;
        // nothing listens on the discard port
        let err = transport
            .request(&HttpRequest::form_post("http://127.0.0.1:9/token", "a=b"))
            .unwrap_err();
        assert!(!err.message().is_empty());
        assert!(err.response().is_none());
        Ok(())
    }

    #[test]
    fn invalid_method_is_rejected_before_sending() -> color_eyre::Result<()> {
        let transport = ReqwestTransport::new()?;
        let mut request = HttpRequest::form_post("http://127.0.0.1:9/token", "");
        request.method = "NOT A METHOD".to_owned();
        let err = transport.request(&request).unwrap_err();
        assert!(err.response().is_none());
        Ok(())
    }
}
