//! Request and response types, and the executor seam the transport wraps.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use error_stack::Report;
use error_stack::ResultExt;
use reqwest::blocking::Client as BlockingClient;
use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest::StatusCode;

use crate::error::TransportError;
use crate::error::TransportResult;
use crate::TransportConfig;

/// A replayable HTTP request.
///
/// The body is held in memory so the same bytes can be resent on every attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer_auth(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    pub fn basic_auth(self, user: &str, password: &str) -> Self {
        let credentials = STANDARD.encode(format!("{user}:{password}"));
        self.header("Authorization", format!("Basic {credentials}"))
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Look up the first header with `name`, ignoring ASCII case.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes a single HTTP call with no retry semantics of its own.
pub trait RequestExecutor: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse>;
}

impl<T> RequestExecutor for &T
where T: RequestExecutor + ?Sized
{
    fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
        (**self).execute(request)
    }
}

impl<T> RequestExecutor for Arc<T>
where T: RequestExecutor + ?Sized
{
    fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
        (**self).execute(request)
    }
}

/// [`RequestExecutor`] backed by a blocking `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: BlockingClient,
    timeout_secs: u64,
}

impl ReqwestExecutor {
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        let client = BlockingClient::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .change_context(TransportError::Configuration {
                message: "Failed to create blocking HTTP client".into(),
            })?;

        Ok(Self {
            client,
            timeout_secs: config.request_timeout.as_secs(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> Report<TransportError> {
        let context = if err.is_timeout() {
            TransportError::Timeout {
                seconds: self.timeout_secs,
            }
        } else if err.is_builder() {
            TransportError::Configuration {
                message: err.to_string(),
            }
        } else {
            TransportError::Network {
                message: err.to_string(),
            }
        };
        Report::new(err).change_context(context)
    }
}

impl RequestExecutor for ReqwestExecutor {
    fn execute(&self, request: &HttpRequest) -> TransportResult<HttpResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let outgoing = builder
            .build()
            .map_err(|e| self.classify(e))
            .attach_printable_lazy(|| format!("url: {}", request.url))?;
        let response = self
            .client
            .execute(outgoing)
            .map_err(|e| self.classify(e))
            .attach_printable_lazy(|| format!("url: {}", request.url))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .map_err(|e| {
                Report::new(TransportError::Body {
                    message: e.to_string(),
                })
            })
            .attach_printable_lazy(|| format!("url: {}", request.url))?;

        Ok(HttpResponse::new(status, headers, body.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn basic_auth_encodes_credentials() {
        let request = HttpRequest::get("http://localhost/").basic_auth("user", "secret");

        assert_eq!(
            request.header_value("authorization"),
            Some("Basic dXNlcjpzZWNyZXQ=")
        );
    }

    #[test]
    fn bearer_auth_sets_authorization_header() {
        let request = HttpRequest::get("http://localhost/").bearer_auth("abc");

        assert_eq!(request.header_value("Authorization"), Some("Bearer abc"));
        assert!(request.body.is_none());
    }

    #[test]
    fn response_text_is_lossy() {
        let response = HttpResponse::new(StatusCode::OK, HeaderMap::new(), vec![b'o', b'k', 0xff]);

        assert_eq!(response.text(), "ok\u{fffd}");
    }
}
