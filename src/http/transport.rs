use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use url::Url;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single outbound POST.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutboundRequest {
    pub fn post(url: Url) -> Self {
        Self {
            url,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: String) -> Self {
        self.body = body;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(#[source] BoxError),

    #[error("connection failed: {0}")]
    Connect(#[source] BoxError),

    #[error("request cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(#[source] BoxError),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(Box::new(err))
        } else if err.is_connect() {
            TransportError::Connect(Box::new(err))
        } else {
            TransportError::Http(Box::new(err))
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return status and body, whatever the status.
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] on a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.post(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.body(request.body).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}
