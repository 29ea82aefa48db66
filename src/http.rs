//! Shared outbound HTTP transport.
//!
//! Every manager sends its requests through [`Transport`] rather than
//! opening connections itself, so connect timeout and `User-Agent` are
//! fixed in one place.

use std::time::Duration;

use reqwest::{Client, Method};

use crate::error::{Error, Result};

const USER_AGENT: &str = "ci-onboard";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status code and body of a completed exchange.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the resource was reported absent.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// A request body with its content type.
#[derive(Debug, Clone)]
pub struct Payload {
    pub content_type: &'static str,
    pub body: String,
}

impl Payload {
    pub fn xml(body: impl Into<String>) -> Self {
        Self {
            content_type: "application/xml",
            body: body.into(),
        }
    }

    pub fn json(body: impl Into<String>) -> Self {
        Self {
            content_type: "application/json",
            body: body.into(),
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain",
            body: body.into(),
        }
    }
}

/// HTTP transport over a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Send a request, optionally with HTTP Basic credentials and a body,
    /// and read the full response.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        auth: Option<(&str, &str)>,
        payload: Option<Payload>,
    ) -> Result<WireResponse> {
        let mut request = self.client.request(method, url);

        if let Some((user, secret)) = auth {
            request = request.basic_auth(user, Some(secret));
        }
        if let Some(payload) = payload {
            request = request
                .header(reqwest::header::CONTENT_TYPE, payload.content_type)
                .body(payload.body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(WireResponse { status, body })
    }

    /// Send a request and fail unless the response is 2xx.
    ///
    /// `context` names the attempted operation in the error.
    pub async fn expect_success(
        &self,
        method: Method,
        url: &str,
        auth: Option<(&str, &str)>,
        payload: Option<Payload>,
        context: &str,
    ) -> Result<WireResponse> {
        let response = self.send(method, url, auth, payload).await?;
        if !response.is_success() {
            return Err(Error::remote(response.status, context));
        }
        Ok(response)
    }
}
