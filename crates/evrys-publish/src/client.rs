//! HTTP client for the ingestion service.

use std::time::Duration;

use async_trait::async_trait;
use evrys_types::{AppendRequest, Code, ErrorBody, Event, GetEventResponse, WireEvent};
use reqwest::{Response, Url};
use tracing::Span;

use crate::error::PublishError;
use crate::pipeline::EventSink;

/// How long [`EvrysClient::dial`] waits for the service by default.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Base URL of an ingestion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Parses an endpoint. A bare `host:port` is taken as plain http.
    pub fn parse(raw: &str) -> Result<Self, PublishError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PublishError::MissingEndpoint);
        }

        let with_scheme = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("http://{raw}")
        };
        let invalid = |reason: String| PublishError::InvalidEndpoint {
            endpoint: raw.to_string(),
            reason,
        };

        let url = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }
        Ok(Self(url))
    }

    /// The endpoint with `segments` appended to its path.
    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.0.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected ingestion service client.
///
/// Requests carry no implicit timeout; callers bound them by dropping the
/// future.
#[derive(Debug, Clone)]
pub struct EvrysClient {
    http: reqwest::Client,
    endpoint: Endpoint,
    span: Span,
}

impl EvrysClient {
    /// Connects to the service, probing `GET /health` for at most `timeout`.
    pub async fn dial(
        endpoint: Endpoint,
        timeout: Duration,
        span: Span,
    ) -> Result<Self, PublishError> {
        let target = endpoint.to_string();
        let dial_error = |source: crate::error::BoxError| PublishError::Dial {
            target: target.clone(),
            source,
        };

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| dial_error(e.into()))?;

        let health = http.get(endpoint.join(&["health"])).send();
        match tokio::time::timeout(timeout, health).await {
            Ok(Ok(response)) if response.status().is_success() => {}
            Ok(Ok(response)) => {
                return Err(dial_error(
                    format!("health check returned {}", response.status()).into(),
                ))
            }
            Ok(Err(e)) => return Err(dial_error(e.into())),
            Err(elapsed) => return Err(dial_error(elapsed.into())),
        }

        tracing::debug!(parent: &span, endpoint = %target, "dialed ingestion service");
        Ok(Self {
            http,
            endpoint,
            span,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Appends one event.
    pub async fn append(&self, event: &Event) -> Result<(), PublishError> {
        let request = AppendRequest {
            event: Some(WireEvent::from(event.clone())),
        };
        let response = self
            .http
            .post(self.endpoint.join(&["v1", "events"]))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = error_from(response).await;
            tracing::debug!(parent: &self.span, event_id = %event.id, error = %err, "append rejected");
            return Err(err);
        }
        Ok(())
    }

    /// Fetches one event by id.
    pub async fn get_event(&self, id: &str) -> Result<Event, PublishError> {
        let response = self
            .http
            .get(self.endpoint.join(&["v1", "events", id]))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        let body: GetEventResponse = response.json().await?;
        Ok(body.event)
    }
}

#[async_trait]
impl EventSink for EvrysClient {
    async fn append(&self, event: &Event) -> Result<(), PublishError> {
        EvrysClient::append(self, event).await
    }
}

/// Decodes the error body of a failed response, falling back to the HTTP
/// status when the body is not an [`ErrorBody`].
async fn error_from(response: Response) -> PublishError {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => PublishError::from_status(body.code, body.error),
        Err(_) => PublishError::from_status(
            Code::from_http_status(status.as_u16()),
            status.to_string(),
        ),
    }
}
