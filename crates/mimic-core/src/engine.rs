//! The per-request traffic engine.
//!
//! One engine instance is shared by every request task. For each buffered
//! inbound request it runs the active mode (capture, virtualize, synthesize
//! or modify) and always produces a client-bound response: every failure
//! path is folded into a proxy-level response rather than an error.

use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};

use crate::cache::Cache;
use crate::codec;
use crate::constructor::Constructor;
use crate::error::{CoreError, Result};
use crate::model::{headers_to_map, Payload, RecordedResponse, RequestDetails};
use crate::settings::{Mode, Settings};

/// Response header marking proxy transit.
pub const TRANSIT_HEADER: &str = "x-mimic";

/// Value carried by the transit marker.
pub const TRANSIT_VALUE: &str = "transited";

/// Dispatches every buffered request to the active processing mode.
pub struct TrafficEngine {
    settings: Arc<Settings>,
    cache: Arc<dyn Cache>,
    client: reqwest::Client,
}

impl TrafficEngine {
    /// Creates an engine with its own upstream HTTP client.
    pub fn new(settings: Arc<Settings>, cache: Arc<dyn Cache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build upstream client: {e}")))?;
        Ok(Self {
            settings,
            cache,
            client,
        })
    }

    /// Returns the runtime settings this engine was built with.
    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Processes one request according to the active mode.
    pub async fn handle(&self, details: RequestDetails) -> http::Response<Bytes> {
        tracing::debug!(
            mode = %self.settings.mode,
            method = %details.method,
            host = %details.destination,
            path = %details.path,
            "processing request"
        );

        match self.settings.mode {
            Mode::Capture => self.capture(details).await,
            Mode::Virtualize => self.virtualize(details).await,
            Mode::Synthesize => self.synthesize(details).await,
            Mode::Modify => self.modify(details).await,
        }
    }

    /// Forwards the request upstream and persists the exchange.
    ///
    /// The client gets the upstream response whether or not the store write
    /// succeeded; a failed write is logged and accepted as data loss.
    async fn capture(&self, details: RequestDetails) -> http::Response<Bytes> {
        let (status, headers, body) = match self.forward(&details).await {
            Ok(exchange) => exchange,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    host = %details.destination,
                    method = %details.method,
                    path = %details.path,
                    "could not forward request"
                );
                return proxy_failure("could not reach upstream");
            }
        };

        let recorded = RecordedResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
            headers: headers_to_map(&headers),
        };
        let payload = Payload::new(details, recorded);

        match codec::encode(&payload) {
            Ok(encoded) => match self.cache.set(payload.id.as_bytes(), &encoded) {
                Ok(()) => tracing::info!(
                    key = %payload.id,
                    host = %payload.request.destination,
                    path = %payload.request.path,
                    "captured exchange"
                ),
                Err(err) => {
                    tracing::warn!(error = %err, key = %payload.id, "could not persist exchange")
                }
            },
            Err(err) => tracing::error!(error = %err, "could not encode exchange"),
        }

        upstream_response(status, &headers, body)
    }

    /// Serves the request from the capture store; never contacts upstream.
    async fn virtualize(&self, details: RequestDetails) -> http::Response<Bytes> {
        let key = details.fingerprint();

        let encoded = match self.cache.get(key.as_bytes()) {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                tracing::info!(
                    key = %key,
                    host = %details.destination,
                    path = %details.path,
                    "no recorded exchange"
                );
                return not_recorded();
            }
            Err(err) => {
                // A failing store degrades to a miss.
                tracing::warn!(error = %err, key = %key, "store lookup failed");
                return not_recorded();
            }
        };

        let payload = match codec::decode(&encoded) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, key = %key, "stored payload is unreadable");
                return not_recorded();
            }
        };

        let mut constructor = Constructor::new(payload);
        if let Some(command) = &self.settings.middleware {
            if let Err(err) = constructor.apply_middleware(command).await {
                tracing::warn!(
                    error = %err,
                    middleware = %command,
                    "middleware failed, replaying stored response unchanged"
                );
            }
        }

        match constructor.reconstruct_response() {
            Ok(response) => {
                tracing::info!(key = %key, status = response.status().as_u16(), "replaying exchange");
                stamp(response)
            }
            Err(err) => {
                tracing::error!(error = %err, key = %key, "could not rebuild recorded response");
                proxy_failure("could not rebuild recorded response")
            }
        }
    }

    /// Manufactures a response purely from middleware; no upstream call and
    /// no store write.
    async fn synthesize(&self, details: RequestDetails) -> http::Response<Bytes> {
        let Some(command) = &self.settings.middleware else {
            return proxy_failure("no middleware configured");
        };

        let mut constructor = Constructor::new(Payload::from_request(details));
        if let Err(err) = constructor.apply_middleware(command).await {
            tracing::error!(error = %err, middleware = %command, "middleware failed");
            return proxy_failure("middleware failed");
        }

        match constructor.reconstruct_response() {
            Ok(response) => stamp(response),
            Err(err) => {
                tracing::error!(error = %err, "could not rebuild synthesized response");
                proxy_failure("could not rebuild synthesized response")
            }
        }
    }

    /// Forwards the request upstream and transforms the real response
    /// through middleware. Nothing is persisted.
    async fn modify(&self, details: RequestDetails) -> http::Response<Bytes> {
        let Some(command) = &self.settings.middleware else {
            return proxy_failure("no middleware configured");
        };

        let (status, headers, body) = match self.forward(&details).await {
            Ok(exchange) => exchange,
            Err(err) => {
                tracing::warn!(error = %err, host = %details.destination, "could not forward request");
                return proxy_failure("could not reach upstream");
            }
        };

        let recorded = RecordedResponse {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
            headers: headers_to_map(&headers),
        };

        let mut constructor = Constructor::new(Payload::new(details, recorded));
        if let Err(err) = constructor.apply_middleware(command).await {
            tracing::error!(error = %err, middleware = %command, "middleware failed");
            return proxy_failure("middleware failed");
        }

        match constructor.reconstruct_response() {
            Ok(response) => stamp(response),
            Err(err) => {
                tracing::error!(error = %err, "could not rebuild modified response");
                proxy_failure("could not rebuild modified response")
            }
        }
    }

    /// Performs the upstream round-trip and buffers the response body.
    async fn forward(
        &self,
        details: &RequestDetails,
    ) -> Result<(StatusCode, HeaderMap, Bytes)> {
        let request = Constructor::new(Payload::from_request(details.clone()))
            .reconstruct_request()?;
        let request = reqwest::Request::try_from(request)
            .map_err(|e| CoreError::Reconstruct(e.to_string()))?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(CoreError::UpstreamUnreachable)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(CoreError::BodyRead)?;

        tracing::debug!(
            host = %details.destination,
            status = status.as_u16(),
            bytes = body.len(),
            "upstream responded"
        );

        Ok((status, headers, body))
    }
}

/// Adds the transit marker to a response.
fn stamp(mut response: http::Response<Bytes>) -> http::Response<Bytes> {
    response
        .headers_mut()
        .insert(TRANSIT_HEADER, HeaderValue::from_static(TRANSIT_VALUE));
    response
}

/// Builds the client-bound copy of an upstream response.
fn upstream_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
) -> http::Response<Bytes> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    for (name, value) in headers {
        // The body is re-sent from a full buffer, so the original framing
        // headers no longer apply.
        if name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING {
            continue;
        }
        response.headers_mut().append(name.clone(), value.clone());
    }
    stamp(response)
}

/// Plain-text response for a request that was never captured.
fn not_recorded() -> http::Response<Bytes> {
    text_response(
        StatusCode::PRECONDITION_FAILED,
        "request was never recorded; capture it first",
    )
}

/// Plain-text proxy-level failure response.
fn proxy_failure(message: &str) -> http::Response<Bytes> {
    text_response(StatusCode::BAD_GATEWAY, message)
}

fn text_response(status: StatusCode, message: &str) -> http::Response<Bytes> {
    let mut response = http::Response::new(Bytes::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    stamp(response)
}
