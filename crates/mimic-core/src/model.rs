//! Persisted and middleware-exchanged data model.
//!
//! A [`Payload`] pairs the canonical description of a request with the
//! response that answered it. Payloads are what the capture store persists
//! and what middleware processes receive on stdin, so the serde field names
//! here are a wire contract.

use std::collections::HashMap;

use bytes::Bytes;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::fingerprint;

/// Header map as carried in payloads: original names mapped to their values
/// in the order they appeared on the wire.
pub type HeaderValues = HashMap<String, Vec<String>>;

/// Canonical description of one intercepted HTTP request.
///
/// Only `destination`, `path`, `method`, `query` and `body` participate in
/// the request fingerprint; the remaining fields ride along for middleware
/// and for rebuilding outgoing requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, rename = "remoteAddr")]
    pub remote_addr: String,
    #[serde(default)]
    pub headers: HeaderValues,
}

impl RequestDetails {
    /// Builds request details from buffered request parts.
    ///
    /// The destination and scheme are passed in explicitly because the
    /// frontend may override them (endpoint redirection, MITM'd tunnels).
    pub fn from_parts(
        parts: &http::request::Parts,
        body: &Bytes,
        destination: String,
        scheme: String,
        remote_addr: String,
    ) -> Self {
        Self {
            path: parts.uri.path().to_string(),
            method: parts.method.to_string(),
            destination,
            scheme,
            query: parts.uri.query().unwrap_or("").to_string(),
            body: String::from_utf8_lossy(body).into_owned(),
            remote_addr,
            headers: headers_to_map(&parts.headers),
        }
    }

    /// Returns the stable content hash identifying this request.
    pub fn fingerprint(&self) -> String {
        fingerprint::fingerprint(
            &self.destination,
            &self.path,
            &self.method,
            &self.query,
            &self.body,
        )
    }
}

/// Recorded response half of a payload. The body is carried as text; the
/// headers tell the client how to interpret it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedResponse {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: HeaderValues,
}

/// The unit of persistence and of middleware exchange.
///
/// `id` is the fingerprint of `request` at the moment of capture. Every
/// field tolerates absence on deserialization so middleware can emit only
/// the parts it cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub response: RecordedResponse,
    #[serde(default)]
    pub request: RequestDetails,
    #[serde(default)]
    pub id: String,
}

impl Payload {
    /// Pairs a request with the response that answered it.
    pub fn new(request: RequestDetails, response: RecordedResponse) -> Self {
        let id = request.fingerprint();
        Self {
            response,
            request,
            id,
        }
    }

    /// Builds a payload with only the request half populated.
    pub fn from_request(request: RequestDetails) -> Self {
        Self::new(request, RecordedResponse::default())
    }
}

/// Flattens an [`http::HeaderMap`] into the payload header representation,
/// preserving per-name value order.
pub fn headers_to_map(headers: &HeaderMap) -> HeaderValues {
    let mut map: HeaderValues = HashMap::new();
    for (name, value) in headers.iter() {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

/// Rebuilds an [`http::HeaderMap`] from payload headers.
///
/// Entries that are not valid HTTP header names or values are dropped with a
/// warning rather than failing the whole message.
pub fn map_to_headers(map: &HeaderValues) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in map {
        let Ok(name) = http::HeaderName::from_bytes(name.as_bytes()) else {
            tracing::warn!(header = %name, "dropping invalid header name");
            continue;
        };
        for value in values {
            match http::HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                }
                Err(_) => {
                    tracing::warn!(header = %name, "dropping invalid header value");
                }
            }
        }
    }
    headers
}
