//! Rebuilding HTTP messages from payloads.
//!
//! A [`Constructor`] is a short-lived value bound to one payload. It can
//! route the payload through middleware and then rebuild either half of the
//! exchange: an outgoing request for the upstream client, or a client-bound
//! response.

use bytes::Bytes;
use http::header;

use crate::error::{CoreError, MiddlewareError, Result};
use crate::middleware;
use crate::model::{map_to_headers, Payload};

/// Short-lived builder bound to an inbound request's payload.
#[derive(Debug, Clone)]
pub struct Constructor {
    payload: Payload,
}

impl Constructor {
    /// Binds a constructor to a payload.
    pub fn new(payload: Payload) -> Self {
        Self { payload }
    }

    /// Returns the current payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Runs the middleware command over the current payload and swaps the
    /// result in place. On failure the payload is left untouched.
    pub async fn apply_middleware(
        &mut self,
        command: &str,
    ) -> std::result::Result<(), MiddlewareError> {
        let transformed = middleware::execute(command, &self.payload).await?;
        self.payload = transformed;
        Ok(())
    }

    /// Rebuilds an outgoing request from the payload's request half.
    ///
    /// The URL is assembled fresh from scheme, destination, path and query,
    /// and the stored `host` and `content-length` headers are dropped so the
    /// upstream client derives both itself.
    pub fn reconstruct_request(&self) -> Result<http::Request<Bytes>> {
        let details = &self.payload.request;

        let scheme = if details.scheme.is_empty() {
            "http"
        } else {
            details.scheme.as_str()
        };
        let mut uri = format!("{scheme}://{}{}", details.destination, details.path);
        if !details.query.is_empty() {
            uri.push('?');
            uri.push_str(&details.query);
        }

        let method = http::Method::from_bytes(details.method.as_bytes())
            .map_err(|e| CoreError::Reconstruct(format!("invalid method: {e}")))?;
        let uri: http::Uri = uri
            .parse()
            .map_err(|e| CoreError::Reconstruct(format!("invalid url: {e}")))?;

        let mut headers = map_to_headers(&details.headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let mut request = http::Request::new(Bytes::from(details.body.clone().into_bytes()));
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        Ok(request)
    }

    /// Rebuilds a client-bound response from the payload's response half.
    ///
    /// Framing headers are dropped since the body is re-sent from a full
    /// in-memory buffer.
    pub fn reconstruct_response(&self) -> Result<http::Response<Bytes>> {
        let recorded = &self.payload.response;

        let status = http::StatusCode::from_u16(recorded.status)
            .map_err(|e| CoreError::Reconstruct(format!("invalid status: {e}")))?;

        let mut headers = map_to_headers(&recorded.headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::TRANSFER_ENCODING);

        let mut response = http::Response::new(Bytes::from(recorded.body.clone().into_bytes()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeaderValues, RecordedResponse, RequestDetails};

    fn payload() -> Payload {
        let mut request_headers = HeaderValues::new();
        request_headers.insert("host".into(), vec!["stale.example".into()]);
        request_headers.insert("content-length".into(), vec!["999".into()]);
        request_headers.insert("accept".into(), vec!["text/plain".into()]);

        let mut response_headers = HeaderValues::new();
        response_headers.insert("content-type".into(), vec!["text/plain".into()]);
        response_headers.insert("transfer-encoding".into(), vec!["chunked".into()]);
        response_headers.insert("set-cookie".into(), vec!["a=1".into(), "b=2".into()]);

        Payload::new(
            RequestDetails {
                path: "/v1/ping".into(),
                method: "GET".into(),
                destination: "api.test:8080".into(),
                scheme: "http".into(),
                query: "x=1".into(),
                body: String::new(),
                remote_addr: "127.0.0.1:5".into(),
                headers: request_headers,
            },
            RecordedResponse {
                status: 200,
                body: "pong".into(),
                headers: response_headers,
            },
        )
    }

    #[test]
    fn reconstruct_request_assembles_the_url() {
        let request = Constructor::new(payload()).reconstruct_request().unwrap();
        assert_eq!(request.method(), http::Method::GET);
        assert_eq!(
            request.uri().to_string(),
            "http://api.test:8080/v1/ping?x=1"
        );
        assert_eq!(request.body(), "");
    }

    #[test]
    fn reconstruct_request_scrubs_derived_headers() {
        let request = Constructor::new(payload()).reconstruct_request().unwrap();
        assert!(request.headers().get(header::HOST).is_none());
        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
        assert_eq!(request.headers().get("accept").unwrap(), "text/plain");
    }

    #[test]
    fn reconstruct_request_defaults_to_http_scheme() {
        let mut payload = payload();
        payload.request.scheme = String::new();
        payload.request.query = String::new();
        let request = Constructor::new(payload).reconstruct_request().unwrap();
        assert_eq!(request.uri().scheme_str(), Some("http"));
        assert_eq!(request.uri().query(), None);
    }

    #[test]
    fn reconstruct_request_rejects_garbage_method() {
        let mut payload = payload();
        payload.request.method = "NOT A METHOD".into();
        let err = Constructor::new(payload).reconstruct_request().unwrap_err();
        assert!(matches!(err, CoreError::Reconstruct(_)));
    }

    #[test]
    fn reconstruct_response_copies_status_headers_body() {
        let response = Constructor::new(payload()).reconstruct_response().unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), "pong");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain"
        );
        let cookies: Vec<_> = response
            .headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies, vec!["a=1", "b=2"]);
    }

    #[test]
    fn reconstruct_response_drops_framing_headers() {
        let response = Constructor::new(payload()).reconstruct_response().unwrap();
        assert!(response.headers().get(header::TRANSFER_ENCODING).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
    }

    #[test]
    fn reconstruct_response_rejects_invalid_status() {
        let mut payload = payload();
        payload.response.status = 99;
        let err = Constructor::new(payload).reconstruct_response().unwrap_err();
        assert!(matches!(err, CoreError::Reconstruct(_)));
    }
}
