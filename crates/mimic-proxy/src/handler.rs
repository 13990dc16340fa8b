//! HTTP request handler wiring the proxy frontend to the traffic engine.
//!
//! Three concerns live here: deciding which CONNECT tunnels get decrypted,
//! hijacking plaintext tunnels into the raw relay, and turning every other
//! request into a buffered [`RequestDetails`] for the engine. Direct
//! (non-proxied) requests are rewritten to the configured upstream endpoint
//! before they reach the engine.

use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hudsucker::{
    hyper::{header, Method, Request, Response, StatusCode},
    Body, HttpContext, HttpHandler, RequestOrResponse,
};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;

use mimic_core::{RequestDetails, Settings, TrafficEngine, TRANSIT_HEADER, TRANSIT_VALUE};

use crate::relay;

/// Helper to convert bytes to Body
fn bytes_to_body(bytes: Bytes) -> Body {
    Body::from(Full::new(bytes))
}

/// Checks if a request is a WebSocket upgrade request.
fn is_websocket_upgrade(req: &Request<Body>) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// HTTP handler for the MITM proxy.
#[derive(Clone)]
pub struct ProxyHandler {
    engine: Arc<TrafficEngine>,
    settings: Arc<Settings>,
}

impl ProxyHandler {
    /// Creates a handler around a shared engine.
    pub fn new(engine: Arc<TrafficEngine>, settings: Arc<Settings>) -> Self {
        Self { engine, settings }
    }

    /// Handles CONNECT requests.
    ///
    /// Matching destinations on the TLS port continue into hudsucker's MITM
    /// path. Matching destinations on any other port are plaintext tunnels:
    /// the connection is hijacked after the 200 and relayed message-by-
    /// message over raw TCP. Everything else is left for the transparent
    /// byte-for-byte tunnel.
    fn handle_connect(&self, mut req: Request<Body>) -> RequestOrResponse {
        let Some(authority) = req.uri().authority().cloned() else {
            return RequestOrResponse::Request(req);
        };

        let matches = self.settings.destination.is_match(authority.host());
        let port = authority.port_u16().unwrap_or(443);

        if matches && port != 443 {
            tracing::info!(authority = %authority, "hijacking plaintext tunnel");
            let upgrade = hudsucker::hyper::upgrade::on(&mut req);

            tokio::spawn(async move {
                match upgrade.await {
                    Ok(upgraded) => {
                        let io = TokioIo::new(upgraded);
                        if let Err(err) = relay::relay(io, authority.as_str()).await {
                            tracing::warn!(error = %err, authority = %authority, "tunnel relay ended");
                        }
                    }
                    Err(err) => tracing::warn!(error = %err, "connection upgrade failed"),
                }
            });

            // Response::new defaults to 200, the CONNECT acknowledgement.
            return RequestOrResponse::Response(Response::new(Body::empty()));
        }

        RequestOrResponse::Request(req)
    }

    /// Buffers a request and routes it through the engine.
    async fn process(&self, ctx: &HttpContext, req: Request<Body>) -> RequestOrResponse {
        let (parts, body) = req.into_parts();

        // The upstream override wins over whatever the client addressed;
        // direct requests fall back to their Host header.
        let (destination, scheme) = if let Some(endpoint) = &self.settings.endpoint {
            (endpoint.clone(), "http".to_string())
        } else if let Some(authority) = parts.uri.authority() {
            (
                authority.to_string(),
                parts.uri.scheme_str().unwrap_or("http").to_string(),
            )
        } else if let Some(host) = parts
            .headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
        {
            (host.to_string(), "http".to_string())
        } else {
            tracing::warn!("request carries no destination and no endpoint is configured");
            let mut res = Response::new(bytes_to_body(Bytes::from_static(
                b"no upstream destination for this request",
            )));
            *res.status_mut() = StatusCode::BAD_GATEWAY;
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            return RequestOrResponse::Response(res);
        };

        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                // A half-read request still proceeds with an empty body.
                tracing::warn!(error = %err, "failed to read request body");
                Bytes::new()
            }
        };

        let details = RequestDetails::from_parts(
            &parts,
            &body_bytes,
            destination,
            scheme,
            ctx.client_addr.to_string(),
        );

        let response = self.engine.handle(details).await;
        let (parts, body) = response.into_parts();
        RequestOrResponse::Response(Response::from_parts(parts, bytes_to_body(body)))
    }
}

impl HttpHandler for ProxyHandler {
    async fn should_intercept(&mut self, _ctx: &HttpContext, req: &Request<Body>) -> bool {
        let Some(authority) = req.uri().authority() else {
            return false;
        };
        self.settings.destination.is_match(authority.host())
            && authority.port_u16().unwrap_or(443) == 443
    }

    async fn handle_request(
        &mut self,
        ctx: &HttpContext,
        mut req: Request<Body>,
    ) -> RequestOrResponse {
        if req.method() == Method::CONNECT {
            return self.handle_connect(req);
        }

        // WebSocket traffic is proxied as-is; the engine only deals in
        // whole request/response exchanges.
        if is_websocket_upgrade(&req) {
            tracing::debug!(uri = %req.uri(), "passing through websocket upgrade");
            req.headers_mut().remove("sec-websocket-extensions");
            return RequestOrResponse::Request(req);
        }

        self.process(ctx, req).await
    }

    async fn handle_response(
        &mut self,
        _ctx: &HttpContext,
        mut res: Response<Body>,
    ) -> Response<Body> {
        if !res.headers().contains_key(TRANSIT_HEADER) {
            res.headers_mut().insert(
                TRANSIT_HEADER,
                header::HeaderValue::from_static(TRANSIT_VALUE),
            );
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimic_core::{Mode, Settings};
    use mimic_storage::CaptureStore;

    fn handler(mode: Mode, destination: &str, endpoint: Option<String>) -> ProxyHandler {
        let settings =
            Arc::new(Settings::new(mode, destination, None, endpoint, false).unwrap());
        let cache = Arc::new(CaptureStore::in_memory().unwrap());
        let engine = Arc::new(TrafficEngine::new(settings.clone(), cache).unwrap());
        ProxyHandler::new(engine, settings)
    }

    fn ctx() -> HttpContext {
        HttpContext {
            client_addr: "127.0.0.1:52100".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn intercepts_matching_tls_destinations() {
        let mut handler = handler(Mode::Virtualize, "api\\.test", None);

        let connect = Request::builder()
            .method(Method::CONNECT)
            .uri("api.test:443")
            .body(Body::empty())
            .unwrap();
        assert!(handler.should_intercept(&ctx(), &connect).await);

        let other = Request::builder()
            .method(Method::CONNECT)
            .uri("other.example:443")
            .body(Body::empty())
            .unwrap();
        assert!(!handler.should_intercept(&ctx(), &other).await);
    }

    #[tokio::test]
    async fn does_not_intercept_plaintext_ports() {
        let mut handler = handler(Mode::Virtualize, "api\\.test", None);

        let connect = Request::builder()
            .method(Method::CONNECT)
            .uri("api.test:80")
            .body(Body::empty())
            .unwrap();
        assert!(!handler.should_intercept(&ctx(), &connect).await);
    }

    #[tokio::test]
    async fn virtualize_miss_produces_412_through_the_handler() {
        let mut handler = handler(Mode::Virtualize, ".", None);

        let req = Request::builder()
            .method(Method::GET)
            .uri("http://api.test/v1/ping?x=1")
            .body(Body::empty())
            .unwrap();

        match handler.handle_request(&ctx(), req).await {
            RequestOrResponse::Response(res) => {
                assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED);
                assert_eq!(
                    res.headers().get(TRANSIT_HEADER).unwrap(),
                    TRANSIT_VALUE
                );
            }
            RequestOrResponse::Request(_) => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn direct_request_without_endpoint_uses_host_header() {
        let mut handler = handler(Mode::Virtualize, ".", None);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/ping")
            .header(header::HOST, "api.test")
            .body(Body::empty())
            .unwrap();

        // Routed into the engine: an empty store answers 412, not a
        // destination error.
        match handler.handle_request(&ctx(), req).await {
            RequestOrResponse::Response(res) => {
                assert_eq!(res.status(), StatusCode::PRECONDITION_FAILED)
            }
            RequestOrResponse::Request(_) => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn direct_request_without_any_destination_fails() {
        let mut handler = handler(Mode::Virtualize, ".", None);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/v1/ping")
            .body(Body::empty())
            .unwrap();

        match handler.handle_request(&ctx(), req).await {
            RequestOrResponse::Response(res) => {
                assert_eq!(res.status(), StatusCode::BAD_GATEWAY)
            }
            RequestOrResponse::Request(_) => panic!("expected a response"),
        }
    }

    #[tokio::test]
    async fn websocket_upgrades_pass_through() {
        let mut handler = handler(Mode::Virtualize, ".", None);

        let req = Request::builder()
            .method(Method::GET)
            .uri("http://api.test/socket")
            .header(header::UPGRADE, "websocket")
            .header("sec-websocket-extensions", "permessage-deflate")
            .body(Body::empty())
            .unwrap();

        match handler.handle_request(&ctx(), req).await {
            RequestOrResponse::Request(req) => {
                assert!(req.headers().get("sec-websocket-extensions").is_none());
            }
            RequestOrResponse::Response(_) => panic!("expected passthrough"),
        }
    }

    #[tokio::test]
    async fn handle_response_stamps_passthrough_traffic() {
        let mut handler = handler(Mode::Virtualize, ".", None);

        let res = Response::builder().status(200).body(Body::empty()).unwrap();
        let stamped = handler.handle_response(&ctx(), res).await;
        assert_eq!(
            stamped.headers().get(TRANSIT_HEADER).unwrap(),
            TRANSIT_VALUE
        );
    }
}
