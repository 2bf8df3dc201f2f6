//! Forwarding of admitted requests to the downstream services.
//!
//! The route table is static: the first pattern matching the request path
//! picks the upstream. The path is normalized the same way the filter
//! normalizes it before the policy check, so the route and the upstream URL
//! are derived from the path that was authorized. One attempt per request;
//! failures surface as 502.

use std::time::Duration;

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use reqwest::Url;
use tracing::{debug, error};

use crate::app::AppState;
use crate::config::RouteConfig;
use crate::error::GatewayError;
use crate::policy::normalize_path;

/// Headers that describe a single connection and must not be relayed.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteConfig>) -> Self {
        Self { routes }
    }

    pub fn resolve(&self, path: &str) -> Option<&Url> {
        self.routes
            .iter()
            .find(|route| route.pattern.matches(path))
            .map(|route| &route.upstream)
    }
}

/// Joins the upstream base with the inbound path and query.
pub fn target_url(upstream: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = upstream.clone();
    let base = upstream.path().trim_end_matches('/');
    url.set_path(&format!("{base}{path}"));
    url.set_query(query.filter(|q| !q.is_empty()));
    url
}

pub struct Forwarder {
    client: reqwest::Client,
    routes: RouteTable,
}

impl Forwarder {
    pub fn new(routes: RouteTable, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| GatewayError::Upstream(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, routes })
    }

    pub async fn forward(
        &self,
        req: &HttpRequest,
        body: web::Bytes,
    ) -> Result<HttpResponse, GatewayError> {
        let path = normalize_path(req.path()).ok_or(GatewayError::InvalidPath)?;
        let upstream = self
            .routes
            .resolve(&path)
            .ok_or_else(|| GatewayError::NoRoute(path.clone()))?;
        let url = target_url(upstream, &path, req.uri().query());

        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let mut outbound = self.client.request(method, url.clone()).body(body);
        for (name, value) in req.headers() {
            if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
                continue;
            }
            outbound = outbound.header(name.as_str(), value.as_bytes());
        }

        debug!(%url, method = %req.method(), "forwarding");
        let upstream_resp = outbound.send().await.map_err(|e| {
            error!(%url, error = %e, "upstream request failed");
            GatewayError::Upstream(e.to_string())
        })?;

        let status = StatusCode::from_u16(upstream_resp.status().as_u16())
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;
        let headers = relay_headers(upstream_resp.headers());
        let bytes = upstream_resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Upstream(e.to_string()))?;

        let mut resp = HttpResponse::build(status);
        for (name, value) in headers.iter() {
            resp.append_header((name.clone(), value.clone()));
        }
        Ok(resp.body(bytes))
    }
}

fn relay_headers(upstream: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

/// Default service: everything not handled by the gateway itself.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    state.forwarder.forward(&req, body).await
}
