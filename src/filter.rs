//! Edge authentication.
//!
//! [`Gate`] holds the per-request decision and knows nothing about actix;
//! [`AuthenticationFilter`] is the middleware that applies it, adding the
//! identity header on success and short-circuiting with a JSON error otherwise.

use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderName, HeaderValue};
use actix_web::{Error, HttpMessage, ResponseError};
use actix_web_httpauth::headers::authorization::{Bearer, Scheme};
use futures_util::future::LocalBoxFuture;
use tracing::{debug, warn};

use crate::auth::TokenService;
use crate::error::GatewayError;
use crate::models::Claims;
use crate::policy::{normalize_path, Access, SecurityPolicy};

/// Header carrying the authenticated subject to downstream services.
pub const IDENTITY_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub enum Admission {
    /// Public path; forwarded untouched.
    Public,
    Authenticated { subject: String, claims: Claims },
}

/// Pulls the token out of a `Bearer <token>` header value.
pub fn bearer_token(value: &HeaderValue) -> Result<String, GatewayError> {
    let bearer = Bearer::parse(value).map_err(|_| GatewayError::MalformedHeader)?;
    let token = bearer.token().trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(GatewayError::MalformedHeader);
    }
    Ok(token.to_string())
}

/// Header form of a token subject, or `None` when the subject cannot travel
/// in `X-User-Id` unchanged (control characters, surrounding whitespace).
pub fn identity_value(subject: &str) -> Option<HeaderValue> {
    if subject.trim() != subject {
        return None;
    }
    HeaderValue::from_bytes(subject.as_bytes()).ok()
}

#[derive(Clone)]
pub struct Gate {
    policy: Arc<SecurityPolicy>,
    tokens: Arc<TokenService>,
}

impl Gate {
    pub fn new(policy: Arc<SecurityPolicy>, tokens: Arc<TokenService>) -> Self {
        Self { policy, tokens }
    }

    pub fn admit(
        &self,
        path: &str,
        authorization: Option<&HeaderValue>,
    ) -> Result<Admission, GatewayError> {
        let path = normalize_path(path).ok_or(GatewayError::InvalidPath)?;
        if self.policy.access(&path) == Access::Public {
            return Ok(Admission::Public);
        }

        let value = authorization.ok_or(GatewayError::MissingCredentials)?;
        let token = bearer_token(value)?;

        match self.tokens.verify(&token) {
            Ok(claims) => Ok(Admission::Authenticated {
                subject: claims.sub.clone(),
                claims,
            }),
            Err(err) => {
                warn!(%path, reason = %err, "token rejected");
                Err(GatewayError::InvalidOrExpiredToken)
            }
        }
    }
}

pub struct AuthenticationFilter {
    gate: Gate,
}

impl AuthenticationFilter {
    pub fn new(gate: Gate) -> Self {
        Self { gate }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthenticationFilter
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthenticationMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthenticationMiddleware {
            service: Rc::new(service),
            gate: self.gate.clone(),
        }))
    }
}

pub struct AuthenticationMiddleware<S> {
    service: Rc<S>,
    gate: Gate,
}

fn reject<B>(req: ServiceRequest, err: GatewayError) -> ServiceResponse<EitherBody<B>> {
    warn!(method = %req.method(), path = %req.path(), reason = %err, "request rejected");
    req.into_response(err.error_response()).map_into_right_body()
}

impl<S, B> Service<ServiceRequest> for AuthenticationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let admission = self
            .gate
            .admit(req.path(), req.headers().get(header::AUTHORIZATION));

        match admission {
            Ok(Admission::Public) => {}
            Ok(Admission::Authenticated { subject, claims }) => {
                let Some(value) = identity_value(&subject) else {
                    warn!(user = ?subject, "token subject is not a valid header value");
                    let res = reject(req, GatewayError::InvalidOrExpiredToken);
                    return Box::pin(async move { Ok(res) });
                };
                debug!(user = %subject, path = %req.path(), "token validated");
                req.headers_mut()
                    .insert(HeaderName::from_static(IDENTITY_HEADER), value);
                req.extensions_mut().insert(claims);
            }
            Err(err) => {
                let res = reject(req, err);
                return Box::pin(async move { Ok(res) });
            }
        }

        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::parse_patterns;
    use chrono::{Duration, Utc};
    use serde_json::Map;

    const SECRET: &[u8] = b"test_secret_key_for_testing_purposes_only";

    fn gate() -> (Gate, Arc<TokenService>) {
        let tokens = Arc::new(TokenService::new(SECRET, Duration::minutes(5)).unwrap());
        let policy = SecurityPolicy::with_public_paths(
            parse_patterns("/auth/**,/actuator/**,/eureka/**").unwrap(),
        );
        (Gate::new(Arc::new(policy), tokens.clone()), tokens)
    }

    fn header(s: &str) -> HeaderValue {
        HeaderValue::from_str(s).unwrap()
    }

    #[test]
    fn public_path_needs_no_header() {
        let (gate, _) = gate();
        assert!(matches!(gate.admit("/auth/login", None), Ok(Admission::Public)));
    }

    #[test]
    fn public_path_ignores_garbage_header() {
        let (gate, _) = gate();
        let value = header("garbage");
        assert!(matches!(
            gate.admit("/actuator/health", Some(&value)),
            Ok(Admission::Public)
        ));
    }

    #[test]
    fn protected_path_without_header() {
        let (gate, _) = gate();
        assert!(matches!(
            gate.admit("/currency-exchange/from/USD/to/INR", None),
            Err(GatewayError::MissingCredentials)
        ));
    }

    #[test]
    fn header_without_scheme_is_malformed() {
        let (gate, tokens) = gate();
        let token = tokens.issue("alice", Map::new()).unwrap();
        for raw in ["sometoken".to_string(), token.clone(), format!("Basic {token}"), "Bearer ".into()] {
            let value = header(&raw);
            assert!(
                matches!(gate.admit("/api", Some(&value)), Err(GatewayError::MalformedHeader)),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn bad_token_is_invalid_or_expired() {
        let (gate, tokens) = gate();
        let expired = tokens
            .issue_at("alice", Map::new(), Utc::now() - Duration::minutes(6))
            .unwrap();
        for raw in [format!("Bearer {expired}"), "Bearer sometoken".to_string()] {
            let value = header(&raw);
            assert!(matches!(
                gate.admit("/api", Some(&value)),
                Err(GatewayError::InvalidOrExpiredToken)
            ));
        }
    }

    #[test]
    fn dot_segments_are_refused_before_the_policy() {
        let (gate, tokens) = gate();
        let token = tokens.issue("alice", Map::new()).unwrap();
        let value = header(&format!("Bearer {token}"));
        for path in ["/eureka/../internal/admin", "/auth/%2e%2e/internal", "/eureka/./x"] {
            assert!(matches!(gate.admit(path, None), Err(GatewayError::InvalidPath)));
            assert!(matches!(
                gate.admit(path, Some(&value)),
                Err(GatewayError::InvalidPath)
            ));
        }
    }

    #[test]
    fn doubled_slashes_do_not_change_the_decision() {
        let (gate, _) = gate();
        assert!(matches!(gate.admit("//auth//login", None), Ok(Admission::Public)));
        assert!(matches!(
            gate.admit("//currency-exchange//x", None),
            Err(GatewayError::MissingCredentials)
        ));
    }

    #[test]
    fn identity_value_refuses_unsafe_subjects() {
        assert_eq!(identity_value("alice").unwrap(), "alice");
        assert!(identity_value("jos\u{e9}").is_some());
        assert!(identity_value("eve\nX-Admin: 1").is_none());
        assert!(identity_value(" alice").is_none());
        assert!(identity_value("alice\t").is_none());
    }

    #[test]
    fn valid_token_yields_subject() {
        let (gate, tokens) = gate();
        let token = tokens.issue("alice", Map::new()).unwrap();
        let value = header(&format!("Bearer {token}"));

        match gate.admit("/currency-conversion/x", Some(&value)) {
            Ok(Admission::Authenticated { subject, claims }) => {
                assert_eq!(subject, "alice");
                assert_eq!(claims.sub, "alice");
            }
            other => panic!("expected authenticated, got {other:?}"),
        }
    }
}
