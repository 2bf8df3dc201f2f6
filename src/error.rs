use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorBody;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing authorization header")]
    MissingCredentials,
    #[error("invalid header format")]
    MalformedHeader,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("User already exists")]
    DuplicateRegistration,
    /// Bad signing key or TTL. Only raised while building the token service.
    #[error("signing configuration error: {0}")]
    SigningConfiguration(String),
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid request path")]
    InvalidPath,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("no route for {0}")]
    NoRoute(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredentials
            | GatewayError::MalformedHeader
            | GatewayError::InvalidOrExpiredToken
            | GatewayError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GatewayError::DuplicateRegistration => StatusCode::CONFLICT,
            GatewayError::SigningConfiguration(_)
            | GatewayError::TokenGeneration(_)
            | GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::BadRequest(_) | GatewayError::InvalidPath => StatusCode::BAD_REQUEST,
            GatewayError::NoRoute(_) => StatusCode::NOT_FOUND,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_of(err: GatewayError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn auth_failures_are_401_with_reason_phrase() {
        for err in [
            GatewayError::MissingCredentials,
            GatewayError::MalformedHeader,
            GatewayError::InvalidOrExpiredToken,
        ] {
            let expected = err.to_string();
            let (status, body) = body_of(err).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["error"], "Unauthorized");
            assert_eq!(body["message"], expected);
        }
    }

    #[actix_web::test]
    async fn duplicate_registration_is_conflict() {
        let (status, body) = body_of(GatewayError::DuplicateRegistration).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "User already exists");
    }

    #[actix_web::test]
    async fn hashing_failure_is_server_side() {
        let (status, body) = body_of(GatewayError::Internal("cost 40".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal Server Error");
    }

    #[actix_web::test]
    async fn upstream_failure_is_bad_gateway() {
        let (status, body) = body_of(GatewayError::Upstream("refused".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Bad Gateway");
    }
}
