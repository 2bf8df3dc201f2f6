use crate::error::GatewayError;
use crate::models::Claims;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};

/// Shortest HS256 key accepted at startup.
pub const MIN_SECRET_LEN: usize = 32;

const RESERVED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

/// Why a token was refused. Every kind is reported to clients the same way;
/// the distinction only feeds the logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    Other(String),
}

/// Issues and verifies HS256 identity tokens with a fixed lifetime.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    algorithm: Algorithm,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, GatewayError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(GatewayError::SigningConfiguration(format!(
                "JWT secret must be at least {MIN_SECRET_LEN} bytes, got {}",
                secret.len()
            )));
        }
        if ttl <= Duration::zero() {
            return Err(GatewayError::SigningConfiguration(
                "token TTL must be positive".to_string(),
            ));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            algorithm: Algorithm::HS256,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, subject: &str, claims: Map<String, Value>) -> Result<String, GatewayError> {
        self.issue_at(subject, claims, Utc::now())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        mut claims: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<String, GatewayError> {
        claims.retain(|key, _| !RESERVED_CLAIMS.contains(&key.as_str()));

        let iat = now.timestamp();
        let claims = Claims {
            sub: subject.to_owned(),
            iat,
            exp: iat + self.ttl.num_seconds(),
            extra: claims,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| GatewayError::TokenGeneration(e.to_string()))
    }

    /// Checks signature and expiry, returning the decoded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
                _ => TokenError::Other(e.to_string()),
            })?;

        // The library only rejects exp < now; a token is dead at exp itself.
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn validate(&self, token: &str) -> bool {
        self.verify(token).is_ok()
    }

    pub fn extract_subject(&self, token: &str) -> Result<String, GatewayError> {
        self.verify(token)
            .map(|claims| claims.sub)
            .map_err(|_| GatewayError::InvalidOrExpiredToken)
    }
}
