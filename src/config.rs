//! Environment configuration.
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by `main`. Everything except `JWT_SECRET` has a default.

use std::ops::RangeInclusive;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::policy::{parse_patterns, PathPattern, PatternError};

pub const DEFAULT_PUBLIC_PATHS: &str = "/auth/**,/actuator/**,/eureka/**";
pub const DEFAULT_ROUTES: &str =
    "/currency-exchange/**=http://localhost:8000,/currency-conversion/**=http://localhost:8100";
pub const DEFAULT_SEED_USERS: &str = "admin:admin123,user:user123,test:test123";

/// Work factors the bcrypt crate accepts.
pub const BCRYPT_COST_RANGE: RangeInclusive<u32> = 4..=31;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub pattern: PathPattern,
    pub upstream: Url,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: Vec<u8>,
    pub token_ttl: chrono::Duration,
    pub service_name: String,
    pub public_paths: Vec<PathPattern>,
    pub routes: Vec<RouteConfig>,
    pub seed_users: Vec<(String, String)>,
    pub bcrypt_cost: u32,
    pub upstream_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?
            .into_bytes();

        let ttl_raw = get("JWT_TTL_SECS", "86400");
        let ttl_secs: i64 = parse_num("JWT_TTL_SECS", &ttl_raw)?;
        let token_ttl = chrono::Duration::try_seconds(ttl_secs)
            .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
            .ok_or_else(|| ConfigError::Invalid {
                key: "JWT_TTL_SECS",
                value: ttl_raw.clone(),
                reason: "token lifetime out of range".to_string(),
            })?;

        let cost_raw = get("BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string());
        let bcrypt_cost: u32 = parse_num("BCRYPT_COST", &cost_raw)?;
        if !BCRYPT_COST_RANGE.contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                value: cost_raw,
                reason: format!(
                    "must be between {} and {}",
                    BCRYPT_COST_RANGE.start(),
                    BCRYPT_COST_RANGE.end()
                ),
            });
        }
        let timeout_secs: u64 =
            parse_num("UPSTREAM_TIMEOUT_SECS", &get("UPSTREAM_TIMEOUT_SECS", "30"))?;

        Ok(Self {
            host: get("HOST", "0.0.0.0"),
            port: parse_num("PORT", &get("PORT", "8765"))?,
            jwt_secret,
            token_ttl,
            service_name: get("GATEWAY_SERVICE_NAME", "api-gateway"),
            public_paths: parse_patterns(&get("GATEWAY_PUBLIC_PATHS", DEFAULT_PUBLIC_PATHS))?,
            routes: parse_routes(&get("GATEWAY_ROUTES", DEFAULT_ROUTES))?,
            seed_users: parse_users(&get("GATEWAY_SEED_USERS", DEFAULT_SEED_USERS))?,
            bcrypt_cost,
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn parse_num<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `pattern=url` pairs separated by commas.
pub fn parse_routes(list: &str) -> Result<Vec<RouteConfig>, ConfigError> {
    let invalid = |item: &str, reason: String| ConfigError::Invalid {
        key: "GATEWAY_ROUTES",
        value: item.to_string(),
        reason,
    };

    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (pattern, upstream) = item
                .split_once('=')
                .ok_or_else(|| invalid(item, "expected pattern=url".to_string()))?;
            let upstream =
                Url::parse(upstream.trim()).map_err(|e| invalid(item, e.to_string()))?;
            if !matches!(upstream.scheme(), "http" | "https") {
                return Err(invalid(item, "upstream must be http or https".to_string()));
            }
            Ok(RouteConfig {
                pattern: pattern.parse()?,
                upstream,
            })
        })
        .collect()
}

/// `user:password` pairs separated by commas.
pub fn parse_users(list: &str) -> Result<Vec<(String, String)>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.split_once(':')
                .filter(|(user, _)| !user.is_empty())
                .map(|(user, password)| (user.to_string(), password.to_string()))
                .ok_or_else(|| ConfigError::Invalid {
                    key: "GATEWAY_SEED_USERS",
                    value: item.to_string(),
                    reason: "expected user:password".to_string(),
                })
        })
        .collect()
}
