#![allow(dead_code)]

use std::collections::HashMap;

use actix_web::body::MessageBody;
use actix_web::dev::ServiceResponse;
use actix_web::test;
use fx_gateway::config::GatewayConfig;
use fx_gateway::AppState;
use serde_json::Value;

pub const SECRET: &str = "test_secret_key_for_testing_purposes_only";

/// Config with fast hashing and the given overrides on top of the defaults.
pub fn test_config(overrides: &[(&str, &str)]) -> GatewayConfig {
    let mut env: HashMap<String, String> = HashMap::from([
        ("JWT_SECRET".to_string(), SECRET.to_string()),
        ("BCRYPT_COST".to_string(), "4".to_string()),
        ("JWT_TTL_SECS".to_string(), "300".to_string()),
        ("GATEWAY_SERVICE_NAME".to_string(), "test-gateway".to_string()),
    ]);
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }
    GatewayConfig::from_lookup(|key| env.get(key).cloned()).expect("test config")
}

pub fn test_state(overrides: &[(&str, &str)]) -> AppState {
    AppState::from_config(&test_config(overrides)).expect("test state")
}

/// Asserts the short-circuit error shape and returns the body.
pub async fn assert_error_body<B: MessageBody>(
    resp: ServiceResponse<B>,
    status: u16,
    error: &str,
    message: &str,
) -> Value {
    assert_eq!(resp.status().as_u16(), status);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.contains("application/json"), "content-type {content_type}");

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], error);
    assert_eq!(body["message"], message);
    body
}
