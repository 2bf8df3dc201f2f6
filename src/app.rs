use std::sync::Arc;

use actix_web::web;

use crate::auth::TokenService;
use crate::config::GatewayConfig;
use crate::db::{CredentialStore, InMemoryCredentialStore};
use crate::error::GatewayError;
use crate::filter::Gate;
use crate::policy::SecurityPolicy;
use crate::proxy::{self, Forwarder, RouteTable};
use crate::{health, user_handlers};

/// Everything a request may touch, built once at startup.
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub credentials: Arc<dyn CredentialStore>,
    pub policy: Arc<SecurityPolicy>,
    pub forwarder: Forwarder,
    pub service_name: String,
}

impl AppState {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let tokens = TokenService::new(&config.jwt_secret, config.token_ttl)?;
        let credentials = InMemoryCredentialStore::with_users(
            config.bcrypt_cost,
            config
                .seed_users
                .iter()
                .map(|(user, password)| (user.as_str(), password.as_str())),
        )?;

        Ok(Self {
            tokens: Arc::new(tokens),
            credentials: Arc::new(credentials),
            policy: Arc::new(SecurityPolicy::with_public_paths(config.public_paths.clone())),
            forwarder: Forwarder::new(
                RouteTable::new(config.routes.clone()),
                config.upstream_timeout,
            )?,
            service_name: config.service_name.clone(),
        })
    }

    pub fn gate(&self) -> Gate {
        Gate::new(self.policy.clone(), self.tokens.clone())
    }
}

/// Registers the gateway's own endpoints; anything else is forwarded.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        GatewayError::BadRequest(err.to_string()).into()
    }))
    .configure(user_handlers::configure)
    .configure(health::configure)
    .default_service(web::to(proxy::forward));
}
