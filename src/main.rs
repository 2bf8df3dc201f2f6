use actix_web::{web, App, HttpServer};
use fx_gateway::app::{self, AppState};
use fx_gateway::config::GatewayConfig;
use fx_gateway::filter::AuthenticationFilter;
use fx_gateway::middleware::RequestLog;
use fx_gateway::telemetry;
use tracing::{error, info, warn};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    if std::env::var("GATEWAY_SEED_USERS").is_err() {
        warn!("using built-in demo credentials; set GATEWAY_SEED_USERS to override");
    }

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "failed to build gateway state");
            std::process::exit(1);
        }
    };

    let addr = (config.host.clone(), config.port);
    info!(host = %addr.0, port = addr.1, routes = config.routes.len(), "gateway listening");

    let gate = state.gate();
    let data = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(AuthenticationFilter::new(gate.clone()))
            .wrap(RequestLog)
            .configure(app::configure)
    })
    .bind(addr)?
    .run()
    .await
}
