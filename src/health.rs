use actix_web::{web, HttpResponse};

use crate::app::AppState;
use crate::models::HealthResponse;

async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "UP".to_string(),
        service: state.service_name.clone(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/actuator/health", web::get().to(health));
}
