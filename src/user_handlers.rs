use crate::app::AppState;
use crate::error::GatewayError;
use crate::filter::{bearer_token, identity_value};
use crate::models::{AuthRequest, AuthResponse, HealthResponse, MessageResponse, ValidateResponse};
use actix_web::http::header;
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use serde_json::{json, Map};
use tracing::{error, info, warn};

#[post("/login")]
pub async fn login(data: web::Json<AuthRequest>, state: web::Data<AppState>) -> impl Responder {
    info!(user = %data.username, "login attempt");

    if !state
        .credentials
        .authenticate(&data.username, &data.password)
        .await
    {
        warn!(user = %data.username, "invalid credentials");
        return HttpResponse::Unauthorized()
            .json(AuthResponse::failure(&GatewayError::InvalidCredentials.to_string()));
    }

    let mut claims = Map::new();
    claims.insert("role".to_string(), json!("USER"));

    match state.tokens.issue(&data.username, claims) {
        Ok(token) => {
            info!(user = %data.username, "token issued");
            HttpResponse::Ok().json(AuthResponse {
                token: Some(token),
                message: "Authentication successful".to_string(),
                username: Some(data.username.clone()),
            })
        }
        Err(e) => {
            error!(error = %e, "token generation failed");
            HttpResponse::InternalServerError().json(AuthResponse::failure("Token generation failed"))
        }
    }
}

#[post("/register")]
pub async fn register(
    data: web::Json<AuthRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    info!(user = ?data.username, "registration attempt");

    if identity_value(&data.username).is_none() {
        warn!(user = ?data.username, "registration rejected: username is not header-safe");
        return Err(GatewayError::BadRequest(
            "username must not contain control characters or surrounding whitespace".to_string(),
        ));
    }

    state
        .credentials
        .register(&data.username, &data.password)
        .await
        .inspect_err(|e| warn!(user = %data.username, error = %e, "registration rejected"))?;

    info!(user = %data.username, "user registered");
    Ok(HttpResponse::Created().json(MessageResponse {
        message: "User registered successfully".to_string(),
    }))
}

#[get("/validate")]
pub async fn validate(req: HttpRequest, state: web::Data<AppState>) -> impl Responder {
    let token = match req.headers().get(header::AUTHORIZATION).map(bearer_token) {
        Some(Ok(token)) => token,
        _ => {
            return HttpResponse::BadRequest().json(ValidateResponse {
                valid: false,
                username: None,
                message: "Invalid token format".to_string(),
            })
        }
    };

    match state.tokens.verify(&token) {
        Ok(claims) => {
            info!(user = %claims.sub, "token valid");
            HttpResponse::Ok().json(ValidateResponse {
                valid: true,
                username: Some(claims.sub),
                message: "Token is valid".to_string(),
            })
        }
        Err(e) => {
            warn!(reason = %e, "token invalid");
            HttpResponse::Unauthorized().json(ValidateResponse {
                valid: false,
                username: None,
                message: "Token is invalid or expired".to_string(),
            })
        }
    }
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "UP".to_string(),
        service: "Authentication Service".to_string(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(login)
            .service(register)
            .service(validate)
            .service(health),
    );
}
