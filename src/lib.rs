//! Edge gateway for the currency services: issues JWTs, authenticates every
//! inbound request against a public/protected path policy and forwards
//! admitted requests downstream with an `X-User-Id` identity header.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod health;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod proxy;
pub mod telemetry;
pub mod user_handlers;

pub use app::AppState;
pub use error::GatewayError;
