pub mod api;
pub mod auth;
pub mod config;
pub mod telegram;
pub mod telemetry;

pub use api::{AppState, build_router, create_app};
pub use config::Settings;
