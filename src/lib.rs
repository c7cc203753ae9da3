pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod persistence;
pub mod signaling;
pub mod state;
pub mod ws;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
