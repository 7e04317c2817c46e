pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
