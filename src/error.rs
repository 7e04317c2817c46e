use thiserror::Error;

use crate::services::{AmoCrmClientError, DolyameRequestError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("amoCRM error: {0}")]
    AmoCrm(#[from] AmoCrmClientError),

    #[error("Dolyame error: {0}")]
    Dolyame(#[from] DolyameRequestError),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type AppResult<T> = Result<T, AppError>;
