//! Access token sources for the amoCRM client.
//!
//! Acquiring and refreshing tokens happens outside this crate; the client
//! only asks a getter for the current token before every request.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Failed to obtain amoCRM access token: {0}")]
pub struct TokenError(pub String);

#[async_trait]
pub trait AccessTokenGetter: Send + Sync {
    async fn access_token(&self) -> Result<String, TokenError>;
}

/// A token fixed at construction time.
#[derive(Clone)]
pub struct StaticAccessToken(String);

impl StaticAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenGetter for StaticAccessToken {
    async fn access_token(&self) -> Result<String, TokenError> {
        if self.0.is_empty() {
            return Err(TokenError("token is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}

#[async_trait]
impl<F> AccessTokenGetter for F
where
    F: Fn() -> Result<String, TokenError> + Send + Sync,
{
    async fn access_token(&self) -> Result<String, TokenError> {
        self()
    }
}
