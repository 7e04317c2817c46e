use reqwest::{Identity, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http_client::{HttpClient, HttpClientError};
use crate::models::dolyame::{
    ClientInfo, CommitRequest, CreateOrderRequest, CreateOrderResponse, OrderInfo, OrderPayload,
    PaymentOrder, RefundRequest, RefundResponse,
};

pub const DOLYAME_BASE_URL: &str = "https://partner.dolyame.ru/v1/";

pub const DOLYAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Where Dolyame posts order status changes, relative to the absolute host
const NOTIFICATION_PATH: &str = "/api/v2/banks/dolyame/notifications/";

const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

#[derive(Error, Debug)]
pub enum DolyameRequestError {
    #[error("Non-ok HTTP response from dolyame to {url}: status={status}, body={body}")]
    UnexpectedStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Request to dolyame {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse dolyame response to {url}: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read dolyame certificate {path:?}: {source}")]
    CertificateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid dolyame certificate: {0}")]
    Certificate(#[source] reqwest::Error),

    #[error("Invalid dolyame order id: {0:?}")]
    InvalidOrderId(String),

    #[error("Invalid dolyame URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Client(#[from] HttpClientError),
}

/// Dolyame partner credentials
#[derive(Clone, Debug)]
pub struct DolyameConfig {
    pub login: String,
    pub password: String,
    pub certificate_path: Option<PathBuf>,
    pub absolute_host: String,
    pub base_url: String,
}

impl DolyameConfig {
    pub fn from_env() -> Option<Self> {
        let login = std::env::var("DOLYAME_LOGIN").ok()?;
        let password = std::env::var("DOLYAME_PASSWORD").ok()?;
        let absolute_host = std::env::var("ABSOLUTE_HOST").ok()?;

        Some(Self {
            login,
            password,
            certificate_path: std::env::var("DOLYAME_CERTIFICATE_PATH")
                .ok()
                .map(PathBuf::from),
            absolute_host,
            base_url: std::env::var("DOLYAME_BASE_URL")
                .unwrap_or_else(|_| DOLYAME_BASE_URL.to_string()),
        })
    }
}

#[derive(Clone)]
pub struct Dolyame {
    http: HttpClient,
    login: String,
    password: String,
    notification_url: Url,
}

impl Dolyame {
    pub fn new(config: &DolyameConfig) -> Result<Self, DolyameRequestError> {
        let http = match &config.certificate_path {
            Some(path) => {
                let identity = load_identity(path)?;
                HttpClient::with_identity(&config.base_url, DOLYAME_TIMEOUT, identity)?
            }
            None => {
                tracing::warn!("Dolyame client certificate is not configured");
                HttpClient::new(&config.base_url, DOLYAME_TIMEOUT)?
            }
        };

        let notification_url = Url::parse(&config.absolute_host)?.join(NOTIFICATION_PATH)?;

        Ok(Self {
            http,
            login: config.login.clone(),
            password: config.password.clone(),
            notification_url,
        })
    }

    pub fn notification_url(&self) -> &str {
        self.notification_url.as_str()
    }

    /// Register the order with Dolyame and return the payment link for the customer.
    pub async fn create(&self, order: &PaymentOrder) -> Result<String, DolyameRequestError> {
        tracing::info!("Creating dolyame order {}", order.id);

        let payload = CreateOrderRequest {
            order: OrderPayload {
                id: order.id.clone(),
                amount: order.price,
                items: vec![order.item()],
            },
            client_info: ClientInfo {
                email: order.email.clone(),
            },
            notification_url: self.notification_url.to_string(),
            success_url: order.success_url.clone(),
            fail_url: order.fail_url.clone(),
        };

        let response: CreateOrderResponse = self.post("orders/create", &payload).await?;
        Ok(response.link)
    }

    /// Confirm a paid order so Dolyame releases the money.
    pub async fn commit(&self, order: &PaymentOrder) -> Result<Value, DolyameRequestError> {
        tracing::info!("Committing dolyame order {}", order.id);

        let payload = CommitRequest {
            amount: order.price,
            items: vec![order.item()],
        };
        self.post(&order_path(&order.id, "commit")?, &payload)
            .await
    }

    pub async fn cancel(&self, order_id: &str) -> Result<Value, DolyameRequestError> {
        tracing::info!("Cancelling dolyame order {}", order_id);

        self.post(&order_path(order_id, "cancel")?, &serde_json::json!({}))
            .await
    }

    /// Refund the full order price.
    pub async fn refund(&self, order: &PaymentOrder) -> Result<RefundResponse, DolyameRequestError> {
        tracing::info!("Refunding dolyame order {}", order.id);

        let payload = RefundRequest {
            amount: order.price,
            returned_items: vec![order.item()],
        };
        self.post(&order_path(&order.id, "refund")?, &payload)
            .await
    }

    pub async fn info(&self, order_id: &str) -> Result<OrderInfo, DolyameRequestError> {
        let path = order_path(order_id, "info")?;
        let url = self.http.format_url(&path)?;
        self.send(self.http.request(Method::GET, url), &path).await
    }

    async fn post<B, T>(&self, path: &str, payload: &B) -> Result<T, DolyameRequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.http.format_url(path)?;
        self.send(self.http.request(Method::POST, url).json(payload), path)
            .await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        path: &str,
    ) -> Result<T, DolyameRequestError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!("dolyame request: {} ({})", path, correlation_id);

        let response = builder
            .basic_auth(&self.login, Some(&self.password))
            .header(CORRELATION_ID_HEADER, correlation_id)
            .send()
            .await
            .map_err(|e| DolyameRequestError::Transport {
                url: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| DolyameRequestError::Transport {
                url: path.to_string(),
                source: e,
            })?;

        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::error!("Dolyame request {} failed: status={}, body={}", path, status, body);
            return Err(DolyameRequestError::UnexpectedStatus {
                url: path.to_string(),
                status,
                body,
            });
        }

        let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &body
        };

        serde_json::from_slice(body).map_err(|e| DolyameRequestError::InvalidBody {
            url: path.to_string(),
            source: e,
        })
    }
}

/// `orders/{id}/{action}` with the id kept as a single path segment.
fn order_path(order_id: &str, action: &str) -> Result<String, DolyameRequestError> {
    // Dot segments are resolved by the URL parser even when percent-encoded
    if order_id.is_empty() || order_id == "." || order_id == ".." {
        return Err(DolyameRequestError::InvalidOrderId(order_id.to_string()));
    }
    Ok(format!("orders/{}/{}", urlencoding::encode(order_id), action))
}

/// Read a PEM bundle holding both the private key and the certificate chain.
fn load_identity(path: &Path) -> Result<Identity, DolyameRequestError> {
    let pem = std::fs::read(path).map_err(|e| DolyameRequestError::CertificateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Identity::from_pem(&pem).map_err(DolyameRequestError::Certificate)
}
