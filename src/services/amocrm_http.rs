//! amoCRM REST wrapper.
//!
//! Every call asks the token getter for a fresh bearer token and validates the
//! response twice: the status code must be in the expected set, and the body
//! must not carry errors under `_embedded.errors` (amoCRM reports some
//! failures inside otherwise successful responses).

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::http_client::{HttpClient, HttpClientError};
use crate::services::amocrm_token::{AccessTokenGetter, TokenError};

pub const AMOCRM_TIMEOUT: Duration = Duration::from_secs(3);

const DEFAULT_EXPECTED_STATUS_CODES: &[StatusCode] = &[StatusCode::OK];

/// JSON pointer to the embedded error list
const EMBEDDED_ERRORS_POINTER: &str = "/_embedded/errors";

#[derive(Error, Debug)]
pub enum AmoCrmClientError {
    #[error("Non-ok HTTP response from amocrm: {status}")]
    UnexpectedStatus { url: String, status: StatusCode },

    #[error("Errors in response to {url}: {errors}")]
    EmbeddedErrors { url: String, errors: Value },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid JSON in response to {url}: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid amocrm URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error(transparent)]
    Client(#[from] HttpClientError),
}

/// amoCRM account settings
#[derive(Clone, Debug)]
pub struct AmoCrmConfig {
    pub base_url: String,
    pub access_token: Option<String>,
}

impl AmoCrmConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            base_url: std::env::var("AMOCRM_BASE_URL").ok()?,
            access_token: std::env::var("AMOCRM_ACCESS_TOKEN").ok(),
        })
    }
}

#[derive(Clone)]
pub struct AmoCrmHttp {
    http: HttpClient,
    token_getter: Arc<dyn AccessTokenGetter>,
}

impl AmoCrmHttp {
    pub fn new(
        base_url: &str,
        token_getter: Arc<dyn AccessTokenGetter>,
    ) -> Result<Self, AmoCrmClientError> {
        Ok(Self {
            http: HttpClient::new(base_url, AMOCRM_TIMEOUT)?,
            token_getter,
        })
    }

    /// GET `path` with query `params`. `expected_status_codes` defaults to `[200]`.
    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
        expected_status_codes: Option<&[StatusCode]>,
    ) -> Result<Value, AmoCrmClientError> {
        let url = self.http.format_url(path)?;
        let mut builder = self.http.request(Method::GET, url);
        if !params.is_empty() {
            builder = builder.query(params);
        }

        self.send(builder, path, expected_status_codes).await
    }

    pub async fn post<B>(
        &self,
        path: &str,
        data: &B,
        expected_status_codes: Option<&[StatusCode]>,
    ) -> Result<Value, AmoCrmClientError>
    where
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(data), expected_status_codes)
            .await
    }

    pub async fn patch<B>(
        &self,
        path: &str,
        data: &B,
        expected_status_codes: Option<&[StatusCode]>,
    ) -> Result<Value, AmoCrmClientError>
    where
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, path, Some(data), expected_status_codes)
            .await
    }

    /// Send `data` as a JSON body with an arbitrary method.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        data: Option<&B>,
        expected_status_codes: Option<&[StatusCode]>,
    ) -> Result<Value, AmoCrmClientError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.http.format_url(path)?;
        let mut builder = self.http.request(method, url);
        if let Some(data) = data {
            builder = builder.json(data);
        }

        self.send(builder, path, expected_status_codes).await
    }

    pub fn base_url(&self) -> &str {
        self.http.base_url().as_str()
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        path: &str,
        expected_status_codes: Option<&[StatusCode]>,
    ) -> Result<Value, AmoCrmClientError> {
        let token = self.token_getter.access_token().await?;

        tracing::debug!("amocrm request: {}", path);
        let response = builder
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AmoCrmClientError::Transport {
                url: path.to_string(),
                source: e,
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AmoCrmClientError::Transport {
                url: path.to_string(),
                source: e,
            })?;

        validated_response(status, &body, path, expected_status_codes)
    }
}

fn validated_response(
    status: StatusCode,
    body: &[u8],
    url: &str,
    expected_status_codes: Option<&[StatusCode]>,
) -> Result<Value, AmoCrmClientError> {
    let expected = match expected_status_codes {
        Some(codes) if !codes.is_empty() => codes,
        _ => DEFAULT_EXPECTED_STATUS_CODES,
    };

    if !expected.contains(&status) {
        tracing::warn!(
            "amocrm rejected {}: status={}, body={}",
            url,
            status,
            String::from_utf8_lossy(body)
        );
        return Err(AmoCrmClientError::UnexpectedStatus {
            url: url.to_string(),
            status,
        });
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    let json: Value = serde_json::from_slice(body).map_err(|e| AmoCrmClientError::InvalidBody {
        url: url.to_string(),
        source: e,
    })?;

    if let Some(errors) = json.pointer(EMBEDDED_ERRORS_POINTER) {
        if is_truthy(errors) {
            tracing::warn!("amocrm embedded errors in response to {}: {}", url, errors);
            return Err(AmoCrmClientError::EmbeddedErrors {
                url: url.to_string(),
                errors: errors.clone(),
            });
        }
    }

    Ok(json)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::services::amocrm_token::StaticAccessToken;

    async fn amocrm(server: &MockServer) -> AmoCrmHttp {
        AmoCrmHttp::new(
            &format!("{}/api/v4/", server.uri()),
            Arc::new(StaticAccessToken::new("t0ken")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_returns_json_unchanged() {
        let server = MockServer::start().await;
        let body = json!({
            "_page": 1,
            "_embedded": {"leads": [{"id": 100500, "name": "Lead"}]}
        });
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .and(header("Authorization", "Bearer t0ken"))
            .and(header("Content-Type", "application/json"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await.unwrap();

        assert_eq!(result, body);
    }

    #[tokio::test]
    async fn test_get_passes_query_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts"))
            .and(query_param("query", "user@example.com"))
            .and(query_param("with", "leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let result = amocrm(&server)
            .await
            .get(
                "contacts",
                &[("query", "user@example.com"), ("with", "leads")],
                None,
            )
            .await
            .unwrap();

        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_leading_slash_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/15"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 15})))
            .expect(3)
            .mount(&server)
            .await;

        let client = amocrm(&server).await;
        for p in ["leads/15", "/leads/15", "//leads/15"] {
            client.get(p, &[], None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_unexpected_status_fails_regardless_of_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"_embedded": {}})))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await;

        assert!(matches!(
            result,
            Err(AmoCrmClientError::UnexpectedStatus { status, .. }) if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_unexpected_status_wins_over_non_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await;

        assert!(matches!(
            result,
            Err(AmoCrmClientError::UnexpectedStatus { status, .. }) if status == StatusCode::BAD_GATEWAY
        ));
    }

    #[tokio::test]
    async fn test_unexpected_status_wins_over_embedded_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "_embedded": {"errors": [{"code": "InvalidFilter"}]}
            })))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await;

        assert!(matches!(
            result,
            Err(AmoCrmClientError::UnexpectedStatus { status, .. }) if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn test_status_outside_custom_expected_set_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let result = amocrm(&server)
            .await
            .post("leads", &json!([]), Some(&[StatusCode::CREATED]))
            .await;

        assert!(matches!(
            result,
            Err(AmoCrmClientError::UnexpectedStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_expected_set_means_ok_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/account"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("account", &[], Some(&[])).await;

        assert_eq!(result.unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_embedded_errors_fail_with_ok_status() {
        let server = MockServer::start().await;
        let errors = json!([{"code": "NotFound", "detail": "Contact not found"}]);
        Mock::given(method("GET"))
            .and(path("/api/v4/contacts/1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"errors": errors}})),
            )
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("contacts/1", &[], None).await;

        match result {
            Err(AmoCrmClientError::EmbeddedErrors { url, errors: got }) => {
                assert_eq!(url, "contacts/1");
                assert_eq!(got, errors);
            }
            other => panic!("expected embedded errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_embedded_errors_are_ignored() {
        let server = MockServer::start().await;
        let body = json!({"_embedded": {"errors": [], "leads": []}});
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await.unwrap();

        assert_eq!(result, body);
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        let payload = json!([{"name": "Deal", "price": 1500}]);
        Mock::given(method("POST"))
            .and(path("/api/v4/leads"))
            .and(body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"_embedded": {"leads": [{"id": 7}]}})))
            .expect(1)
            .mount(&server)
            .await;

        let result = amocrm(&server)
            .await
            .post("/leads", &payload, None)
            .await
            .unwrap();

        assert_eq!(result.pointer("/_embedded/leads/0/id"), Some(&json!(7)));
    }

    #[tokio::test]
    async fn test_patch_with_no_content_returns_null() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v4/leads/7"))
            .and(body_json(json!({"status_id": 142})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = amocrm(&server)
            .await
            .patch(
                "leads/7",
                &json!({"status_id": 142}),
                Some(&[StatusCode::OK, StatusCode::NO_CONTENT]),
            )
            .await
            .unwrap();

        assert_eq!(result, Value::Null);
    }

    #[tokio::test]
    async fn test_invalid_json_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = amocrm(&server).await.get("leads", &[], None).await;

        assert!(matches!(result, Err(AmoCrmClientError::InvalidBody { .. })));
    }

    #[tokio::test]
    async fn test_token_is_fetched_for_every_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/account"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(3)
            .mount(&server)
            .await;

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let getter = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TokenError>("fresh".to_string())
        };
        let client = AmoCrmHttp::new(&format!("{}/api/v4", server.uri()), Arc::new(getter)).unwrap();

        for _ in 0..3 {
            client.get("account", &[], None).await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_token_failure_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let getter = || Err::<String, _>(TokenError("refresh token expired".to_string()));
        let client = AmoCrmHttp::new(&server.uri(), Arc::new(getter)).unwrap();

        let result = client.get("account", &[], None).await;

        assert!(matches!(result, Err(AmoCrmClientError::Token(_))));
    }

    #[test]
    fn test_truthiness_of_embedded_errors() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!({})));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!({"code": 1})));
        assert!(is_truthy(&json!("failed")));
        assert!(is_truthy(&json!(true)));
    }
}
