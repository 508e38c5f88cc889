//! Alma Bibs API client.
//!
//! Fetches one bibliographic record per MMS ID:
//!
//! ```text
//! GET {base}/almaws/v1/bibs/{mms_id}
//! Authorization: apikey <key>
//! Accept: application/json
//! ```
//!
//! Transport failures, 429 and 5xx responses are retried a bounded number of
//! times here; the export pipeline itself never retries.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::api::logs::{log_debug, log_warning_indent};
use crate::config::ExportConfig;
use crate::error::{ConfigError, ConfigResult, FetchError, FetchResult};
use crate::models::RawApiRecord;

/// Source of raw records, one identifier at a time.
///
/// Implemented by [`AlmaClient`]; tests use in-memory sources.
pub trait RecordSource {
    fn fetch_record(
        &self,
        identifier: &str,
    ) -> impl Future<Output = FetchResult<RawApiRecord>> + Send;
}

// =============================================================================
// Region
// =============================================================================

/// Alma API hosting region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    NorthAmerica,
    Europe,
    AsiaPacific,
    Canada,
    China,
}

impl Region {
    pub fn code(self) -> &'static str {
        match self {
            Region::NorthAmerica => "na",
            Region::Europe => "eu",
            Region::AsiaPacific => "ap",
            Region::Canada => "ca",
            Region::China => "cn",
        }
    }

    /// API gateway for the region.
    pub fn base_url(self) -> &'static str {
        match self {
            Region::NorthAmerica => "https://api-na.hosted.exlibrisgroup.com",
            Region::Europe => "https://api-eu.hosted.exlibrisgroup.com",
            Region::AsiaPacific => "https://api-ap.hosted.exlibrisgroup.com",
            Region::Canada => "https://api-ca.hosted.exlibrisgroup.com",
            Region::China => "https://api-cn.hosted.exlibrisgroup.com.cn",
        }
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "na" => Ok(Region::NorthAmerica),
            "eu" => Ok(Region::Europe),
            "ap" => Ok(Region::AsiaPacific),
            "ca" => Ok(Region::Canada),
            "cn" => Ok(Region::China),
            other => Err(ConfigError::InvalidRegion(other.to_string())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Client
// =============================================================================

/// Default number of attempts per identifier
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Alma error envelope (`errorList.error[].errorMessage`)
#[derive(Debug, Deserialize)]
struct AlmaErrorBody {
    #[serde(rename = "errorList")]
    error_list: AlmaErrorList,
}

#[derive(Debug, Deserialize)]
struct AlmaErrorList {
    #[serde(default)]
    error: Vec<AlmaErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct AlmaErrorDetail {
    #[serde(rename = "errorMessage", default)]
    error_message: String,
}

/// Alma Bibs API client
#[derive(Clone)]
pub struct AlmaClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl fmt::Debug for AlmaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlmaClient")
            .field("base_url", &self.base_url)
            .field("api_key", &format!("<{} chars>", self.api_key.len()))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl AlmaClient {
    /// Create a client for a region with an explicit API key
    pub fn new(api_key: impl Into<String>, region: Region) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_key: api_key.into(),
            base_url: region.base_url().to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }

    /// Create a client from a loaded configuration
    pub fn from_config(config: &ExportConfig) -> ConfigResult<Self> {
        let api_key = config.require_api_key()?;
        Ok(Self::new(api_key, config.region))
    }

    /// Create a client from `.env` / environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_config(&ExportConfig::from_env()?)
    }

    /// Point at another gateway (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Attempts per identifier, at least one
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch one record, retrying transient failures
    pub async fn get_bib(&self, mms_id: &str) -> FetchResult<RawApiRecord> {
        let mms_id = mms_id.trim();
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.try_get_bib(mms_id).await {
                Ok(record) => return Ok(record),
                Err(e) if is_retryable(&e) => {
                    log_warning_indent(
                        format!(
                            "Attempt {}/{} for {} failed: {}",
                            attempt, self.max_retries, mms_id, e
                        ),
                        1,
                    );
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| FetchError::NetworkFailure("no attempt made".to_string())))
    }

    /// `{base}/almaws/v1/bibs/{mms_id}`, with the id escaped as one path segment
    fn bib_url(&self, mms_id: &str) -> FetchResult<reqwest::Url> {
        let invalid = || FetchError::BadRequest(format!("Invalid API base URL: {}", self.base_url));
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(["almaws", "v1", "bibs", mms_id]);
        Ok(url)
    }

    /// Single request
    async fn try_get_bib(&self, mms_id: &str) -> FetchResult<RawApiRecord> {
        let url = self.bib_url(mms_id)?;
        log_debug(format!("GET {}", url));

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, format!("apikey {}", self.api_key))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::NetworkFailure(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&body);
            return Err(match status.as_u16() {
                404 => FetchError::NotFound(mms_id.to_string()),
                400 => FetchError::BadRequest(message),
                401 | 403 => FetchError::Unauthorized(message),
                code => FetchError::Http { status: code, message },
            });
        }

        parse_bib_response(mms_id, &body)
    }
}

impl RecordSource for AlmaClient {
    fn fetch_record(
        &self,
        identifier: &str,
    ) -> impl Future<Output = FetchResult<RawApiRecord>> + Send {
        self.get_bib(identifier)
    }
}

/// Transport failures, rate limiting and server errors
fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::NetworkFailure(_) => true,
        FetchError::Http { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// A bib object, or a `{"bib": [...]}` wrapper around one.
pub fn parse_bib_response(mms_id: &str, body: &str) -> FetchResult<RawApiRecord> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

    let Value::Object(mut map) = value else {
        return Err(FetchError::InvalidResponse("response is not an object".to_string()));
    };

    let bib = if map.contains_key("mms_id") {
        Value::Object(map)
    } else if let Some(wrapped) = map.remove("bib") {
        match wrapped {
            Value::Array(mut bibs) if !bibs.is_empty() => bibs.swap_remove(0),
            Value::Object(bib) => Value::Object(bib),
            _ => return Err(FetchError::NotFound(mms_id.to_string())),
        }
    } else {
        let keys: Vec<&String> = map.keys().collect();
        return Err(FetchError::InvalidResponse(format!(
            "unexpected response structure: {:?}",
            keys
        )));
    };

    serde_json::from_value(bib).map_err(|e| FetchError::InvalidResponse(e.to_string()))
}

/// Alma's own error message when the body carries one.
fn error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<AlmaErrorBody>(body) {
        let messages: Vec<&str> = parsed
            .error_list
            .error
            .iter()
            .map(|e| e.error_message.as_str())
            .filter(|m| !m.is_empty())
            .collect();
        if !messages.is_empty() {
            return messages.join("; ");
        }
    }
    body.trim().chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn bib(
        Path(id): Path<String>,
        State(calls): State<Arc<AtomicUsize>>,
        headers: HeaderMap,
    ) -> (StatusCode, Json<Value>) {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let key = headers.get("authorization").and_then(|v| v.to_str().ok());
        if key != Some("apikey test-key") {
            let body = json!({"errorList": {"error": [{"errorMessage": "bad key"}]}});
            return (StatusCode::UNAUTHORIZED, Json(body));
        }
        let ok = |body: Value| (StatusCode::OK, Json(body));
        match id.as_str() {
            "991" => ok(json!({"mms_id": "991", "title": "Direct", "anies": ["<r/>"]})),
            "992" => ok(json!({"bib": [{"mms_id": "992", "title": "Wrapped"}]})),
            "993" => ok(json!({"bib": []})),
            "a/b?c#d" => ok(json!({"mms_id": "a/b?c#d", "title": "Escaped"})),
            "bad" => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "errorsExist": true,
                    "errorList": {"error": [{
                        "errorCode": "402203",
                        "errorMessage": "Input parameters mmsId bad is not valid."
                    }]}
                })),
            ),
            "flaky" if n == 0 => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))),
            "flaky" => ok(json!({"mms_id": "flaky"})),
            _ => (StatusCode::NOT_FOUND, Json(json!({}))),
        }
    }

    async fn spawn_server() -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/almaws/v1/bibs/{id}", get(bib))
            .with_state(calls.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), calls)
    }

    fn client(base: &str) -> AlmaClient {
        AlmaClient::new("test-key", Region::NorthAmerica)
            .with_base_url(base)
            .with_retry_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_fetch_direct_and_wrapped() {
        let (base, _) = spawn_server().await;
        let client = client(&base);

        let record = client.fetch_record(" 991 ").await.unwrap();
        assert_eq!(record.title.as_deref(), Some("Direct"));
        assert_eq!(record.anies, vec!["<r/>"]);

        let record = client.fetch_record("992").await.unwrap();
        assert_eq!(record.mms_id.as_deref(), Some("992"));

        let err = client.fetch_record("993").await.unwrap_err();
        assert_eq!(err, FetchError::NotFound("993".into()));
    }

    #[tokio::test]
    async fn test_error_classification() {
        let (base, _) = spawn_server().await;
        let client = client(&base);

        assert_eq!(
            client.fetch_record("missing").await.unwrap_err(),
            FetchError::NotFound("missing".into())
        );
        assert_eq!(
            client.fetch_record("bad").await.unwrap_err(),
            FetchError::BadRequest("Input parameters mmsId bad is not valid.".into())
        );

        let wrong_key = AlmaClient::new("nope", Region::Europe).with_base_url(&base);
        assert_eq!(
            wrong_key.fetch_record("991").await.unwrap_err(),
            FetchError::Unauthorized("bad key".into())
        );
    }

    #[tokio::test]
    async fn test_identifier_is_one_escaped_path_segment() {
        let (base, calls) = spawn_server().await;
        let client = client(&format!("{}/", base));

        let url = client.bib_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), format!("{}/almaws/v1/bibs/a%2Fb%3Fc%23d", base));

        let record = client.fetch_record("a/b?c#d").await.unwrap();
        assert_eq!(record.title.as_deref(), Some("Escaped"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_base_url() {
        let client = AlmaClient::new("test-key", Region::Europe).with_base_url("not a url");
        assert!(matches!(client.bib_url("991"), Err(FetchError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let (base, calls) = spawn_server().await;
        let record = client(&base).fetch_record("flaky").await.unwrap();
        assert_eq!(record.mms_id.as_deref(), Some("flaky"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (base, calls) = spawn_server().await;
        let _ = client(&base).fetch_record("missing").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_network_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{}", addr))
            .with_max_retries(2)
            .fetch_record("991")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "network-failure");
    }

    #[test]
    fn test_region_parsing() {
        assert_eq!("EU".parse::<Region>().unwrap(), Region::Europe);
        assert_eq!(Region::China.base_url(), "https://api-cn.hosted.exlibrisgroup.com.cn");
        assert_eq!(Region::default().to_string(), "na");
        assert_eq!("mars".parse::<Region>(), Err(ConfigError::InvalidRegion("mars".into())));
    }

    #[test]
    fn test_parse_bib_response_rejects_garbage() {
        assert!(matches!(parse_bib_response("1", "not json"), Err(FetchError::InvalidResponse(_))));
        assert!(matches!(parse_bib_response("1", "[1,2]"), Err(FetchError::InvalidResponse(_))));
        assert!(matches!(
            parse_bib_response("1", r#"{"total_record_count": 0}"#),
            Err(FetchError::InvalidResponse(_))
        ));
    }
}
