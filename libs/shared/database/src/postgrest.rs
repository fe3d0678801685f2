use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RANGE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Errors surfaced by the persistence store. `Conflict` is split out because
/// the uniqueness constraints and the slot-capacity trigger are the final
/// arbiter for check-then-act races; callers map it to domain outcomes.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("store error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Thin PostgREST client. All requests authenticate with the backend's
/// service key; row-level authorization happens in the handlers, not here.
pub struct StoreClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl StoreClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.store_url.clone(),
            service_key: config.store_service_key.clone(),
        }
    }

    fn headers(&self, prefer: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(key) = HeaderValue::from_str(&self.service_key) {
            headers.insert("apikey", key);
        }
        if let Ok(bearer) = HeaderValue::from_str(&format!("Bearer {}", self.service_key)) {
            headers.insert(AUTHORIZATION, bearer);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            if let Ok(value) = HeaderValue::from_str(prefer) {
                headers.insert("Prefer", value);
            }
        }

        headers
    }

    async fn request_raw(
        &self,
        method: Method,
        path: &str,
        prefer: Option<&str>,
        body: Option<Value>,
    ) -> Result<reqwest::Response, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Store request: {} {}", method, url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.headers(prefer));

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Store error ({}): {}", status, body);

            return Err(match status {
                StatusCode::CONFLICT => StoreError::Conflict(body),
                StatusCode::NOT_FOUND => StoreError::NotFound(body),
                _ => StoreError::Api {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        Ok(response)
    }

    /// GET rows matching a query path like `/appointments?status=eq.PENDING`.
    pub async fn select<T>(&self, path: &str) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let response = self.request_raw(Method::GET, path, None, None).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// INSERT a single row and return the stored representation.
    pub async fn insert<T>(&self, table: &str, row: Value) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let path = format!("/{}", table);
        let response = self
            .request_raw(Method::POST, &path, Some("return=representation"), Some(row))
            .await?;

        let mut rows: Vec<T> = response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        rows.pop()
            .ok_or_else(|| StoreError::Decode("insert returned no rows".to_string()))
    }

    /// PATCH rows matching the query path, returning the updated rows.
    pub async fn update<T>(&self, path: &str, patch: Value) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request_raw(Method::PATCH, path, Some("return=representation"), Some(patch))
            .await?;

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// DELETE rows matching the query path.
    pub async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.request_raw(Method::DELETE, path, None, None).await?;
        Ok(())
    }

    /// Exact row count for a query path, via the `Content-Range` header.
    pub async fn count(&self, path: &str) -> Result<i64, StoreError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Store count: {}", url);

        let mut headers = self.headers(Some("count=exact"));
        headers.insert(RANGE, HeaderValue::from_static("0-0"));

        let response = self
            .client
            .request(Method::GET, &url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing content-range header".to_string()))?;

        // Format: "0-0/42" or "*/0"
        range
            .rsplit('/')
            .next()
            .and_then(|total| total.parse::<i64>().ok())
            .ok_or_else(|| StoreError::Decode(format!("unparseable content-range: {}", range)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
