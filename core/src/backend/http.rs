//! Client for the backend's auto-generated REST interface.
//!
//! ```text
//! GET    {url}/rest/v1/{collection}?select=*&{col}={op}.{value}&order={col}.asc
//! POST   {url}/rest/v1/{collection}                  Prefer: return=representation
//! PATCH  {url}/rest/v1/{collection}?id=eq.{id}       Prefer: return=representation
//! DELETE {url}/rest/v1/{collection}?id=eq.{id}       Prefer: return=representation
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::filter::value_param;
use super::{Backend, BackendError, BackendErrorCode, BackendResult, Filter, Order, Row};
use crate::config::BackendSettings;

const REST_PREFIX: &str = "rest/v1";

/// Error body returned by the REST layer.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl HttpBackend {
    pub fn new(settings: &BackendSettings) -> BackendResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                BackendError::new(BackendErrorCode::Unknown, format!("http client: {e}"))
            })?;
        Ok(Self::with_client(client, settings))
    }

    /// Creates a backend with a custom HTTP client.
    pub fn with_client(client: reqwest::Client, settings: &BackendSettings) -> Self {
        Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            access_token: settings.access_token.clone(),
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{REST_PREFIX}/{collection}", self.base_url)
    }

    fn request(&self, method: Method, collection: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, self.collection_url(collection))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    async fn send(&self, builder: RequestBuilder) -> BackendResult<Vec<Row>> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        response.json::<Vec<Row>>().await.map_err(|e| {
            BackendError::new(BackendErrorCode::Unknown, format!("invalid response body: {e}"))
        })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn query(
        &self,
        collection: &str,
        filter: &Filter,
        order: &[Order],
    ) -> BackendResult<Vec<Row>> {
        let mut params: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for condition in filter.conditions() {
            params.push((
                condition.column.clone(),
                format!("{}.{}", condition.op.as_str(), value_param(&condition.value)),
            ));
        }
        if !order.is_empty() {
            let order_param = order
                .iter()
                .map(Order::to_param)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order_param));
        }

        tracing::debug!(collection, conditions = filter.conditions().len(), "query");
        self.send(self.request(Method::GET, collection).query(&params))
            .await
    }

    async fn insert(&self, collection: &str, record: Row) -> BackendResult<Row> {
        let rows = self
            .send(
                self.request(Method::POST, collection)
                    .header("Prefer", "return=representation")
                    .json(&record),
            )
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            BackendError::new(BackendErrorCode::Unknown, "insert returned no representation")
        })
    }

    async fn update(&self, collection: &str, id: &str, patch: Row) -> BackendResult<Row> {
        let rows = self
            .send(
                self.request(Method::PATCH, collection)
                    .query(&[("id", format!("eq.{id}"))])
                    .header("Prefer", "return=representation")
                    .json(&patch),
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::not_found(format!("{collection}/{id}")))
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<()> {
        let rows = self
            .send(
                self.request(Method::DELETE, collection)
                    .query(&[("id", format!("eq.{id}"))])
                    .header("Prefer", "return=representation"),
            )
            .await?;
        if rows.is_empty() {
            return Err(BackendError::not_found(format!("{collection}/{id}")));
        }
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    let code = if err.is_timeout() {
        BackendErrorCode::Timeout
    } else if err.is_connect() {
        BackendErrorCode::Connection
    } else {
        BackendErrorCode::Network
    };
    BackendError::new(code, err.to_string())
}

fn status_error(status: StatusCode, body: &str) -> BackendError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (parsed.message, parsed.details) {
        (Some(message), Some(details)) => format!("{message} ({details})"),
        (Some(message), None) => message,
        (None, _) if !body.trim().is_empty() => body.trim().to_string(),
        (None, _) => format!("HTTP {status}"),
    };

    let code = match parsed.code.as_deref() {
        Some("42501") => Some(BackendErrorCode::PermissionDenied),
        Some("PGRST116") => Some(BackendErrorCode::NotFound),
        Some("23505") => Some(BackendErrorCode::Duplicate),
        Some("23502" | "23514" | "22P02") => Some(BackendErrorCode::Validation),
        _ => None,
    }
    .unwrap_or_else(|| code_for_status(status));

    BackendError::new(code, message)
}

fn code_for_status(status: StatusCode) -> BackendErrorCode {
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendErrorCode::Timeout,
        StatusCode::TOO_MANY_REQUESTS => BackendErrorCode::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorCode::PermissionDenied,
        StatusCode::NOT_FOUND => BackendErrorCode::NotFound,
        StatusCode::CONFLICT => BackendErrorCode::Duplicate,
        s if s.is_client_error() => BackendErrorCode::Validation,
        s if s.is_server_error() => BackendErrorCode::Server,
        _ => BackendErrorCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FilterOp;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> BackendSettings {
        BackendSettings {
            url: server.uri(),
            api_key: "anon-key".to_string(),
            access_token: None,
            timeout_secs: 5,
        }
    }

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => Row::new(),
        }
    }

    #[tokio::test]
    async fn query_sends_filters_and_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/agencies"))
            .and(query_param("select", "*"))
            .and(query_param("location", "ilike.*pune*"))
            .and(query_param("trust_score", "gte.50"))
            .and(query_param("order", "created_at.desc,name.asc"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": "1", "name": "Acme Edu"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server)).unwrap();
        let filter = Filter::new()
            .with("location", FilterOp::ILike, "*pune*")
            .with("trust_score", FilterOp::Gte, 50);
        let rows = backend
            .query(
                "agencies",
                &filter,
                &[Order::desc("created_at"), Order::asc("name")],
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "Acme Edu");
    }

    #[tokio::test]
    async fn insert_returns_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/agencies"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({"name": "Acme Edu", "owner_id": "u-1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([
                {"id": "a-1", "name": "Acme Edu", "owner_id": "u-1"}
            ])))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server)).unwrap();
        let inserted = backend
            .insert(
                "agencies",
                row(json!({"name": "Acme Edu", "owner_id": "u-1"})),
            )
            .await
            .unwrap();

        assert_eq!(inserted["id"], "a-1");
    }

    #[tokio::test]
    async fn access_token_overrides_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer user-session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = settings(&server);
        settings.access_token = Some("user-session".to_string());
        let backend = HttpBackend::new(&settings).unwrap();

        let rows = backend.query("agencies", &Filter::new(), &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_address_rows_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/reviews"))
            .and(query_param("id", "eq.r-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "r-9", "status": "approved"}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/reviews"))
            .and(query_param("id", "eq.r-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "r-9"}])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/reviews"))
            .and(query_param("id", "eq.missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server)).unwrap();
        let updated = backend
            .update("reviews", "r-9", row(json!({"status": "approved"})))
            .await
            .unwrap();
        assert_eq!(updated["status"], "approved");

        backend.delete("reviews", "r-9").await.unwrap();
        let err = backend.delete("reviews", "missing").await.unwrap_err();
        assert_eq!(err.code, BackendErrorCode::NotFound);
    }

    #[tokio::test]
    async fn error_codes_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/dupes"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"agencies_name_key\"",
                "details": "Key (name)=(Acme Edu) already exists."
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/locked"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "code": "42501",
                "message": "new row violates row-level security policy"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/busy"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let backend = HttpBackend::new(&settings(&server)).unwrap();
        let insert = |collection: &'static str| {
            let backend = &backend;
            async move { backend.insert(collection, Row::new()).await.unwrap_err() }
        };

        let err = insert("dupes").await;
        assert_eq!(err.code, BackendErrorCode::Duplicate);
        assert!(err.message.contains("already exists"));

        assert_eq!(insert("locked").await.code, BackendErrorCode::PermissionDenied);

        let err = insert("busy").await;
        assert_eq!(err.code, BackendErrorCode::RateLimited);
        assert_eq!(err.message, "slow down");

        assert_eq!(insert("broken").await.code, BackendErrorCode::Server);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        let server = MockServer::builder().start().await;
        let settings = settings(&server);
        drop(server);

        let backend = HttpBackend::new(&settings).unwrap();
        let err = backend
            .query("agencies", &Filter::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err.code,
            BackendErrorCode::Connection | BackendErrorCode::Network
        ));
    }

    #[test]
    fn status_codes_without_body_code() {
        assert_eq!(code_for_status(StatusCode::GATEWAY_TIMEOUT), BackendErrorCode::Timeout);
        assert_eq!(code_for_status(StatusCode::NOT_FOUND), BackendErrorCode::NotFound);
        assert_eq!(code_for_status(StatusCode::BAD_REQUEST), BackendErrorCode::Validation);
        assert_eq!(
            code_for_status(StatusCode::SERVICE_UNAVAILABLE),
            BackendErrorCode::Server
        );
    }
}
