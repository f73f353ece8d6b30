//! Thin HTTP client over the node's REST API.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::Connection;

pub struct ApiClient {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(conn: &Connection) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: conn.endpoint.trim_end_matches('/').to_string(),
            token: conn.token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{path}", self.endpoint));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.request(Method::GET, path)).await
    }

    pub async fn get_query<Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> anyhow::Result<Value> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> anyhow::Result<Value> {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn post_empty(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.request(Method::POST, path)).await
    }

    pub async fn delete(&self, path: &str) -> anyhow::Result<Value> {
        self.send(self.request(Method::DELETE, path)).await
    }

    async fn send(&self, builder: RequestBuilder) -> anyhow::Result<Value> {
        let request = builder.build()?;
        tracing::debug!(method = %request.method(), url = %request.url(), "sending request");
        let resp = self
            .http
            .execute(request)
            .await
            .map_err(|e| anyhow::anyhow!("could not reach node at {}: {e}", self.endpoint))?;
        decode(resp).await
    }
}

async fn decode(resp: Response) -> anyhow::Result<Value> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    let body: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    if status.is_success() {
        return Ok(body);
    }
    Err(anyhow::anyhow!(describe_error(status, &body)))
}

/// Render the node's `{"error": {...}}` envelope as one line.
pub fn describe_error(status: StatusCode, body: &Value) -> String {
    let error = &body["error"];
    match (error["reason"].as_str(), error["message"].as_str()) {
        (Some(reason), Some(message)) => {
            format!("request failed (HTTP {}): {reason}: {message}", status.as_u16())
        }
        _ => format!("request failed (HTTP {})", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(endpoint: String, token: Option<&str>) -> ApiClient {
        ApiClient::new(&Connection {
            endpoint,
            token: token.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn test_describe_error_envelope() {
        let body = json!({"error": {
            "code": "NOT_FOUND",
            "reason": "tenant_not_found",
            "message": "tenant x not found"
        }});
        assert_eq!(
            describe_error(StatusCode::NOT_FOUND, &body),
            "request failed (HTTP 404): tenant_not_found: tenant x not found"
        );
        assert_eq!(
            describe_error(StatusCode::BAD_GATEWAY, &Value::Null),
            "request failed (HTTP 502)"
        );
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let router = Router::new().route(
            "/whoami",
            get(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({"auth": auth}))
            }),
        );
        let endpoint = serve(router).await;
        let body = client(format!("{endpoint}/"), Some("secret"))
            .get("/whoami")
            .await
            .unwrap();
        assert_eq!(body["auth"], "Bearer secret");
    }

    #[tokio::test]
    async fn test_error_status_becomes_error() {
        let router = Router::new().route(
            "/fail",
            get(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(json!({"error": {
                        "code": "UNAUTHORIZED",
                        "reason": "missing_credentials",
                        "message": "no credentials supplied"
                    }})),
                )
            }),
        );
        let endpoint = serve(router).await;
        let err = client(endpoint, None).get("/fail").await.unwrap_err();
        assert!(err.to_string().contains("missing_credentials"));
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let err = client("http://127.0.0.1:1".into(), None)
            .get("/health")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("could not reach node"));
    }
}
