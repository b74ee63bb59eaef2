//! The upstream Messages API: where calls are forwarded, and how.
//!
//! The model, token cap, URL and API version are fixed per process. They default to the
//! constants below and can be overridden from the command line.
use crate::client::HttpClient;
use crate::errors::ForwardError;
use crate::models::{CallPayload, MessagesRequest};
use axum::body::Body;
use axum::http::{Method, Request, header::CONTENT_TYPE};
use bon::Builder;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20240307";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const API_KEY_HEADER: &str = "x-api-key";
const API_VERSION_HEADER: &str = "anthropic-version";

fn default_messages_url() -> Url {
    ANTHROPIC_MESSAGES_URL
        .parse()
        .expect("default Messages API URL should be valid")
}

#[derive(Debug, Clone, Builder)]
pub struct Upstream {
    #[builder(default = default_messages_url())]
    pub url: Url,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(default = DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,
    #[builder(into, default = ANTHROPIC_VERSION.to_string())]
    pub api_version: String,
    /// Bounds the whole exchange, from sending the request to reading the last body byte.
    #[builder(default = DEFAULT_TIMEOUT)]
    pub timeout: Duration,
}

impl Default for Upstream {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Upstream {
    /// Builds the `POST /v1/messages` request for a call.
    pub fn messages_request(
        &self,
        api_key: &str,
        payload: &CallPayload,
        max_tokens: u32,
    ) -> Result<Request<Body>, ForwardError> {
        let body = serde_json::to_vec(&MessagesRequest {
            model: &self.model,
            max_tokens,
            system: &payload.system,
            messages: &payload.messages,
        })
        .map_err(|e| ForwardError::Request(e.to_string()))?;

        Request::builder()
            .method(Method::POST)
            .uri(self.url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, api_key)
            .header(API_VERSION_HEADER, self.api_version.as_str())
            .body(Body::from(body))
            .map_err(|e| ForwardError::Request(e.to_string()))
    }

    /// Sends a request upstream and decodes the JSON response. Any 4xx or 5xx status is a
    /// failure; anything else must carry a JSON body.
    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn send<T: HttpClient>(
        &self,
        client: &T,
        req: Request<Body>,
    ) -> Result<Value, ForwardError> {
        match tokio::time::timeout(self.timeout, self.exchange(client, req)).await {
            Ok(result) => result,
            Err(_) => Err(ForwardError::Timeout {
                url: self.url.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange<T: HttpClient>(
        &self,
        client: &T,
        req: Request<Body>,
    ) -> Result<Value, ForwardError> {
        let response = client
            .request(req)
            .await
            .map_err(|e| ForwardError::Transport {
                url: self.url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ForwardError::Body(e.to_string()))?;

        if status.is_client_error() || status.is_server_error() {
            debug!(
                status = status.as_u16(),
                body = %String::from_utf8_lossy(&body[..body.len().min(500)]),
                "Upstream returned an error status"
            );
            return Err(ForwardError::Status {
                status,
                url: self.url.to_string(),
            });
        }

        debug!(status = status.as_u16(), bytes = body.len(), "Upstream response received");
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockHttpClient;
    use axum::http::StatusCode;
    use serde_json::json;

    fn payload() -> CallPayload {
        CallPayload {
            system: json!("S"),
            messages: json!([{"role": "user", "content": "hi"}]),
        }
    }

    #[test]
    fn test_defaults_match_messages_api() {
        let upstream = Upstream::default();
        assert_eq!(upstream.url.as_str(), ANTHROPIC_MESSAGES_URL);
        assert_eq!(upstream.model, "claude-3-7-sonnet-20240307");
        assert_eq!(upstream.max_tokens, 1000);
        assert_eq!(upstream.api_version, "2023-06-01");
    }

    #[tokio::test]
    async fn test_messages_request_shape() {
        let upstream = Upstream::builder().model("claude-test").build();
        let req = upstream
            .messages_request("sk-test", &payload(), upstream.max_tokens)
            .unwrap();

        assert_eq!(req.method(), Method::POST);
        assert_eq!(req.uri(), ANTHROPIC_MESSAGES_URL);
        assert_eq!(req.headers()["content-type"], "application/json");
        assert_eq!(req.headers()["x-api-key"], "sk-test");
        assert_eq!(req.headers()["anthropic-version"], "2023-06-01");

        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-test",
                "max_tokens": 1000,
                "system": "S",
                "messages": [{"role": "user", "content": "hi"}]
            })
        );
    }

    #[test]
    fn test_invalid_api_key_header_is_a_request_error() {
        let err = Upstream::default()
            .messages_request("bad\nkey", &payload(), 10)
            .unwrap_err();
        assert!(matches!(err, ForwardError::Request(_)));
    }

    #[tokio::test]
    async fn test_send_decodes_success_body() {
        let client = MockHttpClient::new(StatusCode::OK, r#"{"id": "msg_1"}"#);
        let upstream = Upstream::default();
        let req = upstream.messages_request("k", &payload(), 10).unwrap();

        let value = upstream.send(&client, req).await.unwrap();
        assert_eq!(value, json!({"id": "msg_1"}));
    }

    #[tokio::test]
    async fn test_send_rejects_error_statuses() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::TOO_MANY_REQUESTS, StatusCode::BAD_GATEWAY] {
            let client = MockHttpClient::new(status, r#"{"type": "error"}"#);
            let upstream = Upstream::default();
            let req = upstream.messages_request("k", &payload(), 10).unwrap();

            match upstream.send(&client, req).await {
                Err(ForwardError::Status { status: got, .. }) => assert_eq!(got, status),
                other => panic!("expected status error, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_send_rejects_malformed_json() {
        let client = MockHttpClient::new(StatusCode::OK, "<html>oops</html>");
        let upstream = Upstream::default();
        let req = upstream.messages_request("k", &payload(), 10).unwrap();

        let err = upstream.send(&client, req).await.unwrap_err();
        assert!(matches!(err, ForwardError::Decode(_)));
    }

    #[tokio::test]
    async fn test_send_reports_transport_failure() {
        let client = MockHttpClient::failing("connection refused");
        let upstream = Upstream::default();
        let req = upstream.messages_request("k", &payload(), 10).unwrap();

        let err = upstream.send(&client, req).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert!(err.to_string().contains(ANTHROPIC_MESSAGES_URL));
    }

    #[tokio::test]
    async fn test_send_times_out() {
        let client = MockHttpClient::new(StatusCode::OK, "{}").with_delay(Duration::from_secs(5));
        let upstream = Upstream::builder()
            .timeout(Duration::from_millis(20))
            .build();
        let req = upstream.messages_request("k", &payload(), 10).unwrap();

        let err = upstream.send(&client, req).await.unwrap_err();
        assert!(matches!(err, ForwardError::Timeout { .. }));
    }
}
