/// Axum handlers for the relay's callables
use crate::client::HttpClient;
use crate::credentials::resolve_api_key;
use crate::errors::{ForwardError, RelayError};
use crate::models::CallPayload;
use crate::AppState;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::{error, info, instrument};

const PROBE_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const PROBE_MAX_TOKENS: u32 = 100;

/// The relay itself: authenticate the caller, then forward `system` and `messages` to the
/// Messages API and hand back whatever JSON it returns.
#[instrument(skip_all)]
pub async fn claude_proxy<T: HttpClient>(
    State(state): State<AppState<T>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let Some(caller) = state.registry.authenticate(&headers) else {
        info!("Rejecting call with no verified identity");
        return Err(RelayError::unauthenticated());
    };
    info!(caller = %caller, "claude_proxy called");

    match forward_call(&state, &body).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            error!("Error in claude_proxy: {}", e);
            Err(e.into())
        }
    }
}

async fn forward_call<T: HttpClient>(
    state: &AppState<T>,
    body: &[u8],
) -> Result<Value, ForwardError> {
    let api_key = resolve_api_key(state.env.as_ref(), &state.registry)?;
    let payload = CallPayload::from_body(body)?;
    send_payload(state, &api_key, &payload, state.upstream.max_tokens).await
}

async fn send_payload<T: HttpClient>(
    state: &AppState<T>,
    api_key: &str,
    payload: &CallPayload,
    max_tokens: u32,
) -> Result<Value, ForwardError> {
    let req = state
        .upstream
        .messages_request(api_key, payload, max_tokens)?;
    state.upstream.send(&state.http_client, req).await
}

/// An unauthenticated liveness callable that echoes back what it was sent.
#[instrument(skip_all)]
pub async fn hello_world(body: Bytes) -> Json<Value> {
    let received: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    info!(data = %received, "hello_world called");

    Json(json!({
        "message": "Hello from the relay!",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "receivedData": received,
    }))
}

/// Sends one fixed, small request upstream to check the key and connectivity.
#[instrument(skip_all)]
pub async fn test_claude_api<T: HttpClient>(State(state): State<AppState<T>>) -> Response {
    info!("Upstream probe requested");

    let payload = CallPayload {
        system: json!(PROBE_SYSTEM_PROMPT),
        messages: json!([{"role": "user", "content": "Hello!"}]),
    };
    let result = match resolve_api_key(state.env.as_ref(), &state.registry) {
        Ok(api_key) => send_payload(&state, &api_key, &payload, PROBE_MAX_TOKENS).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(data) => Json(json!({"success": true, "data": data})).into_response(),
        Err(e) => {
            error!("Error in upstream probe: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}
