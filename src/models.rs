/// Wire types for the relay: the payload callers send, and the body forwarded to the Messages
/// API.
use crate::errors::ForwardError;
use serde::Serialize;
use serde_json::Value;

/// The two fields read from an incoming call. Neither is validated; whatever the caller sent is
/// forwarded untouched, and missing keys fall back to an empty system prompt and no messages.
#[derive(Debug, Clone, PartialEq)]
pub struct CallPayload {
    pub system: Value,
    pub messages: Value,
}

impl Default for CallPayload {
    fn default() -> Self {
        Self {
            system: Value::String(String::new()),
            messages: Value::Array(Vec::new()),
        }
    }
}

impl CallPayload {
    /// Reads `system` and `messages` out of the raw request body. An empty body counts as `{}`.
    pub fn from_body(body: &[u8]) -> Result<Self, ForwardError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let data: Value = serde_json::from_slice(body)
            .map_err(|e| ForwardError::InvalidPayload(e.to_string()))?;
        Self::from_data(data)
    }

    pub fn from_data(data: Value) -> Result<Self, ForwardError> {
        let Value::Object(mut data) = data else {
            return Err(ForwardError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_type(&data)
            )));
        };
        let defaults = Self::default();
        Ok(Self {
            system: data.remove("system").unwrap_or(defaults.system),
            messages: data.remove("messages").unwrap_or(defaults.messages),
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// The body sent to `POST /v1/messages`.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a Value,
    pub messages: &'a Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_gets_defaults() {
        let payload = CallPayload::from_data(json!({})).unwrap();
        assert_eq!(payload.system, json!(""));
        assert_eq!(payload.messages, json!([]));
    }

    #[test]
    fn test_empty_body_is_empty_object() {
        assert_eq!(CallPayload::from_body(b"").unwrap(), CallPayload::default());
        assert_eq!(CallPayload::from_body(b" \n").unwrap(), CallPayload::default());
    }

    #[test]
    fn test_fields_pass_through_untouched() {
        let payload = CallPayload::from_body(
            br#"{"system": [{"type": "text", "text": "S"}], "messages": [{"role": "user"}], "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(payload.system, json!([{"type": "text", "text": "S"}]));
        assert_eq!(payload.messages, json!([{"role": "user"}]));

        // An explicit null is kept, only a missing key gets the default
        let payload = CallPayload::from_data(json!({"system": null})).unwrap();
        assert_eq!(payload.system, Value::Null);
        assert_eq!(payload.messages, json!([]));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let err = CallPayload::from_body(b"[1, 2]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid request payload: expected a JSON object, got an array"
        );

        assert!(matches!(
            CallPayload::from_body(b"{not json"),
            Err(ForwardError::InvalidPayload(_))
        ));
    }
}
