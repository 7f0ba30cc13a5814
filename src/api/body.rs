use serde_json::{Map, Value};

/// Parse a response body, treating empty or non-JSON payloads as `{}`.
pub fn parse_lenient(bytes: &[u8]) -> Value {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Value::Object(Map::new());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn non_empty_str(v: Option<&Value>) -> Option<&str> {
    v.and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

/// `error.message`, then `message`, for failed resource calls.
pub fn request_error_message(body: &Value) -> Option<String> {
    non_empty_str(body.get("error").and_then(|e| e.get("message")))
        .or_else(|| non_empty_str(body.get("message")))
        .map(str::to_string)
}

/// Login failures also accept a bare string under `error`.
pub fn login_error_message(body: &Value) -> Option<String> {
    request_error_message(body).or_else(|| non_empty_str(body.get("error")).map(str::to_string))
}
