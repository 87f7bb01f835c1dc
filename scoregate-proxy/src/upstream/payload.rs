//! Shaping of upstream response bodies.

use serde_json::{json, Value};

/// Body returned to callers when the upstream could not be used
pub const FALLBACK: &str = r#"{"status":"fallback","reason":"upstream unavailable"}"#;

/// Cut the outermost `{...}` out of a body that may carry surrounding noise.
///
/// Returns the input unchanged when it has no such span.
pub fn extract_json(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if end > start => &raw[start..=end],
        _ => raw,
    }
}

/// Clean up a successful score body.
///
/// When the body is a JSON object carrying `cpf` and `score`, a readable
/// `message` field is added. Anything unparsable is passed through as the
/// extracted JSON span.
pub fn annotate_score(raw: &str) -> String {
    let json = extract_json(raw);
    let Ok(mut value) = serde_json::from_str::<Value>(json) else {
        return json.to_string();
    };

    if let Some(object) = value.as_object_mut() {
        if let (Some(cpf), Some(score)) = (object.get("cpf"), object.get("score")) {
            let message = format!("O score de {} é {}", text_of(cpf), score_of(score));
            object.insert("message".to_string(), Value::String(message));
        }
    }

    value.to_string()
}

/// Success-shaped payload for a non-2xx upstream answer
pub fn upstream_error(status: u16, raw: &str) -> String {
    json!({
        "status": "upstream_error",
        "code": status,
        "body": extract_json(raw),
    })
    .to_string()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Scores are reported as integers; non-numeric values count as zero
fn score_of(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("noise {\"a\":1} trailer"), "{\"a\":1}");
        assert_eq!(extract_json("{\"a\":{\"b\":2}}"), "{\"a\":{\"b\":2}}");
        assert_eq!(extract_json("plain text"), "plain text");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_annotate_score_adds_message() {
        let body = annotate_score("{\"cpf\":\"12345678900\",\"score\":712}");
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["message"], "O score de 12345678900 é 712");
        assert_eq!(value["score"], 712);
    }

    #[test]
    fn test_annotate_score_without_fields() {
        let body = annotate_score("{\"status\":\"pending\"}");
        let value: Value = serde_json::from_str(&body).unwrap();
        assert!(value.get("message").is_none());
    }

    #[test]
    fn test_annotate_score_unparsable() {
        assert_eq!(annotate_score("garbage {not json}"), "{not json}");
    }

    #[test]
    fn test_upstream_error_payload() {
        let body = upstream_error(429, "<html>{\"error\":\"slow down\"}</html>");
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["status"], "upstream_error");
        assert_eq!(value["code"], 429);
        assert_eq!(value["body"], "{\"error\":\"slow down\"}");
    }

    #[test]
    fn test_upstream_error_empty_body() {
        let value: Value = serde_json::from_str(&upstream_error(500, "")).unwrap();
        assert_eq!(value["body"], "");
    }
}
