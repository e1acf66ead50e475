//! The stdout contract: exactly one JSON object per invocation.

use serde::Serialize;
use serde_json::Value;

/// The single object printed to stdout. `data` is present on success,
/// `message` on failure (and occasionally on success for informational
/// commands).
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Print the envelope to stdout. Even a serialization failure must not
    /// break the one-object contract.
    pub fn emit(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                println!(
                    "{{\"success\":false,\"message\":\"failed to serialize output: {error}\"}}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_envelope_omits_message() {
        let envelope = Envelope::ok(serde_json::json!({"count": 3}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["count"], 3);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_err_envelope_omits_data() {
        let envelope = Envelope::err("no credentials");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "no credentials");
        assert!(json.get("data").is_none());
    }
}
