//! The standard response envelope and token extraction.
//!
//! Every QuorumDB endpoint wraps its payload in the same JSON envelope:
//!
//! ```json
//! {"status": 200, "message": "ok", "data": ...}
//! ```
//!
//! The `status` field is application-level and independent of the HTTP
//! status code; anything other than 200 is an error and `message` carries
//! the server's explanation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::{ClientError, Result};

/// The `{status, message, data}` wrapper used on every server response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub status: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Builds a success envelope. Mostly useful for tests and mock servers.
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            message: String::new(),
            data,
        }
    }

    /// Builds an error envelope with the given status and message.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: Value::Null,
        }
    }

    /// Unwraps the envelope, returning `data` on status 200 and a
    /// [`ClientError::Server`] otherwise.
    pub fn into_data(self) -> Result<Value> {
        if self.status == 200 {
            Ok(self.data)
        } else {
            Err(ClientError::Server {
                status: self.status,
                message: self.message,
            })
        }
    }
}

/// An access/refresh token pair issued by `/db/connect` and `/db/refresh`.
///
/// Both fields must be present and non-empty; [`TokenPair::from_data`]
/// enforces that when extracting the pair from an envelope payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub refresh: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh: refresh.into(),
        }
    }

    /// Extracts a token pair from an envelope `data` payload.
    ///
    /// The token endpoints return a mapping that may carry extra bookkeeping
    /// fields; only `token` and `refresh` matter here, and both must be
    /// non-empty or the response is considered malformed.
    pub fn from_data(data: Value) -> Result<Self> {
        let pair: TokenPair =
            serde_json::from_value(data).map_err(|_| ClientError::MalformedToken)?;
        if pair.token.is_empty() || pair.refresh.is_empty() {
            return Err(ClientError::MalformedToken);
        }
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_ok_into_data() {
        let env = Envelope::ok(json!({"x": 1}));
        assert_eq!(env.into_data().unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_envelope_error_into_data() {
        let env = Envelope::error(403, "forbidden");
        match env.into_data() {
            Err(ClientError::Server { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "forbidden");
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_envelope_deserializes_with_missing_fields() {
        let env: Envelope = serde_json::from_str(r#"{"status": 200}"#).unwrap();
        assert_eq!(env.status, 200);
        assert_eq!(env.message, "");
        assert_eq!(env.data, Value::Null);
    }

    #[test]
    fn test_token_pair_from_data() {
        let pair = TokenPair::from_data(json!({
            "token": "abc",
            "refresh": "def",
            "expires_in": 3600
        }))
        .unwrap();
        assert_eq!(pair, TokenPair::new("abc", "def"));
    }

    #[test]
    fn test_token_pair_rejects_missing_refresh() {
        let result = TokenPair::from_data(json!({"token": "abc"}));
        assert!(matches!(result, Err(ClientError::MalformedToken)));
    }

    #[test]
    fn test_token_pair_rejects_empty_token() {
        let result = TokenPair::from_data(json!({"token": "", "refresh": "def"}));
        assert!(matches!(result, Err(ClientError::MalformedToken)));
    }

    #[test]
    fn test_token_pair_rejects_non_object() {
        let result = TokenPair::from_data(json!([1, 2, 3]));
        assert!(matches!(result, Err(ClientError::MalformedToken)));
    }
}
