use thiserror::Error;

/// Errors surfaced by the QuorumDB client.
///
/// The dispatcher recovers from exactly two of these on its own: a 401 with
/// auto-refresh enabled (one silent refresh + retry) and a non-leader failure
/// with fallback enabled (one leader retry). Everything else reaches the
/// caller unchanged, except for the [`AfterRefresh`](ClientError::AfterRefresh)
/// and [`Fallback`](ClientError::Fallback) wrappers that record which recovery
/// phase failed.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("authentication required but no token available for node {0}")]
    NotAuthenticated(String),

    #[error("authentication failed: token refresh and reconnect both rejected")]
    AuthFailed,

    #[error("no sessions available in pool")]
    NoSessions,

    #[error("already connected, no need to call again")]
    AlreadyConnected,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("token pair missing or empty in response")]
    MalformedToken,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed after successful token refresh: {0}")]
    AfterRefresh(#[source] Box<ClientError>),

    #[error("fallback to leader failed: {0}")]
    Fallback(#[source] Box<ClientError>),

    #[error("no rows in result set")]
    NoRows,

    #[error("query returned more than one row")]
    MoreThanOneRow,
}

impl ClientError {
    /// Wraps an error with refresh-phase context.
    pub fn after_refresh(err: ClientError) -> Self {
        ClientError::AfterRefresh(Box::new(err))
    }

    /// Wraps an error with fallback-phase context.
    pub fn fallback(err: ClientError) -> Self {
        ClientError::Fallback(Box::new(err))
    }

    /// Peels phase-context wrappers off, exposing the root failure.
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::AfterRefresh(inner) | ClientError::Fallback(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_message() {
        let err = ClientError::Server {
            status: 500,
            message: "disk full".to_string(),
        };
        assert_eq!(err.to_string(), "server error (status 500): disk full");
    }

    #[test]
    fn test_context_wrappers_preserve_root() {
        let err = ClientError::fallback(ClientError::after_refresh(ClientError::NoSessions));
        assert!(matches!(err.root(), ClientError::NoSessions));
        assert!(err.to_string().starts_with("fallback to leader failed"));
    }

    #[test]
    fn test_root_of_plain_error() {
        let err = ClientError::AuthFailed;
        assert!(matches!(err.root(), ClientError::AuthFailed));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: ClientError = parse_err.into();
        assert!(matches!(err, ClientError::Json(_)));
    }
}
