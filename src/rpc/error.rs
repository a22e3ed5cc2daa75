use thiserror::Error;

/// Failures of a single JSON-RPC call to the node.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport failed (connection refused, timeout, non-JSON error body).
    #[error("HTTP error calling {method}: {message}")]
    Http { method: String, message: String },

    /// The node answered with a JSON-RPC error object.
    #[error("node error calling {method} ({code}): {message}")]
    Node {
        method: String,
        code: i64,
        message: String,
    },

    /// Neither `result` nor `error` in the response.
    #[error("response to {method} has no result")]
    MissingResult { method: String },

    /// The result does not have the expected shape.
    #[error("malformed response to {method}: {message}")]
    Malformed { method: String, message: String },
}

impl RpcError {
    pub fn method(&self) -> &str {
        match self {
            RpcError::Http { method, .. }
            | RpcError::Node { method, .. }
            | RpcError::MissingResult { method }
            | RpcError::Malformed { method, .. } => method,
        }
    }
}
