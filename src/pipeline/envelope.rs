//! Response envelopes.
//!
//! Callers always receive a well-formed envelope: success bodies carry the
//! payload and its source, error bodies carry only a stable code and a
//! message.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Where a successful payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served from the cache store
    Cache,
    /// Produced by the downstream handler
    Api,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Api => "api",
        }
    }
}

#[derive(Serialize)]
struct SuccessEnvelope {
    success: bool,
    source: &'static str,
    data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

/// Build a success envelope.
pub fn success(source: Source, data: Value, metadata: Option<Value>) -> Value {
    serde_json::to_value(SuccessEnvelope {
        success: true,
        source: source.as_str(),
        data,
        metadata,
    })
    .unwrap_or(Value::Null)
}

/// Build an error envelope from the taxonomy.
pub fn error(err: &ApiError) -> Value {
    serde_json::to_value(ErrorEnvelope {
        success: false,
        error: ErrorBody {
            code: err.code(),
            message: err.to_string(),
            retry_after: err.retry_after(),
        },
    })
    .unwrap_or(Value::Null)
}
