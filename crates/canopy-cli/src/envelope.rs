//! Response envelope for machine-readable output.

use canopy_core::UtcDateTime;
use serde::Serialize;
use serde_json::Value;

/// Standard envelope wrapping every command's output.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: EnvelopeMeta,
    pub data: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
}

impl Envelope {
    pub fn new(meta: EnvelopeMeta, data: Value, errors: Vec<EnvelopeError>) -> Self {
        Self { meta, data, errors }
    }
}

/// Metadata attached to every envelope.
#[derive(Debug, Serialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    pub schema_version: String,
    pub generated_at: UtcDateTime,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnvelopeMeta {
    pub fn new(request_id: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            request_id: request_id.into(),
            schema_version: String::from("v1.0.0"),
            generated_at: UtcDateTime::now(),
            latency_ms,
            warnings: Vec::new(),
        }
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// One structured error surfaced in the envelope rather than aborting the
/// command (partial failures).
#[derive(Debug, Serialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl EnvelopeError {
    pub fn from_source(error: &canopy_core::SourceError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.message().to_string(),
            retryable: error.retryable(),
        }
    }
}
