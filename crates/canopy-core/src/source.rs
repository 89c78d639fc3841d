//! Alerts source contract.
//!
//! The upstream alerts API is consumed behind this trait so the planner,
//! cache and coordinator never see a transport. Implementations must be
//! `Send + Sync`; methods return boxed futures so the trait stays object
//! safe.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::domain::{
    AlertRecord, AoiGeometry, Confidence, DatasetDescriptor, DatasetId, DateChunk, PartitionId,
};

/// Upstream call error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Request deadline exceeded. Retryable.
    Timeout,
    /// Upstream asked us to slow down. Retryable.
    RateLimited,
    /// 5xx or connection-level failure. Retryable.
    Upstream,
    /// Credentials rejected. Not retryable.
    Unauthorized,
    /// The request itself was malformed. Not retryable.
    MalformedRequest,
    /// Response body could not be decoded. Not retryable.
    Decode,
    /// The batch was cancelled before this item settled. Not retryable.
    Cancelled,
}

/// Structured upstream error carried through retry decisions and the
/// failure manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::Timeout, message: message.into() }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::RateLimited, message: message.into() }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::Upstream, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::Unauthorized, message: message.into() }
    }

    pub fn malformed_request(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::MalformedRequest, message: message.into() }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::Decode, message: message.into() }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self { kind: SourceErrorKind::Cancelled, message: message.into() }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True exactly for the transient kinds the coordinator retries.
    pub const fn retryable(&self) -> bool {
        matches!(
            self.kind,
            SourceErrorKind::Timeout | SourceErrorKind::RateLimited | SourceErrorKind::Upstream
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Unauthorized => "source.unauthorized",
            SourceErrorKind::MalformedRequest => "source.malformed_request",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::Cancelled => "source.cancelled",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// One alert query: a registered partition over one date chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertsQuery {
    pub partition: PartitionId,
    pub chunk: DateChunk,
    pub dataset: DatasetId,
    pub min_confidence: Confidence,
}

impl AlertsQuery {
    pub fn new(
        partition: PartitionId,
        chunk: DateChunk,
        dataset: DatasetId,
        min_confidence: Confidence,
    ) -> Self {
        Self {
            partition,
            chunk,
            dataset,
            min_confidence,
        }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Consumed interface to the upstream alerts API.
pub trait AlertsSource: Send + Sync {
    /// Fetches the dataset descriptor from the metadata endpoint.
    fn fetch_metadata<'a>(&'a self, dataset: DatasetId) -> SourceFuture<'a, DatasetDescriptor>;

    /// Registers a partition geometry upstream and returns its identifier.
    /// Registration is re-issuable; identifiers are never assumed reusable
    /// across requests.
    fn register_partition<'a>(&'a self, geometry: &'a AoiGeometry) -> SourceFuture<'a, PartitionId>;

    /// Fetches alerts for one partition and date chunk, already filtered to
    /// the minimum confidence.
    fn fetch_alerts<'a>(&'a self, query: AlertsQuery) -> SourceFuture<'a, Vec<AlertRecord>>;
}
