//! Core contracts for canopy.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - The alerts source trait and the GFW data API adapter
//! - Metadata caching, date range planning and geometry partitioning
//! - The concurrent batch fetch coordinator and its retry policy
//! - Scoped performance measurement and output sinks

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod gfw;
pub mod http_client;
pub mod metadata_cache;
pub mod partitioner;
pub mod perf;
pub mod planner;
pub mod retry;
pub mod sink;
pub mod source;
pub mod throttle;

pub use config::FetchConfig;
pub use coordinator::BatchFetchCoordinator;
pub use domain::{
    AlertRecord, AoiGeometry, BoundingBox, Confidence, Coord, DatasetDescriptor, DatasetId,
    DateChunk, DateRange, FetchResult, Partition, PartitionId, PolygonGeom, RegisteredPartition,
    UpdateCadence, UtcDateTime, WorkItem, WorkItemFailure,
};
pub use error::{CoreError, ValidationError};
pub use fetcher::{AlertsFetcher, PlanSummary, PullRequest};
pub use gfw::{GfwDataApi, DEFAULT_BASE_URL};
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use metadata_cache::{MetadataCache, DEFAULT_METADATA_TTL};
pub use partitioner::{partition, PartitionScheme};
pub use perf::{MemoryRecorder, NoopRecorder, PerfMonitor, PerfRecorder, PerfReport, PerfSpan};
pub use planner::{chunk_range, DateRangePlanner};
pub use retry::BackoffPolicy;
pub use sink::{drain_into, AlertSink, NdjsonSink, VecSink};
pub use source::{AlertsQuery, AlertsSource, SourceError, SourceErrorKind, SourceFuture};
pub use throttle::QueryThrottle;
