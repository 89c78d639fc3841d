//! Fetch pipeline configuration.

use std::time::Duration;

use crate::domain::Confidence;
use crate::metadata_cache::DEFAULT_METADATA_TTL;
use crate::partitioner::PartitionScheme;
use crate::retry::BackoffPolicy;
use crate::ValidationError;

/// Tuning knobs for one fetch pipeline. `Default` mirrors production
/// settings; tests override the fields they exercise.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Validity window for cached dataset metadata.
    pub metadata_ttl: Duration,
    /// Cap on sub-geometries per request.
    pub max_partitions: usize,
    /// Cap on days per alert query.
    pub max_days_per_query: u32,
    /// Concurrent work items in flight.
    pub max_concurrent: usize,
    /// Let dataset cadence widen date chunks up to the per-query cap.
    pub smart_date_ranges: bool,
    /// Alerts below this confidence are filtered at the source.
    pub min_confidence: Confidence,
    pub partition_scheme: PartitionScheme,
    /// Overall deadline for one batch; `None` waits for every item.
    pub batch_timeout: Option<Duration>,
    pub backoff: BackoffPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            metadata_ttl: DEFAULT_METADATA_TTL,
            max_partitions: 10,
            max_days_per_query: 7,
            max_concurrent: 5,
            smart_date_ranges: true,
            min_confidence: Confidence::High,
            partition_scheme: PartitionScheme::default(),
            batch_timeout: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl FetchConfig {
    /// Rejects limits that would make the pipeline degenerate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_partitions == 0 {
            return Err(ValidationError::ZeroConfigValue {
                field: "max_partitions",
            });
        }
        if self.max_days_per_query == 0 {
            return Err(ValidationError::ZeroConfigValue {
                field: "max_days_per_query",
            });
        }
        if self.max_concurrent == 0 {
            return Err(ValidationError::ZeroConfigValue {
                field: "max_concurrent",
            });
        }
        Ok(())
    }
}
