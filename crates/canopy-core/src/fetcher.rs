//! End-to-end pull pipeline.
//!
//! One `pull` call runs the whole retrieval flow: metadata through the TTL
//! cache, date range planning, geometry partitioning, partition
//! registration, then the concurrent batch fetch. Metadata being
//! unavailable degrades to fixed-size chunking with a warning rather than
//! failing the pull; a partition that cannot be registered becomes a
//! failure manifest entry covering the full requested range.

use std::sync::Arc;

use crate::config::FetchConfig;
use crate::coordinator::BatchFetchCoordinator;
use crate::domain::{
    AoiGeometry, DatasetId, DateChunk, DateRange, FetchResult, PartitionId, RegisteredPartition,
    WorkItem, WorkItemFailure,
};
use crate::metadata_cache::MetadataCache;
use crate::partitioner;
use crate::perf::{PerfMonitor, PerfRecorder};
use crate::planner::{chunk_range, DateRangePlanner};
use crate::source::{AlertsSource, SourceError};
use crate::CoreError;

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub dataset: DatasetId,
    pub geometry: AoiGeometry,
    pub range: DateRange,
}

/// Query plan preview: what a pull would execute, without executing it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanSummary {
    pub chunks: Vec<DateChunk>,
    pub partition_count: usize,
    pub work_items: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct AlertsFetcher {
    source: Arc<dyn AlertsSource>,
    cache: MetadataCache,
    config: FetchConfig,
    monitor: PerfMonitor<Arc<dyn PerfRecorder>>,
}

impl AlertsFetcher {
    pub fn new(
        source: Arc<dyn AlertsSource>,
        config: FetchConfig,
        recorder: Arc<dyn PerfRecorder>,
    ) -> Self {
        let cache = MetadataCache::new(source.clone(), config.metadata_ttl);
        Self {
            source,
            cache,
            config,
            monitor: PerfMonitor::new(recorder),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Computes the chunk and partition plan for a request without issuing
    /// any alert queries. Metadata is still fetched (through the cache) when
    /// smart planning is on.
    pub async fn plan(&self, request: &PullRequest) -> Result<PlanSummary, CoreError> {
        self.config.validate()?;

        let mut warnings = Vec::new();
        let chunks = self.plan_chunks(request, &mut warnings).await?;
        let partitions = partitioner::partition(
            &request.geometry,
            &self.config.partition_scheme,
            self.config.max_partitions,
        )?;

        Ok(PlanSummary {
            work_items: partitions.len() * chunks.len(),
            partition_count: partitions.len(),
            chunks,
            warnings,
        })
    }

    /// Runs a full pull and returns the per-partition records plus the
    /// failure manifest. Only validation problems fail the call; upstream
    /// trouble lands in the manifest.
    pub async fn pull(&self, request: PullRequest) -> Result<FetchResult, CoreError> {
        self.config.validate()?;
        let mut span = self.monitor.span("pull_alerts");

        let mut warnings = Vec::new();
        let chunks = self.plan_chunks(&request, &mut warnings).await?;
        let partitions = partitioner::partition(
            &request.geometry,
            &self.config.partition_scheme,
            self.config.max_partitions,
        )?;
        span.add("chunks", chunks.len() as u64);
        span.add("partitions", partitions.len() as u64);

        // Register each partition upstream; a partition that cannot be
        // registered is reported once, over the full requested range.
        let mut registered: Vec<RegisteredPartition> = Vec::new();
        let mut registration_failures: Vec<WorkItemFailure> = Vec::new();
        let full_range = DateChunk::new(request.range.start, request.range.end)?;

        for (index, partition) in partitions.into_iter().enumerate() {
            match self.register_with_retry(&partition.geometry).await {
                Ok(id) => registered.push(RegisteredPartition {
                    id,
                    geometry: partition.geometry,
                }),
                Err((error, attempts)) => registration_failures.push(WorkItemFailure {
                    partition: PartitionId::unregistered(index),
                    chunk: full_range,
                    error,
                    attempts,
                }),
            }
        }

        let items: Vec<WorkItem> = registered
            .iter()
            .flat_map(|partition| {
                chunks.iter().map(|chunk| WorkItem {
                    partition: partition.id.clone(),
                    chunk: *chunk,
                })
            })
            .collect();
        span.add("work_items", items.len() as u64);

        let mut coordinator = BatchFetchCoordinator::new(
            self.source.clone(),
            self.config.max_concurrent,
            self.config.backoff.clone(),
        );
        if let Some(batch_timeout) = self.config.batch_timeout {
            coordinator = coordinator.with_batch_timeout(batch_timeout);
        }

        let mut result = coordinator
            .fetch_batch(request.dataset, self.config.min_confidence, items)
            .await;

        for failure in registration_failures {
            result.push_failure(failure);
        }
        for warning in warnings {
            result.push_warning(warning);
        }

        span.add("alerts", result.total_alerts() as u64);
        span.add("failures", result.failures().len() as u64);
        span.end();

        Ok(result)
    }

    /// Fetches the dataset descriptor for display. Goes through the cache.
    pub async fn metadata(
        &self,
        dataset: DatasetId,
    ) -> Result<crate::domain::DatasetDescriptor, CoreError> {
        Ok(self.cache.get(dataset).await?)
    }

    async fn plan_chunks(
        &self,
        request: &PullRequest,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<DateChunk>, CoreError> {
        if !self.config.smart_date_ranges {
            return Ok(chunk_range(request.range, self.config.max_days_per_query));
        }

        match self.cache.get(request.dataset).await {
            Ok(descriptor) => {
                let planner = DateRangePlanner::new(true);
                Ok(planner.plan(
                    Some(&descriptor),
                    request.range,
                    self.config.max_days_per_query,
                )?)
            }
            Err(error) => {
                warnings.push(format!(
                    "metadata unavailable for {}, using fixed {}-day chunks: {}",
                    request.dataset, self.config.max_days_per_query, error
                ));
                Ok(chunk_range(request.range, self.config.max_days_per_query))
            }
        }
    }

    async fn register_with_retry(
        &self,
        geometry: &AoiGeometry,
    ) -> Result<PartitionId, (SourceError, u32)> {
        let mut attempt = 0u32;
        loop {
            match self.source.register_partition(geometry).await {
                Ok(id) => return Ok(id),
                Err(error) => {
                    if self.config.backoff.should_retry(&error, attempt) {
                        tokio::time::sleep(self.config.backoff.delay_for_attempt(attempt)).await;
                        attempt += 1;
                    } else {
                        return Err((error, attempt + 1));
                    }
                }
            }
        }
    }
}
