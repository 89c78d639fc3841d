//! Batch fetch coordinator.
//!
//! Runs the partition x chunk work items concurrently under a bounded
//! permit pool, retries transient failures per item, and assembles a
//! `FetchResult` once every item is terminal. A failed item never discards
//! another item's records; an optional batch deadline cancels whatever is
//! still outstanding and records those items as cancelled.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::{
    AlertRecord, Confidence, DatasetId, DateChunk, FetchResult, PartitionId, WorkItem,
    WorkItemFailure,
};
use crate::retry::BackoffPolicy;
use crate::source::{AlertsQuery, AlertsSource, SourceError};

pub struct BatchFetchCoordinator {
    source: Arc<dyn AlertsSource>,
    max_concurrent: usize,
    backoff: BackoffPolicy,
    batch_timeout: Option<Duration>,
}

impl BatchFetchCoordinator {
    pub fn new(source: Arc<dyn AlertsSource>, max_concurrent: usize, backoff: BackoffPolicy) -> Self {
        Self {
            source,
            max_concurrent: max_concurrent.max(1),
            backoff,
            batch_timeout: None,
        }
    }

    /// Overall deadline for the batch. Items still running when it expires
    /// are aborted and recorded as cancelled failures; items that already
    /// settled keep their outcome.
    pub fn with_batch_timeout(mut self, batch_timeout: Duration) -> Self {
        self.batch_timeout = Some(batch_timeout);
        self
    }

    /// Executes every work item and returns only once all are terminal.
    ///
    /// Records are grouped per partition and appended in ascending
    /// chunk-start order regardless of completion order, so each
    /// partition's sequence reads chronologically.
    pub async fn fetch_batch(
        &self,
        dataset: DatasetId,
        min_confidence: Confidence,
        items: Vec<WorkItem>,
    ) -> FetchResult {
        let mut result = FetchResult::new();
        if items.is_empty() {
            return result;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            let source = self.source.clone();
            let semaphore = semaphore.clone();
            let backoff = self.backoff.clone();
            let item = item.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (index, Err(SourceError::cancelled("batch shut down")), 0);
                    }
                };
                let (outcome, attempts) =
                    run_item(source.as_ref(), &item, dataset, min_confidence, &backoff).await;
                (index, outcome, attempts)
            });
        }

        let mut outcomes: Vec<Option<Settled>> = items.iter().map(|_| None).collect();
        self.settle(&mut join_set, &mut outcomes).await;

        // Buffer per partition, then emit in chronological chunk order.
        let mut buffered: BTreeMap<PartitionId, Vec<(DateChunk, Vec<AlertRecord>)>> =
            BTreeMap::new();
        for (item, outcome) in items.into_iter().zip(outcomes) {
            match outcome {
                Some((Ok(records), _)) => {
                    buffered.entry(item.partition).or_default().push((item.chunk, records));
                }
                Some((Err(error), attempts)) => {
                    result.push_failure(WorkItemFailure {
                        partition: item.partition,
                        chunk: item.chunk,
                        error,
                        attempts,
                    });
                }
                None => {
                    result.push_failure(WorkItemFailure {
                        partition: item.partition,
                        chunk: item.chunk,
                        error: SourceError::cancelled("batch deadline exceeded"),
                        attempts: 0,
                    });
                }
            }
        }

        for (partition, mut chunks) in buffered {
            chunks.sort_by_key(|(chunk, _)| chunk.start);
            for (_, records) in chunks {
                result.append_records(partition.clone(), records);
            }
        }

        result
    }

    /// Drains the join set, honoring the batch deadline if one is set.
    async fn settle(
        &self,
        join_set: &mut JoinSet<(usize, Result<Vec<AlertRecord>, SourceError>, u32)>,
        outcomes: &mut [Option<Settled>],
    ) {
        let deadline = self.batch_timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            join_set.abort_all();
                            // Keep outcomes of items that settled before the
                            // abort landed; aborted items stay unsettled.
                            while let Some(joined) = join_set.join_next().await {
                                if let Ok((index, outcome, attempts)) = joined {
                                    outcomes[index] = Some((outcome, attempts));
                                }
                            }
                            return;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            match joined {
                Some(Ok((index, outcome, attempts))) => {
                    outcomes[index] = Some((outcome, attempts));
                }
                Some(Err(_)) => {
                    // Panicked task; its slot stays unsettled and is reported
                    // as cancelled.
                }
                None => return,
            }
        }
    }
}

type Settled = (Result<Vec<AlertRecord>, SourceError>, u32);

/// Retry loop for one work item. Returns the terminal outcome and the
/// number of attempts consumed.
async fn run_item(
    source: &dyn AlertsSource,
    item: &WorkItem,
    dataset: DatasetId,
    min_confidence: Confidence,
    backoff: &BackoffPolicy,
) -> Settled {
    let mut attempt = 0u32;
    loop {
        let query = AlertsQuery::new(item.partition.clone(), item.chunk, dataset, min_confidence);
        match source.fetch_alerts(query).await {
            Ok(records) => return (Ok(records), attempt + 1),
            Err(error) => {
                if backoff.should_retry(&error, attempt) {
                    tokio::time::sleep(backoff.delay_for_attempt(attempt)).await;
                    attempt += 1;
                } else {
                    return (Err(error), attempt + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use time::Date;

    use crate::domain::{parse_iso_date, AoiGeometry, DatasetDescriptor, UpdateCadence};
    use crate::source::{SourceErrorKind, SourceFuture};

    struct ScriptedSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        base_latency: Duration,
        partition_latency: HashMap<String, Duration>,
        chunk_latency: HashMap<Date, Duration>,
        scripted_errors: StdMutex<HashMap<String, VecDeque<SourceError>>>,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                base_latency: Duration::ZERO,
                partition_latency: HashMap::new(),
                chunk_latency: HashMap::new(),
                scripted_errors: StdMutex::new(HashMap::new()),
            }
        }

        fn with_base_latency(mut self, latency: Duration) -> Self {
            self.base_latency = latency;
            self
        }

        fn with_partition_latency(mut self, partition: &str, latency: Duration) -> Self {
            self.partition_latency.insert(partition.to_string(), latency);
            self
        }

        fn with_chunk_latency(mut self, day: &str, latency: Duration) -> Self {
            self.chunk_latency
                .insert(parse_iso_date(day).expect("valid date"), latency);
            self
        }

        fn failing_first(self, partition: &str, errors: Vec<SourceError>) -> Self {
            self.scripted_errors
                .lock()
                .expect("scripts lock")
                .insert(partition.to_string(), errors.into());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        fn latency_for(&self, query: &AlertsQuery) -> Duration {
            self.partition_latency
                .get(query.partition.as_str())
                .or_else(|| self.chunk_latency.get(&query.chunk.start))
                .copied()
                .unwrap_or(self.base_latency)
        }

        fn next_scripted_error(&self, partition: &PartitionId) -> Option<SourceError> {
            self.scripted_errors
                .lock()
                .expect("scripts lock")
                .get_mut(partition.as_str())
                .and_then(VecDeque::pop_front)
        }
    }

    impl AlertsSource for ScriptedSource {
        fn fetch_metadata<'a>(&'a self, dataset: DatasetId) -> SourceFuture<'a, DatasetDescriptor> {
            Box::pin(async move { Ok(DatasetDescriptor::new(dataset, UpdateCadence::Daily)) })
        }

        fn register_partition<'a>(
            &'a self,
            _geometry: &'a AoiGeometry,
        ) -> SourceFuture<'a, PartitionId> {
            Box::pin(async { Ok(PartitionId::from_upstream("stub")) })
        }

        fn fetch_alerts<'a>(&'a self, query: AlertsQuery) -> SourceFuture<'a, Vec<AlertRecord>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(current, Ordering::SeqCst);

                tokio::time::sleep(self.latency_for(&query)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if let Some(error) = self.next_scripted_error(&query.partition) {
                    return Err(error);
                }

                Ok(vec![AlertRecord {
                    latitude: 0.1,
                    longitude: 0.2,
                    recorded_at: query.chunk.start,
                    confidence: query.min_confidence,
                }])
            })
        }
    }

    fn chunk(start: &str, end: &str) -> DateChunk {
        DateChunk::new(
            parse_iso_date(start).expect("valid date"),
            parse_iso_date(end).expect("valid date"),
        )
        .expect("valid chunk")
    }

    fn item(partition: &str, start: &str, end: &str) -> WorkItem {
        WorkItem {
            partition: PartitionId::from_upstream(partition),
            chunk: chunk(start, end),
        }
    }

    fn coordinator(source: Arc<ScriptedSource>, max_concurrent: usize) -> BatchFetchCoordinator {
        BatchFetchCoordinator::new(
            source,
            max_concurrent,
            BackoffPolicy::fixed(Duration::from_millis(1), 3),
        )
    }

    #[tokio::test]
    async fn empty_batch_is_a_complete_empty_result() {
        let source = Arc::new(ScriptedSource::new());
        let result = coordinator(source, 4)
            .fetch_batch(
                DatasetId::GfwIntegratedAlerts,
                Confidence::High,
                Vec::new(),
            )
            .await;

        assert!(result.is_complete());
        assert_eq!(result.total_alerts(), 0);
    }

    #[tokio::test]
    async fn chunks_come_back_in_chronological_order() {
        // Later chunks finish first; ordering must not depend on completion
        // order.
        let source = Arc::new(
            ScriptedSource::new()
                .with_chunk_latency("2024-01-01", Duration::from_millis(60))
                .with_chunk_latency("2024-01-08", Duration::from_millis(30))
                .with_chunk_latency("2024-01-15", Duration::ZERO),
        );
        let items = vec![
            item("aaa", "2024-01-01", "2024-01-08"),
            item("aaa", "2024-01-08", "2024-01-15"),
            item("aaa", "2024-01-15", "2024-01-22"),
        ];

        let result = coordinator(source, 3)
            .fetch_batch(DatasetId::GfwIntegratedAlerts, Confidence::High, items)
            .await;

        assert!(result.is_complete());
        let records = &result.records()[&PartitionId::from_upstream("aaa")];
        let dates: Vec<Date> = records.iter().map(|record| record.recorded_at).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(dates.len(), 3);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_ceiling() {
        let source = Arc::new(
            ScriptedSource::new().with_base_latency(Duration::from_millis(20)),
        );
        let items: Vec<WorkItem> = (0..8)
            .map(|index| WorkItem {
                partition: PartitionId::from_upstream(&format!("p{index}")),
                chunk: chunk("2024-01-01", "2024-01-08"),
            })
            .collect();

        let result = coordinator(source.clone(), 2)
            .fetch_batch(DatasetId::GfwIntegratedAlerts, Confidence::High, items)
            .await;

        assert!(result.is_complete());
        assert!(source.max_in_flight() <= 2, "max={}", source.max_in_flight());
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let source = Arc::new(ScriptedSource::new().failing_first(
            "aaa",
            vec![
                SourceError::upstream("boom"),
                SourceError::rate_limited("slow down"),
            ],
        ));

        let result = coordinator(source.clone(), 2)
            .fetch_batch(
                DatasetId::GfwIntegratedAlerts,
                Confidence::High,
                vec![item("aaa", "2024-01-01", "2024-01-08")],
            )
            .await;

        assert!(result.is_complete());
        assert_eq!(result.total_alerts(), 1);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_land_in_the_failure_manifest() {
        let source = Arc::new(ScriptedSource::new().failing_first(
            "aaa",
            vec![SourceError::timeout("t"); 10],
        ));
        let coordinator = BatchFetchCoordinator::new(
            source.clone(),
            2,
            BackoffPolicy::fixed(Duration::from_millis(1), 2),
        );

        let result = coordinator
            .fetch_batch(
                DatasetId::GfwIntegratedAlerts,
                Confidence::High,
                vec![item("aaa", "2024-01-01", "2024-01-08")],
            )
            .await;

        assert!(!result.is_complete());
        assert_eq!(source.calls(), 3);
        let failure = &result.failures()[0];
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.error.kind(), SourceErrorKind::Timeout);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_on_the_first_attempt() {
        let source = Arc::new(
            ScriptedSource::new()
                .failing_first("aaa", vec![SourceError::unauthorized("bad key")]),
        );

        let result = coordinator(source.clone(), 2)
            .fetch_batch(
                DatasetId::GfwIntegratedAlerts,
                Confidence::High,
                vec![item("aaa", "2024-01-01", "2024-01-08")],
            )
            .await;

        assert_eq!(source.calls(), 1);
        assert_eq!(result.failures()[0].attempts, 1);
    }

    #[tokio::test]
    async fn one_failed_item_does_not_discard_the_others() {
        let source = Arc::new(
            ScriptedSource::new()
                .failing_first("bbb", vec![SourceError::malformed_request("bad sql")]),
        );
        let items = vec![
            item("aaa", "2024-01-01", "2024-01-08"),
            item("bbb", "2024-01-01", "2024-01-08"),
        ];

        let result = coordinator(source, 2)
            .fetch_batch(DatasetId::GfwIntegratedAlerts, Confidence::High, items)
            .await;

        assert_eq!(result.total_alerts(), 1);
        assert!(result
            .records()
            .contains_key(&PartitionId::from_upstream("aaa")));
        let failed = result.failed_partitions();
        assert!(failed.contains(&PartitionId::from_upstream("bbb")));
    }

    #[tokio::test]
    async fn deadline_cancels_outstanding_items_and_keeps_settled_ones() {
        let source = Arc::new(
            ScriptedSource::new()
                .with_partition_latency("slow1", Duration::from_millis(500))
                .with_partition_latency("slow2", Duration::from_millis(500)),
        );
        let items = vec![
            item("fast", "2024-01-01", "2024-01-08"),
            item("slow1", "2024-01-01", "2024-01-08"),
            item("slow2", "2024-01-01", "2024-01-08"),
        ];

        let coordinator = coordinator(source, 3).with_batch_timeout(Duration::from_millis(100));
        let result = coordinator
            .fetch_batch(DatasetId::GfwIntegratedAlerts, Confidence::High, items)
            .await;

        assert_eq!(result.total_alerts(), 1);
        assert_eq!(result.failures().len(), 2);
        for failure in result.failures() {
            assert_eq!(failure.error.kind(), SourceErrorKind::Cancelled);
        }
    }
}
