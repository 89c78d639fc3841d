//! Shared fixtures for canopy behavior tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub use std::sync::Arc;

pub use canopy_core::{
    AlertRecord, AlertsQuery, AlertsSource, AoiGeometry, BoundingBox, Confidence,
    DatasetDescriptor, DatasetId, DateChunk, DateRange, FetchConfig, PartitionId, SourceError,
    SourceFuture, UpdateCadence, WorkItem,
};

pub fn iso(day: &str) -> time::Date {
    canopy_core::domain::parse_iso_date(day).expect("valid test date")
}

pub fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(iso(start), iso(end)).expect("valid test range")
}

pub fn chunk(start: &str, end: &str) -> DateChunk {
    DateChunk::new(iso(start), iso(end)).expect("valid test chunk")
}

pub fn square_aoi(size: f64) -> AoiGeometry {
    AoiGeometry::rect(BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: size,
        max_y: size,
    })
}

/// Scriptable in-memory alerts source.
///
/// Counts calls and concurrent queries, injects per-partition failures, and
/// simulates latency. Registration mints sequential ids so tests can refer
/// to partitions deterministically.
pub struct MockAlertsSource {
    pub metadata_calls: AtomicUsize,
    pub registration_calls: AtomicUsize,
    pub query_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
    cadence: UpdateCadence,
    fail_metadata: bool,
    alerts_per_item: usize,
    scripted_failures: Mutex<HashMap<String, VecDeque<SourceError>>>,
}

impl Default for MockAlertsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAlertsSource {
    pub fn new() -> Self {
        Self {
            metadata_calls: AtomicUsize::new(0),
            registration_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
            cadence: UpdateCadence::Daily,
            fail_metadata: false,
            alerts_per_item: 1,
            scripted_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_cadence(mut self, cadence: UpdateCadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_failing_metadata(mut self) -> Self {
        self.fail_metadata = true;
        self
    }

    pub fn with_alerts_per_item(mut self, alerts_per_item: usize) -> Self {
        self.alerts_per_item = alerts_per_item;
        self
    }

    /// Queues errors a partition's queries return before succeeding.
    pub fn with_failures_for(self, partition: &str, errors: Vec<SourceError>) -> Self {
        self.scripted_failures
            .lock()
            .expect("failures lock")
            .insert(partition.to_string(), errors.into());
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_failure(&self, partition: &PartitionId) -> Option<SourceError> {
        self.scripted_failures
            .lock()
            .expect("failures lock")
            .get_mut(partition.as_str())
            .and_then(VecDeque::pop_front)
    }
}

impl AlertsSource for MockAlertsSource {
    fn fetch_metadata<'a>(&'a self, dataset: DatasetId) -> SourceFuture<'a, DatasetDescriptor> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_metadata;
        let cadence = self.cadence;
        Box::pin(async move {
            if fail {
                Err(SourceError::upstream("metadata endpoint unavailable"))
            } else {
                Ok(DatasetDescriptor::new(dataset, cadence))
            }
        })
    }

    fn register_partition<'a>(&'a self, _geometry: &'a AoiGeometry) -> SourceFuture<'a, PartitionId> {
        let index = self.registration_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(PartitionId::from_upstream(&format!("geo{index:04}"))) })
    }

    fn fetch_alerts<'a>(&'a self, query: AlertsQuery) -> SourceFuture<'a, Vec<AlertRecord>> {
        Box::pin(async move {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(error) = self.next_failure(&query.partition) {
                return Err(error);
            }

            Ok((0..self.alerts_per_item)
                .map(|_| AlertRecord {
                    latitude: 0.5,
                    longitude: 0.5,
                    recorded_at: query.chunk.start,
                    confidence: query.min_confidence,
                })
                .collect())
        })
    }
}
