use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::Date;

use crate::domain::date::{iso_date, DateChunk};
use crate::domain::dataset::Confidence;
use crate::domain::geometry::AoiGeometry;
use crate::source::SourceError;

/// Opaque identifier minted by the alerts source when a partition geometry
/// is registered (geostore id in compact form).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(String);

impl PartitionId {
    /// Normalizes an upstream id to compact form: dashes stripped,
    /// lowercased. The query endpoint only accepts the compact form.
    pub fn from_upstream(raw: &str) -> Self {
        Self(raw.chars().filter(|ch| *ch != '-').collect::<String>().to_ascii_lowercase())
    }

    /// Placeholder identity for a partition whose registration failed, so
    /// the failure manifest can still name it for a selective retry.
    pub fn unregistered(index: usize) -> Self {
        Self(format!("unregistered-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartitionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sub-geometry produced by the partitioner, not yet registered upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub geometry: AoiGeometry,
}

/// Partition with its upstream identity, ready to be queried.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredPartition {
    pub id: PartitionId,
    pub geometry: AoiGeometry,
}

/// Unit of concurrent execution: one partition over one date chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub partition: PartitionId,
    pub chunk: DateChunk,
}

/// One normalized detected event. Immutable; grouped by originating
/// partition on return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "iso_date")]
    pub recorded_at: Date,
    pub confidence: Confidence,
}

/// Terminal failure of a single work item, after retries were exhausted or
/// the error was not retryable.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItemFailure {
    pub partition: PartitionId,
    pub chunk: DateChunk,
    #[serde(serialize_with = "serialize_error")]
    pub error: SourceError,
    pub attempts: u32,
}

fn serialize_error<S>(error: &SourceError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&error.to_string())
}

/// Outcome of a batch fetch: per-partition ordered alert sequences plus an
/// explicit failure manifest. Populated incrementally as work items settle
/// and returned only once every item is terminal.
#[derive(Debug, Default, Serialize)]
pub struct FetchResult {
    records: BTreeMap<PartitionId, Vec<AlertRecord>>,
    failures: Vec<WorkItemFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

impl FetchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends records for a partition. Callers are responsible for
    /// chronological ordering across calls; the coordinator appends chunks
    /// in ascending chunk-start order only after all of a partition's items
    /// have settled.
    pub fn append_records(&mut self, partition: PartitionId, records: Vec<AlertRecord>) {
        self.records.entry(partition).or_default().extend(records);
    }

    pub fn push_failure(&mut self, failure: WorkItemFailure) {
        self.failures.push(failure);
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn records(&self) -> &BTreeMap<PartitionId, Vec<AlertRecord>> {
        &self.records
    }

    pub fn failures(&self) -> &[WorkItemFailure] {
        &self.failures
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn failed_partitions(&self) -> BTreeSet<&PartitionId> {
        self.failures.iter().map(|failure| &failure.partition).collect()
    }

    pub fn total_alerts(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::date::parse_iso_date;
    use crate::source::SourceError;

    fn chunk(start: &str, end: &str) -> DateChunk {
        DateChunk::new(
            parse_iso_date(start).expect("valid date"),
            parse_iso_date(end).expect("valid date"),
        )
        .expect("valid chunk")
    }

    fn record(day: &str) -> AlertRecord {
        AlertRecord {
            latitude: 0.5,
            longitude: 0.5,
            recorded_at: parse_iso_date(day).expect("valid date"),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn compacts_upstream_geostore_id() {
        let id = PartitionId::from_upstream("A1B2-C3D4-E5F6");
        assert_eq!(id.as_str(), "a1b2c3d4e5f6");
    }

    #[test]
    fn result_tracks_totals_and_failed_partitions() {
        let mut result = FetchResult::new();
        result.append_records(PartitionId::from_upstream("aaa"), vec![record("2024-01-01")]);
        result.append_records(
            PartitionId::from_upstream("aaa"),
            vec![record("2024-01-08"), record("2024-01-09")],
        );
        result.push_failure(WorkItemFailure {
            partition: PartitionId::from_upstream("bbb"),
            chunk: chunk("2024-01-01", "2024-01-08"),
            error: SourceError::timeout("deadline exceeded"),
            attempts: 3,
        });

        assert_eq!(result.total_alerts(), 3);
        assert!(!result.is_complete());
        let failed = result.failed_partitions();
        assert_eq!(failed.len(), 1);
        assert!(failed.contains(&PartitionId::from_upstream("bbb")));
    }
}
