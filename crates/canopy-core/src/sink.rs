//! Output sinks for fetched alerts.

use std::io::Write;

use serde::Serialize;

use crate::domain::{AlertRecord, FetchResult, PartitionId};
use crate::CoreError;

/// Destination for normalized alerts. Records arrive partition by
/// partition, in the chronological order the coordinator produced.
pub trait AlertSink {
    fn write_record(
        &mut self,
        partition: &PartitionId,
        record: &AlertRecord,
    ) -> Result<(), CoreError>;

    fn finish(&mut self) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Drains a fetch result into a sink. Returns the number of records
/// written.
pub fn drain_into(result: &FetchResult, sink: &mut dyn AlertSink) -> Result<usize, CoreError> {
    let mut written = 0usize;
    for (partition, records) in result.records() {
        for record in records {
            sink.write_record(partition, record)?;
            written += 1;
        }
    }
    sink.finish()?;
    Ok(written)
}

#[derive(Serialize)]
struct NdjsonRow<'a> {
    partition: &'a PartitionId,
    #[serde(flatten)]
    record: &'a AlertRecord,
}

/// Writes one JSON object per alert, newline-delimited, with the owning
/// partition id inlined into each row.
pub struct NdjsonSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> AlertSink for NdjsonSink<W> {
    fn write_record(
        &mut self,
        partition: &PartitionId,
        record: &AlertRecord,
    ) -> Result<(), CoreError> {
        let row = NdjsonRow { partition, record };
        serde_json::to_writer(&mut self.writer, &row)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects records in memory; used by tests and the CLI JSON envelope.
#[derive(Debug, Default)]
pub struct VecSink {
    rows: Vec<(PartitionId, AlertRecord)>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[(PartitionId, AlertRecord)] {
        &self.rows
    }
}

impl AlertSink for VecSink {
    fn write_record(
        &mut self,
        partition: &PartitionId,
        record: &AlertRecord,
    ) -> Result<(), CoreError> {
        self.rows.push((partition.clone(), *record));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{parse_iso_date, Confidence};

    fn record(day: &str) -> AlertRecord {
        AlertRecord {
            latitude: -4.25,
            longitude: 32.5,
            recorded_at: parse_iso_date(day).expect("valid date"),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn ndjson_rows_carry_partition_and_iso_date() {
        let mut sink = NdjsonSink::new(Vec::new());
        sink.write_record(&PartitionId::from_upstream("abc"), &record("2024-01-03"))
            .expect("write");
        sink.finish().expect("flush");

        let output = String::from_utf8(sink.into_inner()).expect("utf8");
        let row: serde_json::Value = serde_json::from_str(output.trim()).expect("one json row");
        assert_eq!(row["partition"], "abc");
        assert_eq!(row["recorded_at"], "2024-01-03");
        assert_eq!(row["confidence"], "high");
    }

    #[test]
    fn drain_preserves_per_partition_order() {
        let mut result = FetchResult::new();
        result.append_records(
            PartitionId::from_upstream("aaa"),
            vec![record("2024-01-01"), record("2024-01-05")],
        );
        result.append_records(PartitionId::from_upstream("bbb"), vec![record("2024-01-02")]);

        let mut sink = VecSink::new();
        let written = drain_into(&result, &mut sink).expect("drain");

        assert_eq!(written, 3);
        let days: Vec<String> = sink
            .rows()
            .iter()
            .map(|(_, record)| crate::domain::format_iso_date(record.recorded_at))
            .collect();
        assert_eq!(days, vec!["2024-01-01", "2024-01-05", "2024-01-02"]);
    }
}
