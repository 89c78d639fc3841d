//! Date range planner.
//!
//! Splits a requested window into query-sized chunks. Smart mode consults
//! the dataset's update cadence: a weekly-updated dataset tolerates wider
//! windows because finer slicing only returns duplicate rows.

use time::Duration as TimeDuration;

use crate::domain::{DatasetDescriptor, DateChunk, DateRange};
use crate::ValidationError;

#[derive(Debug, Clone, Copy)]
pub struct DateRangePlanner {
    smart: bool,
}

impl DateRangePlanner {
    pub fn new(smart: bool) -> Self {
        Self { smart }
    }

    /// Plans the ordered chunk sequence for a request.
    ///
    /// The returned chunks are contiguous, non-overlapping, and their union
    /// equals the requested range exactly. A window narrower than one chunk
    /// yields a single chunk equal to the full window.
    pub fn plan(
        &self,
        descriptor: Option<&DatasetDescriptor>,
        range: DateRange,
        max_days_per_query: u32,
    ) -> Result<Vec<DateChunk>, ValidationError> {
        if max_days_per_query == 0 {
            return Err(ValidationError::ZeroConfigValue {
                field: "max_days_per_query",
            });
        }

        let chunk_days = match (self.smart, descriptor) {
            (true, Some(descriptor)) => {
                max_days_per_query.min(descriptor.cadence.preferred_chunk_days())
            }
            _ => max_days_per_query,
        };

        Ok(chunk_range(range, chunk_days))
    }
}

/// Fixed-size chunking, also used as the fallback when metadata is
/// unavailable.
pub fn chunk_range(range: DateRange, chunk_days: u32) -> Vec<DateChunk> {
    let step = TimeDuration::days(i64::from(chunk_days.max(1)));
    let mut chunks = Vec::new();
    let mut cursor = range.start;

    while cursor < range.end {
        let end = (cursor + step).min(range.end);
        chunks.push(DateChunk { start: cursor, end });
        cursor = end;
    }

    chunks
}
