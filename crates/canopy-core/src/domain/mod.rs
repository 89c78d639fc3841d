pub mod alert;
pub mod dataset;
pub mod date;
pub mod geometry;

pub use alert::{
    AlertRecord, FetchResult, Partition, PartitionId, RegisteredPartition, WorkItem,
    WorkItemFailure,
};
pub use dataset::{Confidence, DatasetDescriptor, DatasetId, UpdateCadence};
pub use date::{format_iso_date, parse_iso_date, DateChunk, DateRange, UtcDateTime};
pub use geometry::{AoiGeometry, BoundingBox, Coord, PolygonGeom};
