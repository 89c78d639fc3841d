use thiserror::Error;

/// Validation and planning errors exposed by `canopy-core`.
///
/// Every variant here is fatal to the request that produced it and is
/// surfaced before any network call is made.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("invalid date range: end '{end}' must be after start '{start}'")]
    InvalidRange { start: String, end: String },
    #[error("invalid date '{value}', expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("invalid dataset '{value}', expected one of gfw_integrated_alerts, nasa_viirs_fire_alerts")]
    InvalidDataset { value: String },
    #[error("invalid confidence '{value}', expected one of low, nominal, high, highest")]
    InvalidConfidence { value: String },

    #[error("geometry contains no polygons")]
    EmptyGeometry,
    #[error("geometry has no usable area")]
    DegenerateGeometry,
    #[error("polygon ring must have at least 3 distinct vertices, got {len}")]
    RingTooShort { len: usize },
    #[error("coordinate ({x}, {y}) is not a finite lon/lat pair")]
    InvalidCoordinate { x: f64, y: f64 },
    #[error("unsupported or malformed GeoJSON: {reason}")]
    InvalidGeoJson { reason: String },

    #[error("field '{field}' must be greater than zero")]
    ZeroConfigValue { field: &'static str },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Source(#[from] crate::source::SourceError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
