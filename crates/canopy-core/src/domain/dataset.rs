use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::date::UtcDateTime;
use crate::ValidationError;

/// Canonical identifiers for the alert datasets canopy knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetId {
    GfwIntegratedAlerts,
    NasaViirsFireAlerts,
}

impl DatasetId {
    pub const ALL: [Self; 2] = [Self::GfwIntegratedAlerts, Self::NasaViirsFireAlerts];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GfwIntegratedAlerts => "gfw_integrated_alerts",
            Self::NasaViirsFireAlerts => "nasa_viirs_fire_alerts",
        }
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gfw_integrated_alerts" => Ok(Self::GfwIntegratedAlerts),
            "nasa_viirs_fire_alerts" => Ok(Self::NasaViirsFireAlerts),
            other => Err(ValidationError::InvalidDataset {
                value: other.to_owned(),
            }),
        }
    }
}

/// Ordered categorical alert confidence, used as a minimum filter.
///
/// The ordering is shared across datasets; adapters map these levels onto
/// each dataset's wire labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Nominal,
    High,
    Highest,
}

impl Confidence {
    pub const ALL: [Self; 4] = [Self::Low, Self::Nominal, Self::High, Self::Highest];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Nominal => "nominal",
            Self::High => "high",
            Self::Highest => "highest",
        }
    }
}

impl Display for Confidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Self::Low),
            "nominal" | "n" => Ok(Self::Nominal),
            "high" | "h" => Ok(Self::High),
            "highest" => Ok(Self::Highest),
            other => Err(ValidationError::InvalidConfidence {
                value: other.to_owned(),
            }),
        }
    }
}

/// How often a dataset publishes new data, parsed from the free-form
/// frequency hint in dataset metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateCadence {
    Daily,
    Weekly,
    Monthly,
    Unknown,
}

impl UpdateCadence {
    pub fn from_hint(hint: &str) -> Self {
        let lowered = hint.to_ascii_lowercase();
        if lowered.contains("daily") {
            Self::Daily
        } else if lowered.contains("weekly") {
            Self::Weekly
        } else if lowered.contains("monthly") {
            Self::Monthly
        } else {
            Self::Unknown
        }
    }

    /// Preferred query window, in days, for a dataset with this cadence.
    /// Coarser cadences tolerate wider windows because finer slicing only
    /// returns duplicate rows.
    pub const fn preferred_chunk_days(self) -> u32 {
        match self {
            Self::Daily | Self::Unknown => 7,
            Self::Weekly => 14,
            Self::Monthly => 30,
        }
    }
}

/// Immutable dataset descriptor returned by the alerts source's metadata
/// endpoint and owned by the metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub dataset: DatasetId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<UtcDateTime>,
    pub cadence: UpdateCadence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl DatasetDescriptor {
    pub fn new(dataset: DatasetId, cadence: UpdateCadence) -> Self {
        Self {
            dataset,
            version: None,
            updated_on: None,
            cadence,
            fields: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_updated_on(mut self, updated_on: UtcDateTime) -> Self {
        self.updated_on = Some(updated_on);
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }
}
