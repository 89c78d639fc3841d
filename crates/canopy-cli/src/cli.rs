//! CLI argument definitions for canopy.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `alerts` | Pull alerts for an AOI over a date range |
//! | `plan` | Preview the chunk/partition plan without fetching |
//! | `metadata` | Show dataset metadata |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, ndjson) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--base-url` | GFW data API | Alerts API base URL |
//! | `--api-key` | `$CANOPY_API_KEY` | API key for the alerts API |
//!
//! # Examples
//!
//! ```bash
//! # Pull a week of integrated alerts for a bounding box
//! canopy alerts gfw_integrated_alerts --bbox "31.0,-5.0,33.0,-3.0" \
//!     --start 2024-01-01 --end 2024-01-08
//!
//! # Preview the query plan for a GeoJSON AOI
//! canopy plan nasa_viirs_fire_alerts --aoi reserve.geojson \
//!     --start 2024-01-01 --end 2024-02-01 --pretty
//!
//! # Use strict mode for CI/CD
//! canopy metadata gfw_integrated_alerts --strict
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Geospatial alerts retrieval CLI for the Global Forest Watch data API.
///
/// Pulls fire and deforestation alerts for an area of interest with
/// adaptive date chunking, geometry partitioning and bounded concurrency.
#[derive(Debug, Parser)]
#[command(
    name = "canopy",
    author,
    version,
    about = "Geospatial alerts retrieval CLI"
)]
pub struct Cli {
    /// Output format for results.
    ///
    /// - json: Single JSON object (default)
    /// - ndjson: One JSON object per line
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    ///
    /// Useful for CI/CD pipelines that need strict validation.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Alerts API base URL.
    #[arg(long, global = true, default_value = canopy_core::DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API key for the alerts API.
    #[arg(long, global = true, env = "CANOPY_API_KEY")]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Newline-delimited JSON (one object per line).
    Ndjson,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Pull alerts for an area of interest over a date range.
    ///
    /// Splits the range into cadence-aware chunks, partitions the AOI,
    /// registers each partition upstream and fetches every
    /// partition/chunk pair concurrently.
    ///
    /// # Examples
    ///
    ///   canopy alerts gfw_integrated_alerts --bbox "31,-5,33,-3" --start 2024-01-01 --end 2024-01-08
    ///   canopy alerts nasa_viirs_fire_alerts --aoi park.geojson --start 2024-01-01 --end 2024-01-15 --min-confidence nominal
    Alerts(AlertsArgs),

    /// Preview the chunk and partition plan without fetching alerts.
    ///
    /// # Examples
    ///
    ///   canopy plan gfw_integrated_alerts --bbox "31,-5,33,-3" --start 2024-01-01 --end 2024-02-01
    Plan(PlanArgs),

    /// Show dataset metadata (version, update cadence).
    ///
    /// # Examples
    ///
    ///   canopy metadata nasa_viirs_fire_alerts
    Metadata(MetadataArgs),
}

/// AOI and date-range selection shared by `alerts` and `plan`.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Dataset to query (gfw_integrated_alerts, nasa_viirs_fire_alerts).
    pub dataset: String,

    /// Path to a GeoJSON file describing the area of interest.
    ///
    /// Polygon, MultiPolygon, Feature, FeatureCollection and
    /// GeometryCollection are accepted.
    #[arg(long, conflicts_with = "bbox")]
    pub aoi: Option<String>,

    /// Bounding-box AOI as "min_lon,min_lat,max_lon,max_lat".
    #[arg(long)]
    pub bbox: Option<String>,

    /// Start date (inclusive), YYYY-MM-DD.
    #[arg(long)]
    pub start: String,

    /// End date (exclusive), YYYY-MM-DD.
    #[arg(long)]
    pub end: String,

    /// Minimum alert confidence to include.
    #[arg(long, default_value = "high")]
    pub min_confidence: String,

    /// Maximum days covered by a single query.
    #[arg(long, default_value_t = 7)]
    pub max_days: u32,

    /// Maximum number of AOI partitions.
    #[arg(long, default_value_t = 10)]
    pub max_partitions: usize,

    /// Disable cadence-aware chunk sizing and use fixed chunks.
    #[arg(long, default_value_t = false)]
    pub no_smart_ranges: bool,

    /// Use the legacy fixed-interval partition grid at this cell size, in
    /// degrees, instead of adaptive sizing.
    #[arg(long)]
    pub fixed_interval: Option<f64>,
}

/// Arguments for the `alerts` command.
#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Concurrent queries in flight.
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    /// Overall batch deadline in milliseconds. Unset waits for every item.
    #[arg(long)]
    pub batch_timeout_ms: Option<u64>,

    /// Write alerts as NDJSON to this file instead of inlining them in the
    /// JSON envelope.
    #[arg(long)]
    pub output: Option<String>,
}

/// Arguments for the `plan` command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub query: QueryArgs,
}

/// Arguments for the `metadata` command.
#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// Dataset to describe.
    pub dataset: String,
}
