mod alerts;
mod metadata;
mod plan;

use std::sync::Arc;
use std::time::Instant;

use canopy_core::{
    AlertsSource, AoiGeometry, BoundingBox, Confidence, DatasetId, DateRange, FetchConfig,
    GfwDataApi, PartitionScheme, PullRequest, ReqwestHttpClient, ValidationError,
};
use serde_json::Value;
use uuid::Uuid;

use crate::cli::{Cli, Command, QueryArgs};
use crate::envelope::{Envelope, EnvelopeError, EnvelopeMeta};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }
}

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let started = Instant::now();
    let source = build_source(cli);

    let command_result = match &cli.command {
        Command::Alerts(args) => alerts::run(args, source).await?,
        Command::Plan(args) => plan::run(args, source).await?,
        Command::Metadata(args) => metadata::run(args, source).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
    } = command_result;

    let mut meta = EnvelopeMeta::new(
        Uuid::new_v4().to_string(),
        started.elapsed().as_millis() as u64,
    );
    for warning in warnings {
        meta.push_warning(warning);
    }

    Ok(Envelope::new(meta, data, errors))
}

fn build_source(cli: &Cli) -> Arc<dyn AlertsSource> {
    let http = Arc::new(ReqwestHttpClient::new());
    let mut api = GfwDataApi::new(http).with_base_url(&cli.base_url);
    if let Some(api_key) = &cli.api_key {
        api = api.with_api_key(api_key);
    }
    Arc::new(api)
}

pub(crate) fn parse_dataset(raw: &str) -> Result<DatasetId, CliError> {
    Ok(raw.parse::<DatasetId>()?)
}

pub(crate) fn parse_request(args: &QueryArgs) -> Result<PullRequest, CliError> {
    let dataset = parse_dataset(&args.dataset)?;
    let geometry = load_geometry(args)?;
    let range = DateRange::new(
        canopy_core::domain::parse_iso_date(&args.start)?,
        canopy_core::domain::parse_iso_date(&args.end)?,
    )?;

    Ok(PullRequest {
        dataset,
        geometry,
        range,
    })
}

pub(crate) fn build_config(args: &QueryArgs) -> Result<FetchConfig, CliError> {
    let min_confidence: Confidence = args.min_confidence.parse()?;
    let partition_scheme = match args.fixed_interval {
        Some(interval_deg) => PartitionScheme::FixedInterval {
            interval_deg,
            buffer_deg: 0.01,
        },
        None => PartitionScheme::default(),
    };

    let config = FetchConfig {
        max_partitions: args.max_partitions,
        max_days_per_query: args.max_days,
        smart_date_ranges: !args.no_smart_ranges,
        min_confidence,
        partition_scheme,
        ..FetchConfig::default()
    };
    config.validate()?;
    Ok(config)
}

fn load_geometry(args: &QueryArgs) -> Result<AoiGeometry, CliError> {
    if let Some(path) = &args.aoi {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        return Ok(AoiGeometry::from_geojson(&value)?);
    }

    if let Some(bbox) = &args.bbox {
        return Ok(AoiGeometry::rect(parse_bbox(bbox)?));
    }

    Err(CliError::Command(String::from(
        "an area of interest is required: pass --aoi <geojson file> or --bbox",
    )))
}

fn parse_bbox(raw: &str) -> Result<BoundingBox, CliError> {
    let invalid = || {
        CliError::Validation(ValidationError::InvalidGeoJson {
            reason: format!("bbox must be \"min_lon,min_lat,max_lon,max_lat\", got {raw:?}"),
        })
    };

    let parts: Vec<f64> = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid())?;
    if parts.len() != 4 {
        return Err(invalid());
    }

    let bbox = BoundingBox {
        min_x: parts[0],
        min_y: parts[1],
        max_x: parts[2],
        max_y: parts[3],
    };
    if !(bbox.min_x < bbox.max_x && bbox.min_y < bbox.max_y) {
        return Err(invalid());
    }
    Ok(bbox)
}
