//! Global Forest Watch data API adapter.
//!
//! Implements [`AlertsSource`] over the GFW data API: dataset metadata from
//! the `latest` endpoint, partition registration through the geostore
//! endpoint, and alert queries as SQL against the dataset's `query/json`
//! endpoint. The query endpoint only accepts geostore ids in compact form;
//! normalization happens in `PartitionId::from_upstream`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{
    parse_iso_date, AlertRecord, AoiGeometry, Confidence, DatasetDescriptor, DatasetId,
    PartitionId, UpdateCadence, UtcDateTime,
};
use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::source::{AlertsQuery, AlertsSource, SourceError, SourceFuture};
use crate::throttle::QueryThrottle;

pub const DEFAULT_BASE_URL: &str = "https://data-api.globalforestwatch.org";

/// Default local query budget: generous enough for one pull, far under the
/// upstream allowance.
const DEFAULT_QUOTA_WINDOW: Duration = Duration::from_secs(60);
const DEFAULT_QUOTA_LIMIT: u32 = 120;

pub struct GfwDataApi {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: Option<String>,
    throttle: QueryThrottle,
}

impl GfwDataApi {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            throttle: QueryThrottle::new(DEFAULT_QUOTA_WINDOW, DEFAULT_QUOTA_LIMIT),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_throttle(mut self, throttle: QueryThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    fn authorized(&self, request: HttpRequest) -> HttpRequest {
        match &self.api_key {
            Some(key) => request.with_header("x-api-key", key.clone()),
            None => request,
        }
    }

    async fn execute(&self, request: HttpRequest, context: &str) -> Result<HttpResponse, SourceError> {
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|error| map_transport_error(error, context))?;

        if response.is_success() {
            return Ok(response);
        }
        Err(map_status(response.status, &response.body, context))
    }
}

impl AlertsSource for GfwDataApi {
    fn fetch_metadata<'a>(&'a self, dataset: DatasetId) -> SourceFuture<'a, DatasetDescriptor> {
        Box::pin(async move {
            let url = format!("{}/dataset/{}/latest", self.base_url, dataset.as_str());
            let request = self.authorized(HttpRequest::get(url));
            let response = self.execute(request, "dataset metadata").await?;

            let envelope: MetadataEnvelope = serde_json::from_str(&response.body)
                .map_err(|error| SourceError::decode(format!("metadata response: {error}")))?;

            let body = envelope.data.metadata.unwrap_or_default();
            let cadence = body
                .update_frequency
                .as_deref()
                .map(UpdateCadence::from_hint)
                .unwrap_or(UpdateCadence::Unknown);

            let mut descriptor = DatasetDescriptor::new(dataset, cadence);
            if let Some(version) = envelope.data.version {
                descriptor = descriptor.with_version(version);
            }
            if let Some(raw) = body.updated_on {
                if let Ok(updated_on) = UtcDateTime::parse(&raw) {
                    descriptor = descriptor.with_updated_on(updated_on);
                }
            }
            Ok(descriptor)
        })
    }

    fn register_partition<'a>(
        &'a self,
        geometry: &'a AoiGeometry,
    ) -> SourceFuture<'a, PartitionId> {
        Box::pin(async move {
            let url = format!("{}/geostore/", self.base_url);
            let request = self
                .authorized(HttpRequest::post(url))
                .with_json_body(serde_json::json!({ "geometry": geometry.to_geojson() }));
            let response = self.execute(request, "geostore registration").await?;

            let envelope: GeostoreEnvelope = serde_json::from_str(&response.body)
                .map_err(|error| SourceError::decode(format!("geostore response: {error}")))?;

            if envelope.status != "success" {
                return Err(SourceError::upstream(format!(
                    "geostore registration returned status {}",
                    envelope.status
                )));
            }
            Ok(PartitionId::from_upstream(&envelope.data.gfw_geostore_id))
        })
    }

    fn fetch_alerts<'a>(&'a self, query: AlertsQuery) -> SourceFuture<'a, Vec<AlertRecord>> {
        Box::pin(async move {
            self.throttle.acquire()?;

            let sql = build_sql(query.dataset, &query);
            let url = format!(
                "{}/dataset/{}/latest/query/json",
                self.base_url,
                query.dataset.as_str()
            );
            let request = self
                .authorized(HttpRequest::get(url))
                .with_query("sql", sql)
                .with_query("geostore_id", query.partition.as_str());
            let response = self.execute(request, "alerts query").await?;

            parse_alert_rows(query.dataset, &response.body)
        })
    }
}

/// Wire field names differ per dataset; the rest of the pipeline only sees
/// normalized records.
struct WireFields {
    date_field: &'static str,
    confidence_field: &'static str,
}

const fn wire_fields(dataset: DatasetId) -> WireFields {
    match dataset {
        DatasetId::GfwIntegratedAlerts => WireFields {
            date_field: "gfw_integrated_alerts__date",
            confidence_field: "gfw_integrated_alerts__confidence",
        },
        DatasetId::NasaViirsFireAlerts => WireFields {
            date_field: "alert__date",
            confidence_field: "confidence__cat",
        },
    }
}

/// Wire labels at or above the minimum, dataset-specific. VIIRS uses single
/// letters and has no distinct highest level.
fn confidence_labels(dataset: DatasetId, min_confidence: Confidence) -> Vec<&'static str> {
    let levels = Confidence::ALL.iter().copied().filter(|level| *level >= min_confidence);
    match dataset {
        DatasetId::GfwIntegratedAlerts => levels.map(Confidence::as_str).collect(),
        DatasetId::NasaViirsFireAlerts => {
            let mut labels: Vec<&'static str> = levels
                .map(|level| match level {
                    Confidence::Low => "l",
                    Confidence::Nominal => "n",
                    Confidence::High | Confidence::Highest => "h",
                })
                .collect();
            labels.dedup();
            labels
        }
    }
}

fn build_sql(dataset: DatasetId, query: &AlertsQuery) -> String {
    let fields = wire_fields(dataset);
    let labels = confidence_labels(dataset, query.min_confidence);
    let confidence_clause = labels
        .iter()
        .map(|label| format!("{} = '{}'", fields.confidence_field, label))
        .collect::<Vec<_>>()
        .join(" OR ");

    // Upper bound is the chunk's inclusive last day; chunks themselves are
    // half-open, so adjacent chunks never double-count a day.
    format!(
        "SELECT latitude,longitude,{date},{confidence} FROM results \
         WHERE ({date} >= '{start}' AND {date} <= '{end}') AND ({clause})",
        date = fields.date_field,
        confidence = fields.confidence_field,
        start = crate::domain::format_iso_date(query.chunk.start),
        end = crate::domain::format_iso_date(query.chunk.last_day()),
        clause = confidence_clause,
    )
}

fn parse_alert_rows(dataset: DatasetId, body: &str) -> Result<Vec<AlertRecord>, SourceError> {
    let fields = wire_fields(dataset);
    let envelope: serde_json::Value = serde_json::from_str(body)
        .map_err(|error| SourceError::decode(format!("alerts response: {error}")))?;
    let rows = envelope
        .get("data")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| SourceError::decode("alerts response missing data array"))?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let latitude = field_f64(row, "latitude")?;
        let longitude = field_f64(row, "longitude")?;
        let raw_date = field_str(row, fields.date_field)?;
        let recorded_at = parse_iso_date(raw_date)
            .map_err(|_| SourceError::decode(format!("unparseable alert date {raw_date:?}")))?;
        let raw_confidence = field_str(row, fields.confidence_field)?;
        let confidence: Confidence = raw_confidence.parse().map_err(|_| {
            SourceError::decode(format!("unknown confidence label {raw_confidence:?}"))
        })?;

        records.push(AlertRecord {
            latitude,
            longitude,
            recorded_at,
            confidence,
        });
    }
    Ok(records)
}

fn field_f64(row: &serde_json::Value, name: &str) -> Result<f64, SourceError> {
    row.get(name)
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| SourceError::decode(format!("alert row missing numeric field {name:?}")))
}

fn field_str<'a>(row: &'a serde_json::Value, name: &str) -> Result<&'a str, SourceError> {
    row.get(name)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SourceError::decode(format!("alert row missing field {name:?}")))
}

fn map_transport_error(error: HttpError, context: &str) -> SourceError {
    if error.is_timeout() {
        SourceError::timeout(format!("{context}: {error}"))
    } else {
        SourceError::upstream(format!("{context}: {error}"))
    }
}

fn map_status(status: u16, body: &str, context: &str) -> SourceError {
    let summary: String = body.chars().take(200).collect();
    let message = format!("{context} failed with status {status}: {summary}");
    match status {
        401 | 403 => SourceError::unauthorized(message),
        400 | 422 => SourceError::malformed_request(message),
        408 => SourceError::timeout(message),
        429 => SourceError::rate_limited(message),
        _ => SourceError::upstream(message),
    }
}

#[derive(Debug, Deserialize)]
struct MetadataEnvelope {
    data: MetadataData,
}

#[derive(Debug, Deserialize)]
struct MetadataData {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    metadata: Option<MetadataBody>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataBody {
    #[serde(default)]
    update_frequency: Option<String>,
    #[serde(default)]
    updated_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeostoreEnvelope {
    status: String,
    data: GeostoreData,
}

#[derive(Debug, Deserialize)]
struct GeostoreData {
    gfw_geostore_id: String,
}
