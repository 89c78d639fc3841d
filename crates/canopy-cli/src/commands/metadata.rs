use std::sync::Arc;

use canopy_core::{AlertsFetcher, AlertsSource, FetchConfig, NoopRecorder, PerfRecorder};
use serde::Serialize;

use crate::cli::MetadataArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct MetadataResponseData {
    descriptor: canopy_core::DatasetDescriptor,
    preferred_chunk_days: u32,
}

pub async fn run(
    args: &MetadataArgs,
    source: Arc<dyn AlertsSource>,
) -> Result<CommandResult, CliError> {
    let dataset = super::parse_dataset(&args.dataset)?;

    let fetcher = AlertsFetcher::new(
        source,
        FetchConfig::default(),
        Arc::new(NoopRecorder) as Arc<dyn PerfRecorder>,
    );
    let descriptor = fetcher.metadata(dataset).await?;

    let data = MetadataResponseData {
        preferred_chunk_days: descriptor.cadence.preferred_chunk_days(),
        descriptor,
    };

    Ok(CommandResult::ok(serde_json::to_value(data)?))
}
