use std::sync::Arc;
use std::time::Duration;

use canopy_core::{
    drain_into, AlertsFetcher, AlertsSource, FetchResult, MemoryRecorder, NdjsonSink, PerfRecorder,
};
use serde::Serialize;
use serde_json::Value;

use crate::cli::AlertsArgs;
use crate::envelope::EnvelopeError;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct AlertsResponseData {
    dataset: String,
    total_alerts: usize,
    complete: bool,
    result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<OutputSummary>,
    perf: Value,
}

#[derive(Debug, Serialize)]
struct OutputSummary {
    path: String,
    records_written: usize,
}

pub async fn run(args: &AlertsArgs, source: Arc<dyn AlertsSource>) -> Result<CommandResult, CliError> {
    let request = super::parse_request(&args.query)?;
    let mut config = super::build_config(&args.query)?;
    config.max_concurrent = args.concurrency;
    config.batch_timeout = args.batch_timeout_ms.map(Duration::from_millis);
    config.validate()?;

    let recorder = Arc::new(MemoryRecorder::new());
    let fetcher = AlertsFetcher::new(source, config, recorder.clone() as Arc<dyn PerfRecorder>);

    let dataset = request.dataset;
    let result = fetcher.pull(request).await?;

    let errors: Vec<EnvelopeError> = result
        .failures()
        .iter()
        .map(|failure| EnvelopeError::from_source(&failure.error))
        .collect();
    let warnings = result.warnings().to_vec();

    let output = match &args.output {
        Some(path) => Some(write_output(path, &result)?),
        None => None,
    };

    let data = AlertsResponseData {
        dataset: dataset.to_string(),
        total_alerts: result.total_alerts(),
        complete: result.is_complete(),
        result: serde_json::to_value(&result)?,
        output,
        perf: serde_json::to_value(recorder.reports())?,
    };

    Ok(CommandResult::ok(serde_json::to_value(data)?)
        .with_warnings(warnings)
        .with_errors(errors))
}

fn write_output(path: &str, result: &FetchResult) -> Result<OutputSummary, CliError> {
    let file = std::fs::File::create(path)?;
    let mut sink = NdjsonSink::new(std::io::BufWriter::new(file));
    let records_written = drain_into(result, &mut sink)?;
    Ok(OutputSummary {
        path: path.to_owned(),
        records_written,
    })
}
