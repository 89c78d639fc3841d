use std::sync::Arc;

use canopy_core::{AlertsFetcher, AlertsSource, NoopRecorder, PerfRecorder};
use serde::Serialize;

use crate::cli::PlanArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct PlanResponseData {
    dataset: String,
    plan: canopy_core::PlanSummary,
}

pub async fn run(args: &PlanArgs, source: Arc<dyn AlertsSource>) -> Result<CommandResult, CliError> {
    let request = super::parse_request(&args.query)?;
    let config = super::build_config(&args.query)?;

    let fetcher = AlertsFetcher::new(source, config, Arc::new(NoopRecorder) as Arc<dyn PerfRecorder>);

    let dataset = request.dataset;
    let plan = fetcher.plan(&request).await?;
    let warnings = plan.warnings.clone();

    let data = PlanResponseData {
        dataset: dataset.to_string(),
        plan,
    };

    Ok(CommandResult::ok(serde_json::to_value(data)?).with_warnings(warnings))
}
