use anyhow::Result;
use bike_drift_monitor::{pipeline, MonitorConfig};
use tracing_subscriber::EnvFilter;

// Monitoring run
// 1. Download the bike-sharing archive and index the hourly table
// 2. Slice the reference month and the evaluation weeks
// 3. Validate a random forest on a train/test split, refit on the full month
// 4. Write regression, target drift and data drift reports (HTML + JSON)
// 5. Register every report with its project in the workspace

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("bike_drift_monitor=info".parse()?),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::load(&path)?,
        None => MonitorConfig::default(),
    };
    tracing::info!(
        url = %config.data_url,
        workspace = %config.workspace_dir,
        "starting monitoring run"
    );

    let summary = pipeline::run(&config)?;
    for artifact in &summary.artifacts {
        tracing::info!(
            report = %artifact.report,
            project = %artifact.project.name,
            html = %artifact.html.display(),
            json = %artifact.json.display(),
            "report written"
        );
    }

    Ok(())
}
