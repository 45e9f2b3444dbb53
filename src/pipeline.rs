use std::path::{Path, PathBuf};

use anyhow::Context;
use polars::prelude::DataFrame;

use crate::config::MonitorConfig;
use crate::data::{fetch_observations, Observations};
use crate::model::{train_test_split, BikeModel, ForestParams, PREDICTION_COLUMN, TARGET_COLUMN};
use crate::report::{ColumnMapping, Preset, Report};
use crate::workspace::{add_report_to_workspace, Project, Workspace};

/// Files and project produced for one report.
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub report: String,
    pub project: Project,
    pub html: PathBuf,
    pub json: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub artifacts: Vec<ReportArtifacts>,
}

struct ReportJob<'a> {
    name: String,
    project: String,
    description: String,
    preset: Preset,
    reference: Option<&'a DataFrame>,
    current: &'a DataFrame,
    mapping: &'a ColumnMapping,
}

/// Fetch the dataset and run every report.
pub fn run(config: &MonitorConfig) -> anyhow::Result<RunSummary> {
    let observations =
        fetch_observations(config).context("failed to load the bike-sharing dataset")?;
    run_with_observations(config, &observations)
}

/// Run every report over an already loaded table.
pub fn run_with_observations(
    config: &MonitorConfig,
    raw: &Observations,
) -> anyhow::Result<RunSummary> {
    let windows = config.resolve_windows()?;
    let workspace = Workspace::open(&config.workspace_dir)
        .with_context(|| format!("failed to open workspace {}", config.workspace_dir))?;

    let features = config.feature_columns();
    let target = config.features.target.as_str();
    let params = ForestParams {
        n_estimators: config.model.n_estimators,
        seed: config.model.seed,
    };
    let mapping = ColumnMapping {
        target: Some(TARGET_COLUMN.to_string()),
        prediction: Some(PREDICTION_COLUMN.to_string()),
        numerical_features: config.features.numerical.clone(),
        categorical_features: config.features.categorical.clone(),
    };

    let mut summary = RunSummary::default();

    // 1. Slice the reference month and the evaluation month
    let reference = raw.slice(&windows.reference)?;
    let evaluation = raw.slice(&windows.evaluation)?;
    tracing::info!(
        reference_rows = reference.len(),
        evaluation_rows = evaluation.len(),
        "sliced observation windows"
    );

    // 2. Validate on a train/test split of the reference month
    let (train, test) =
        train_test_split(&reference, config.model.test_size, config.model.split_seed)?;
    let model = BikeModel::fit(train.frame(), &features, target, params)
        .context("failed to fit the validation model")?;
    let train = model.score(train, target)?;
    let test = model.score(test, target)?;

    summary.artifacts.push(publish(
        config,
        &workspace,
        ReportJob {
            name: "validation".to_string(),
            project: config.project_name("validation"),
            description: "Train/test validation on the reference month".to_string(),
            preset: Preset::Regression,
            reference: Some(train.frame()),
            current: test.frame(),
            mapping: &mapping,
        },
    )?);

    // 3. Refit on the whole reference month for production scoring
    let model = BikeModel::fit(reference.frame(), &features, target, params)
        .context("failed to fit the production model")?;
    let reference = model.score(reference, target)?;

    summary.artifacts.push(publish(
        config,
        &workspace,
        ReportJob {
            name: "production_jan".to_string(),
            project: config.project_name("production"),
            description: "Model performance on the full reference month".to_string(),
            preset: Preset::Regression,
            reference: None,
            current: reference.frame(),
            mapping: &mapping,
        },
    )?);

    // 4. Weekly regression reports against the reference month
    for week in &windows.weeks {
        let current = model.score(evaluation.slice(&week.window)?, target)?;
        if let Some((first, last)) = current.time_range() {
            tracing::info!(week = %week.name, rows = current.len(), %first, %last, "scored week");
        }

        summary.artifacts.push(publish(
            config,
            &workspace,
            ReportJob {
                name: week.name.clone(),
                project: config.project_name(&week.name),
                description: format!("Analysis of {}", week.name),
                preset: Preset::Regression,
                reference: Some(reference.frame()),
                current: current.frame(),
                mapping: &mapping,
            },
        )?);
    }

    // 5. Target drift on the drift week
    let drift_week = &windows.drift_week;
    let drift_data = model.score(evaluation.slice(&drift_week.window)?, target)?;

    summary.artifacts.push(publish(
        config,
        &workspace,
        ReportJob {
            name: format!("target_drift_{}", drift_week.name),
            project: config.project_name(&format!("target_{}", drift_week.name)),
            description: format!("Target drift, {}", drift_week.name),
            preset: Preset::TargetDrift,
            reference: Some(reference.frame()),
            current: drift_data.frame(),
            mapping: &mapping,
        },
    )?);

    // 6. Data drift of the numerical features on the drift week
    let numerical_mapping = ColumnMapping {
        target: Some(target.to_string()),
        prediction: Some(PREDICTION_COLUMN.to_string()),
        numerical_features: config.features.numerical.clone(),
        categorical_features: Vec::new(),
    };

    summary.artifacts.push(publish(
        config,
        &workspace,
        ReportJob {
            name: format!("data_drift_{}", drift_week.name),
            project: config.project_name(&format!("data_{}", drift_week.name)),
            description: format!("Numerical feature drift, {}", drift_week.name),
            preset: Preset::DataDrift,
            reference: Some(reference.frame()),
            current: drift_data.frame(),
            mapping: &numerical_mapping,
        },
    )?);

    tracing::info!(reports = summary.artifacts.len(), "monitoring run finished");
    Ok(summary)
}

fn publish(
    config: &MonitorConfig,
    workspace: &Workspace,
    job: ReportJob<'_>,
) -> anyhow::Result<ReportArtifacts> {
    let report = Report::run(&job.name, job.preset, job.reference, job.current, job.mapping)
        .with_context(|| format!("failed to compute report '{}'", job.name))?;

    let html = Path::new(&config.html_dir).join(format!("report_{}.html", job.name));
    let json = workspace.path().join(format!("report_{}.json", job.name));
    report
        .save_html(&html)
        .with_context(|| format!("failed to write {}", html.display()))?;
    report
        .save_json(&json)
        .with_context(|| format!("failed to write {}", json.display()))?;

    let project = add_report_to_workspace(workspace, &job.project, &job.description, &report)?;

    Ok(ReportArtifacts {
        report: job.name,
        project,
        html,
        json,
    })
}
