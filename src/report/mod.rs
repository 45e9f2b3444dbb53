//! Monitoring reports computed from a reference and a current table.
//!
//! A [`Report`] is built once by [`Report::run`] and never changes
//! afterwards; it can be written out as HTML and as JSON.

pub mod drift;
pub mod html;
pub mod regression;
pub mod stattest;

use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::column_f64;
use crate::error::ReportError;
use drift::{
    column_drift, dataset_drift, pearson, ColumnDrift, DataDriftTable, DatasetDrift,
    FeatureCorrelation, TargetCorrelations,
};
use regression::{
    error_distribution, regression_quality, top_error, ErrorDistribution, RegressionQuality,
    Scored, TopError,
};
use stattest::ColumnKind;

/// Bundle of metrics computed by a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Regression,
    TargetDrift,
    DataDrift,
}

impl Preset {
    pub fn label(&self) -> &'static str {
        match self {
            Preset::Regression => "Regression performance",
            Preset::TargetDrift => "Target drift",
            Preset::DataDrift => "Data drift",
        }
    }
}

/// Roles of the columns a report looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub target: Option<String>,
    pub prediction: Option<String>,
    pub numerical_features: Vec<String>,
    pub categorical_features: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", content = "result")]
pub enum MetricResult {
    RegressionQuality(RegressionQuality),
    RegressionErrorDistribution(ErrorDistribution),
    RegressionTopError(TopError),
    ColumnDrift(ColumnDrift),
    TargetCorrelations(TargetCorrelations),
    DataDriftTable(DataDriftTable),
    DatasetDrift(DatasetDrift),
}

impl MetricResult {
    pub fn name(&self) -> &'static str {
        match self {
            MetricResult::RegressionQuality(_) => "RegressionQuality",
            MetricResult::RegressionErrorDistribution(_) => "RegressionErrorDistribution",
            MetricResult::RegressionTopError(_) => "RegressionTopError",
            MetricResult::ColumnDrift(_) => "ColumnDrift",
            MetricResult::TargetCorrelations(_) => "TargetCorrelations",
            MetricResult::DataDriftTable(_) => "DataDriftTable",
            MetricResult::DatasetDrift(_) => "DatasetDrift",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    id: Uuid,
    name: String,
    preset: Preset,
    created_at: DateTime<Utc>,
    reference_rows: Option<usize>,
    current_rows: usize,
    column_mapping: ColumnMapping,
    metrics: Vec<MetricResult>,
}

impl Report {
    /// Compute `preset` over `current`, compared against `reference` when given.
    pub fn run(
        name: &str,
        preset: Preset,
        reference: Option<&DataFrame>,
        current: &DataFrame,
        mapping: &ColumnMapping,
    ) -> Result<Self, ReportError> {
        if current.height() == 0 {
            return Err(ReportError::EmptyData("current"));
        }
        if reference.is_some_and(|r| r.height() == 0) {
            return Err(ReportError::EmptyData("reference"));
        }

        let metrics = match preset {
            Preset::Regression => regression_metrics(reference, current, mapping)?,
            Preset::TargetDrift => {
                let reference = reference.ok_or(ReportError::MissingReference {
                    preset: "target drift",
                })?;
                target_drift_metrics(reference, current, mapping)?
            }
            Preset::DataDrift => {
                let reference = reference.ok_or(ReportError::MissingReference {
                    preset: "data drift",
                })?;
                data_drift_metrics(reference, current, mapping)?
            }
        };

        tracing::info!(
            report = name,
            preset = preset.label(),
            reference_rows = ?reference.map(DataFrame::height),
            current_rows = current.height(),
            metrics = metrics.len(),
            "report computed"
        );

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            preset,
            created_at: Utc::now(),
            reference_rows: reference.map(DataFrame::height),
            current_rows: current.height(),
            column_mapping: mapping.clone(),
            metrics,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preset(&self) -> Preset {
        self.preset
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reference_rows(&self) -> Option<usize> {
        self.reference_rows
    }

    pub fn current_rows(&self) -> usize {
        self.current_rows
    }

    pub fn column_mapping(&self) -> &ColumnMapping {
        &self.column_mapping
    }

    pub fn metrics(&self) -> &[MetricResult] {
        &self.metrics
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        write_file(path.as_ref(), &self.to_json()?)
    }

    pub fn save_html(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        write_file(path.as_ref(), &html::render(self))
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), "report written");
    Ok(())
}

fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.column(name).is_ok()
}

fn target_and_prediction(mapping: &ColumnMapping) -> Result<(&str, &str), ReportError> {
    let target = mapping
        .target
        .as_deref()
        .ok_or(ReportError::MissingMapping("target"))?;
    let prediction = mapping
        .prediction
        .as_deref()
        .ok_or(ReportError::MissingMapping("prediction"))?;
    Ok((target, prediction))
}

fn regression_metrics(
    reference: Option<&DataFrame>,
    current: &DataFrame,
    mapping: &ColumnMapping,
) -> Result<Vec<MetricResult>, ReportError> {
    let (target, prediction) = target_and_prediction(mapping)?;

    let current_cols = (column_f64(current, target)?, column_f64(current, prediction)?);
    let reference_cols = reference
        .map(|r| -> Result<_, ReportError> {
            Ok((column_f64(r, target)?, column_f64(r, prediction)?))
        })
        .transpose()?;

    let current = Scored {
        target: &current_cols.0,
        prediction: &current_cols.1,
    };
    let reference = reference_cols.as_ref().map(|(t, p)| Scored {
        target: t,
        prediction: p,
    });

    Ok(vec![
        MetricResult::RegressionQuality(regression_quality(&current, reference.as_ref())?),
        MetricResult::RegressionErrorDistribution(error_distribution(&current, reference.as_ref())),
        MetricResult::RegressionTopError(top_error(&current, reference.as_ref())?),
    ])
}

fn target_drift_metrics(
    reference: &DataFrame,
    current: &DataFrame,
    mapping: &ColumnMapping,
) -> Result<Vec<MetricResult>, ReportError> {
    let target = mapping
        .target
        .as_deref()
        .ok_or(ReportError::MissingMapping("target"))?;
    let ref_target = column_f64(reference, target)?;
    let cur_target = column_f64(current, target)?;

    let prediction = match mapping.prediction.as_deref() {
        Some(name) if has_column(reference, name) && has_column(current, name) => Some((
            name,
            column_f64(reference, name)?,
            column_f64(current, name)?,
        )),
        _ => None,
    };

    let mut metrics = vec![MetricResult::ColumnDrift(column_drift(
        target,
        ColumnKind::Numerical,
        &ref_target,
        &cur_target,
    )?)];
    if let Some((name, ref_values, cur_values)) = &prediction {
        metrics.push(MetricResult::ColumnDrift(column_drift(
            name,
            ColumnKind::Numerical,
            ref_values,
            cur_values,
        )?));
    }

    metrics.push(MetricResult::TargetCorrelations(feature_correlations(
        target,
        &ref_target,
        &cur_target,
        reference,
        current,
        mapping,
    )?));
    if let Some((name, ref_values, cur_values)) = &prediction {
        metrics.push(MetricResult::TargetCorrelations(feature_correlations(
            name,
            ref_values,
            cur_values,
            reference,
            current,
            mapping,
        )?));
    }

    Ok(metrics)
}

/// Pearson correlation of each numerical feature with `column`, on both sides.
fn feature_correlations(
    column: &str,
    ref_values: &[f64],
    cur_values: &[f64],
    reference: &DataFrame,
    current: &DataFrame,
    mapping: &ColumnMapping,
) -> Result<TargetCorrelations, ReportError> {
    let features = mapping
        .numerical_features
        .iter()
        .map(|feature| -> Result<FeatureCorrelation, ReportError> {
            Ok(FeatureCorrelation {
                feature: feature.clone(),
                reference: pearson(&column_f64(reference, feature)?, ref_values),
                current: pearson(&column_f64(current, feature)?, cur_values),
            })
        })
        .collect::<Result<Vec<_>, ReportError>>()?;
    Ok(TargetCorrelations {
        column: column.to_string(),
        features,
    })
}

/// Columns checked for data drift: features, then target and prediction.
fn drift_columns(mapping: &ColumnMapping) -> Vec<(&str, ColumnKind)> {
    let mut columns: Vec<(&str, ColumnKind)> = Vec::new();
    let numerical = mapping
        .numerical_features
        .iter()
        .map(|c| (c.as_str(), ColumnKind::Numerical));
    let categorical = mapping
        .categorical_features
        .iter()
        .map(|c| (c.as_str(), ColumnKind::Categorical));
    let outputs = mapping
        .target
        .iter()
        .chain(mapping.prediction.iter())
        .map(|c| (c.as_str(), ColumnKind::Numerical));

    for (name, kind) in numerical.chain(categorical).chain(outputs) {
        if !columns.iter().any(|(seen, _)| *seen == name) {
            columns.push((name, kind));
        }
    }
    columns
}

fn data_drift_metrics(
    reference: &DataFrame,
    current: &DataFrame,
    mapping: &ColumnMapping,
) -> Result<Vec<MetricResult>, ReportError> {
    let mut table = DataDriftTable { columns: Vec::new() };
    for (name, kind) in drift_columns(mapping) {
        if !has_column(reference, name) || !has_column(current, name) {
            tracing::warn!(column = name, "column missing from reference or current data, skipped");
            continue;
        }
        table.columns.push(column_drift(
            name,
            kind,
            &column_f64(reference, name)?,
            &column_f64(current, name)?,
        )?);
    }

    let summary = dataset_drift(&table);
    Ok(vec![
        MetricResult::DatasetDrift(summary),
        MetricResult::DataDriftTable(table),
    ])
}
