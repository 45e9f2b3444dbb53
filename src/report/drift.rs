use serde::{Deserialize, Serialize};

use super::stattest::{run_stattest, ColumnKind, StatTest};
use crate::error::ReportError;

/// Share of drifted columns at which the whole dataset counts as drifted.
pub const DATASET_DRIFT_SHARE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub column: String,
    pub kind: ColumnKind,
    pub stattest: StatTest,
    pub stattest_label: String,
    pub threshold: f64,
    pub drift_score: f64,
    pub drift_detected: bool,
    pub reference_mean: f64,
    pub current_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDriftTable {
    pub columns: Vec<ColumnDrift>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDrift {
    pub n_columns: usize,
    pub n_drifted_columns: usize,
    pub share_of_drifted_columns: f64,
    pub threshold: f64,
    pub dataset_drift: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCorrelation {
    pub feature: String,
    pub reference: Option<f64>,
    pub current: Option<f64>,
}

/// Pearson correlation of each numerical feature with one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetCorrelations {
    pub column: String,
    pub features: Vec<FeatureCorrelation>,
}

fn finite_mean(values: &[f64]) -> f64 {
    let (sum, n) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

pub fn column_drift(
    column: &str,
    kind: ColumnKind,
    reference: &[f64],
    current: &[f64],
) -> Result<ColumnDrift, ReportError> {
    let result = run_stattest(kind, reference, current)?;
    tracing::debug!(
        column,
        stattest = result.stattest.label(),
        score = result.score,
        drift = result.drift_detected,
        "column drift"
    );
    Ok(ColumnDrift {
        column: column.to_string(),
        kind,
        stattest: result.stattest,
        stattest_label: result.stattest.label().to_string(),
        threshold: result.threshold,
        drift_score: result.score,
        drift_detected: result.drift_detected,
        reference_mean: finite_mean(reference),
        current_mean: finite_mean(current),
    })
}

pub fn dataset_drift(table: &DataDriftTable) -> DatasetDrift {
    let n_columns = table.columns.len();
    let n_drifted_columns = table.columns.iter().filter(|c| c.drift_detected).count();
    let share_of_drifted_columns = if n_columns == 0 {
        0.0
    } else {
        n_drifted_columns as f64 / n_columns as f64
    };
    DatasetDrift {
        n_columns,
        n_drifted_columns,
        share_of_drifted_columns,
        threshold: DATASET_DRIFT_SHARE,
        dataset_drift: n_columns > 0 && share_of_drifted_columns >= DATASET_DRIFT_SHARE,
    }
}

/// Pearson correlation, `None` when either side is constant or too short.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| !a.is_nan() && !b.is_nan())
        .map(|(a, b)| (*a, *b))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0f64, 0.0f64, 0.0f64);
    for (a, b) in &pairs {
        sxy += (a - mx) * (b - my);
        sxx += (a - mx).powi(2);
        syy += (b - my).powi(2);
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some(sxy / (sxx * syy).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drift(column: &str, detected: bool) -> ColumnDrift {
        ColumnDrift {
            column: column.to_string(),
            kind: ColumnKind::Numerical,
            stattest: StatTest::KolmogorovSmirnov,
            stattest_label: StatTest::KolmogorovSmirnov.label().to_string(),
            threshold: 0.05,
            drift_score: if detected { 0.0 } else { 1.0 },
            drift_detected: detected,
            reference_mean: 0.0,
            current_mean: 0.0,
        }
    }

    #[test]
    fn dataset_drift_needs_half_the_columns() {
        let table = DataDriftTable {
            columns: vec![drift("a", true), drift("b", false), drift("c", false)],
        };
        let summary = dataset_drift(&table);
        assert_eq!(summary.n_drifted_columns, 1);
        assert!(!summary.dataset_drift);

        let table = DataDriftTable {
            columns: vec![drift("a", true), drift("b", false)],
        };
        assert!(dataset_drift(&table).dataset_drift);

        let empty = DataDriftTable { columns: vec![] };
        assert!(!dataset_drift(&empty).dataset_drift);
    }

    #[test]
    fn column_drift_reports_means() {
        let reference: Vec<f64> = (0..100).map(f64::from).collect();
        let current: Vec<f64> = (200..260).map(f64::from).collect();
        let result = column_drift("temp", ColumnKind::Numerical, &reference, &current).unwrap();
        assert!(result.drift_detected);
        assert_eq!(result.stattest, StatTest::KolmogorovSmirnov);
        assert_eq!(result.reference_mean, 49.5);
        assert_eq!(result.current_mean, 229.5);
    }

    #[test]
    fn pearson_signs_and_degenerate_input() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((pearson(&x, &[2.0, 4.0, 6.0, 8.0]).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &[8.0, 6.0, 4.0, 2.0]).unwrap() + 1.0).abs() < 1e-12);
        assert_eq!(pearson(&x, &[5.0; 4]), None);
        assert_eq!(pearson(&[1.0], &[1.0]), None);
    }
}
