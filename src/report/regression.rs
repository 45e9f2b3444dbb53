use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Error statistics of one dataset. Errors are `prediction - target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionStats {
    pub rows: usize,
    pub mean_error: f64,
    pub mean_abs_error: f64,
    pub rmse: f64,
    /// Percent; rows with a zero target are skipped.
    pub mean_abs_perc_error: Option<f64>,
    /// `None` when the target is constant.
    pub r2_score: Option<f64>,
    pub error_std: f64,
    pub abs_error_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionQuality {
    pub current: RegressionStats,
    pub reference: Option<RegressionStats>,
}

/// Histogram of prediction errors on shared bin edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDistribution {
    pub bin_edges: Vec<f64>,
    pub current: Vec<usize>,
    pub reference: Option<Vec<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub rows: usize,
    pub mean_error: f64,
    pub std_error: f64,
}

/// Errors split at their 5th and 95th percentiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopErrorGroups {
    pub underestimation: ErrorGroup,
    pub majority: ErrorGroup,
    pub overestimation: ErrorGroup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopError {
    pub current: TopErrorGroups,
    pub reference: Option<TopErrorGroups>,
}

/// Target/prediction pair of one dataset.
pub struct Scored<'a> {
    pub target: &'a [f64],
    pub prediction: &'a [f64],
}

impl Scored<'_> {
    fn errors(&self) -> Vec<f64> {
        self.prediction
            .iter()
            .zip(self.target)
            .map(|(p, t)| p - t)
            .collect()
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

pub fn regression_stats(data: &Scored<'_>) -> Result<RegressionStats, ReportError> {
    let errors = data.errors();
    if errors.is_empty() {
        return Err(ReportError::EmptyData("scored"));
    }

    let abs: Vec<f64> = errors.iter().map(|e| e.abs()).collect();
    let perc: Vec<f64> = errors
        .iter()
        .zip(data.target)
        .filter(|(_, t)| **t != 0.0)
        .map(|(e, t)| (e / t).abs() * 100.0)
        .collect();

    let target_mean = mean(data.target);
    let ss_tot: f64 = data.target.iter().map(|t| (t - target_mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();

    Ok(RegressionStats {
        rows: errors.len(),
        mean_error: mean(&errors),
        mean_abs_error: mean(&abs),
        rmse: (ss_res / errors.len() as f64).sqrt(),
        mean_abs_perc_error: (!perc.is_empty()).then(|| mean(&perc)),
        r2_score: (ss_tot > 0.0).then(|| 1.0 - ss_res / ss_tot),
        error_std: std_dev(&errors),
        abs_error_max: abs.iter().cloned().fold(0.0, f64::max),
    })
}

pub fn regression_quality(
    current: &Scored<'_>,
    reference: Option<&Scored<'_>>,
) -> Result<RegressionQuality, ReportError> {
    Ok(RegressionQuality {
        current: regression_stats(current)?,
        reference: reference.map(regression_stats).transpose()?,
    })
}

/// Sturges bin edges over the errors of both datasets.
pub fn error_distribution(current: &Scored<'_>, reference: Option<&Scored<'_>>) -> ErrorDistribution {
    let current_errors = current.errors();
    let reference_errors = reference.map(Scored::errors);

    let all = current_errors
        .iter()
        .chain(reference_errors.iter().flatten())
        .copied();
    let (lo, hi) = all.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), e| {
        (lo.min(e), hi.max(e))
    });
    let total = current_errors.len() + reference_errors.as_ref().map_or(0, Vec::len);
    if total == 0 {
        return ErrorDistribution {
            bin_edges: Vec::new(),
            current: Vec::new(),
            reference: reference_errors.map(|_| Vec::new()),
        };
    }

    let bins = ((total as f64).log2().ceil() as usize + 1).max(1);
    let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
    let width = (hi - lo) / bins as f64;
    let bin_edges: Vec<f64> = (0..=bins).map(|i| lo + width * i as f64).collect();

    let histogram = |errors: &[f64]| {
        let mut counts = vec![0usize; bins];
        for e in errors {
            let idx = (((e - lo) / width).floor() as usize).min(bins - 1);
            counts[idx] += 1;
        }
        counts
    };

    ErrorDistribution {
        current: histogram(&current_errors),
        reference: reference_errors.as_deref().map(histogram),
        bin_edges,
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}

fn error_group(errors: &[f64]) -> ErrorGroup {
    ErrorGroup {
        rows: errors.len(),
        mean_error: if errors.is_empty() { 0.0 } else { mean(errors) },
        std_error: std_dev(errors),
    }
}

pub fn top_error_groups(data: &Scored<'_>) -> Result<TopErrorGroups, ReportError> {
    let errors = data.errors();
    if errors.is_empty() {
        return Err(ReportError::EmptyData("scored"));
    }
    let mut sorted = errors.clone();
    sorted.sort_by(f64::total_cmp);
    let low = percentile(&sorted, 0.05);
    let high = percentile(&sorted, 0.95);

    let under: Vec<f64> = errors.iter().copied().filter(|e| *e <= low).collect();
    let over: Vec<f64> = errors.iter().copied().filter(|e| *e >= high).collect();
    let majority: Vec<f64> = errors
        .iter()
        .copied()
        .filter(|e| *e > low && *e < high)
        .collect();

    Ok(TopErrorGroups {
        underestimation: error_group(&under),
        majority: error_group(&majority),
        overestimation: error_group(&over),
    })
}

pub fn top_error(current: &Scored<'_>, reference: Option<&Scored<'_>>) -> Result<TopError, ReportError> {
    Ok(TopError {
        current: top_error_groups(current)?,
        reference: reference.map(top_error_groups).transpose()?,
    })
}
