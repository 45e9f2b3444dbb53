//! Two-sample statistical tests used by the drift metrics.
//!
//! P-value tests flag drift when the p-value falls below the threshold;
//! distance tests flag drift when the distance reaches the threshold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::ReportError;

/// Reference samples above this size switch to distance-based tests.
pub const SMALL_SAMPLE_LIMIT: usize = 1000;
/// Numerical columns with at most this many distinct values are tested as categories.
pub const MAX_CATEGORICAL_UNIQUE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numerical,
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatTest {
    KolmogorovSmirnov,
    ZTest,
    ChiSquare,
    Wasserstein,
    JensenShannon,
}

impl StatTest {
    pub fn label(&self) -> &'static str {
        match self {
            StatTest::KolmogorovSmirnov => "K-S p_value",
            StatTest::ZTest => "Z-test p_value",
            StatTest::ChiSquare => "chi-square p_value",
            StatTest::Wasserstein => "Wasserstein distance (normed)",
            StatTest::JensenShannon => "Jensen-Shannon distance",
        }
    }

    pub fn default_threshold(&self) -> f64 {
        match self {
            StatTest::KolmogorovSmirnov | StatTest::ZTest | StatTest::ChiSquare => 0.05,
            StatTest::Wasserstein | StatTest::JensenShannon => 0.1,
        }
    }

    fn is_p_value(&self) -> bool {
        matches!(
            self,
            StatTest::KolmogorovSmirnov | StatTest::ZTest | StatTest::ChiSquare
        )
    }

    pub fn drift_detected(&self, score: f64, threshold: f64) -> bool {
        if self.is_p_value() {
            score < threshold
        } else {
            score >= threshold
        }
    }

    pub fn score(&self, reference: &[f64], current: &[f64]) -> Result<f64, ReportError> {
        match self {
            StatTest::KolmogorovSmirnov => Ok(ks_2samp(reference, current).1),
            StatTest::ZTest => proportions_z_test(reference, current),
            StatTest::ChiSquare => chi_square(reference, current),
            StatTest::Wasserstein => Ok(wasserstein_distance_norm(reference, current)),
            StatTest::JensenShannon => Ok(jensen_shannon(reference, current)),
        }
    }
}

/// Outcome of one column test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatTestResult {
    pub stattest: StatTest,
    pub score: f64,
    pub threshold: f64,
    pub drift_detected: bool,
}

/// Pick the test for a column from the size and cardinality of its reference sample.
pub fn select_stattest(kind: ColumnKind, reference: &[f64]) -> StatTest {
    let n_unique = value_counts(reference).len();
    let numeric = kind == ColumnKind::Numerical && n_unique > MAX_CATEGORICAL_UNIQUE;

    if reference.len() <= SMALL_SAMPLE_LIMIT {
        if numeric {
            StatTest::KolmogorovSmirnov
        } else if n_unique <= 2 {
            StatTest::ZTest
        } else {
            StatTest::ChiSquare
        }
    } else if numeric {
        StatTest::Wasserstein
    } else {
        StatTest::JensenShannon
    }
}

/// Run the default test for a column. NaN values are ignored.
pub fn run_stattest(
    kind: ColumnKind,
    reference: &[f64],
    current: &[f64],
) -> Result<StatTestResult, ReportError> {
    let reference = finite(reference);
    let current = finite(current);
    if reference.is_empty() {
        return Err(ReportError::EmptyData("reference"));
    }
    if current.is_empty() {
        return Err(ReportError::EmptyData("current"));
    }

    let stattest = select_stattest(kind, &reference);
    let threshold = stattest.default_threshold();
    let score = stattest.score(&reference, &current)?;
    Ok(StatTestResult {
        stattest,
        score,
        threshold,
        drift_detected: stattest.drift_detected(score, threshold),
    })
}

fn finite(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

/// Count occurrences of each distinct value, keyed by its bit pattern.
fn value_counts(values: &[f64]) -> BTreeMap<u64, usize> {
    let mut counts = BTreeMap::new();
    for v in values {
        // fold -0.0 into 0.0
        let key = if *v == 0.0 { 0.0f64 } else { *v };
        *counts.entry(key.to_bits()).or_insert(0) += 1;
    }
    counts
}

/// Two-sample Kolmogorov-Smirnov statistic and asymptotic p-value.
pub fn ks_2samp(reference: &[f64], current: &[f64]) -> (f64, f64) {
    let a = sorted(reference);
    let b = sorted(current);
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return (0.0, 1.0);
    }

    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < n && j < m {
        let v = a[i].min(b[j]);
        while i < n && a[i] <= v {
            i += 1;
        }
        while j < m && b[j] <= v {
            j += 1;
        }
        d = d.max((i as f64 / n as f64 - j as f64 / m as f64).abs());
    }

    let en = ((n * m) as f64 / (n + m) as f64).sqrt();
    let p = kolmogorov_q((en + 0.12 + 0.11 / en) * d);
    (d, p)
}

/// Complementary Kolmogorov distribution `Q(lambda)`.
fn kolmogorov_q(lambda: f64) -> f64 {
    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev = 0.0;
    for j in 1..=100 {
        let jf = j as f64;
        let term = fac * (a2 * jf * jf).exp();
        sum += term;
        if term.abs() <= 0.001 * prev || term.abs() <= 1e-8 * sum {
            return sum.clamp(0.0, 1.0);
        }
        fac = -fac;
        prev = term.abs();
    }
    // no convergence only happens for lambda near zero
    1.0
}

/// Chi-square goodness of fit of current counts against reference shares.
pub fn chi_square(reference: &[f64], current: &[f64]) -> Result<f64, ReportError> {
    let ref_counts = value_counts(reference);
    let cur_counts = value_counts(current);
    let mut keys: Vec<u64> = ref_counts.keys().chain(cur_counts.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();
    if keys.len() < 2 {
        return Ok(1.0);
    }

    let k_norm = current.len() as f64 / reference.len() as f64;
    let mut statistic = 0.0;
    for key in &keys {
        let expected = *ref_counts.get(key).unwrap_or(&0) as f64 * k_norm;
        let observed = *cur_counts.get(key).unwrap_or(&0) as f64;
        if expected == 0.0 {
            // a category the reference never saw
            return Ok(0.0);
        }
        statistic += (observed - expected).powi(2) / expected;
    }

    let dist = ChiSquared::new((keys.len() - 1) as f64)?;
    Ok((1.0 - dist.cdf(statistic)).clamp(0.0, 1.0))
}

/// Two-sided Z-test for the difference of the share of one category.
pub fn proportions_z_test(reference: &[f64], current: &[f64]) -> Result<f64, ReportError> {
    let Some(&category) = value_counts(reference).keys().next() else {
        return Ok(1.0);
    };
    let share = |values: &[f64]| {
        let hits = values
            .iter()
            .filter(|v| {
                let v = if **v == 0.0 { 0.0f64 } else { **v };
                v.to_bits() == category
            })
            .count();
        hits as f64 / values.len() as f64
    };

    let (n1, n2) = (reference.len() as f64, current.len() as f64);
    let (p1, p2) = (share(reference), share(current));
    let pooled = (p1 * n1 + p2 * n2) / (n1 + n2);
    let variance = pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2);
    if variance <= 0.0 {
        return Ok(1.0);
    }

    let z = (p1 - p2) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0)?;
    Ok((2.0 * (1.0 - normal.cdf(z.abs()))).clamp(0.0, 1.0))
}

/// First Wasserstein distance divided by the reference standard deviation.
pub fn wasserstein_distance_norm(reference: &[f64], current: &[f64]) -> f64 {
    let a = sorted(reference);
    let b = sorted(current);
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 {
        return 0.0;
    }

    let mut all: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    all.sort_by(f64::total_cmp);

    let (mut i, mut j) = (0, 0);
    let mut distance = 0.0;
    for w in all.windows(2) {
        let x = w[0];
        while i < n && a[i] <= x {
            i += 1;
        }
        while j < m && b[j] <= x {
            j += 1;
        }
        let gap = (i as f64 / n as f64 - j as f64 / m as f64).abs();
        distance += gap * (w[1] - x);
    }

    let mean = a.iter().sum::<f64>() / n as f64;
    let std = (a.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64).sqrt();
    distance / std.max(0.001)
}

/// Jensen-Shannon distance between the category shares of both samples.
pub fn jensen_shannon(reference: &[f64], current: &[f64]) -> f64 {
    let ref_counts = value_counts(reference);
    let cur_counts = value_counts(current);
    let mut keys: Vec<u64> = ref_counts.keys().chain(cur_counts.keys()).copied().collect();
    keys.sort_unstable();
    keys.dedup();

    let (n1, n2) = (reference.len() as f64, current.len() as f64);
    let kl = |p: f64, m: f64| if p > 0.0 { p * (p / m).ln() } else { 0.0 };

    let mut divergence = 0.0;
    for key in &keys {
        let p = *ref_counts.get(key).unwrap_or(&0) as f64 / n1;
        let q = *cur_counts.get(key).unwrap_or(&0) as f64 / n2;
        let m = (p + q) / 2.0;
        divergence += 0.5 * kl(p, m) + 0.5 * kl(q, m);
    }
    divergence.max(0.0).sqrt()
}
