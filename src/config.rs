use serde::Deserialize;

use crate::window::{NamedWindow, TimeWindow};

pub const DEFAULT_DATA_URL: &str =
    "https://archive.ics.uci.edu/static/public/275/bike+sharing+dataset.zip";

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_data_url")]
    pub data_url: String,
    /// Member of the zip archive holding the hourly table.
    #[serde(default = "default_csv_member")]
    pub csv_member: String,
    /// Skip TLS certificate verification on the dataset download.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default = "default_html_dir")]
    pub html_dir: String,
    #[serde(default = "default_project_prefix")]
    pub project_prefix: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub windows: WindowsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_split_seed")]
    pub split_seed: u64,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowBounds {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeekConfig {
    pub name: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WindowsConfig {
    #[serde(default = "default_reference")]
    pub reference: WindowBounds,
    #[serde(default = "default_evaluation")]
    pub evaluation: WindowBounds,
    #[serde(default = "default_weeks")]
    pub weeks: Vec<WeekConfig>,
    /// Week used for the target and data drift reports.
    #[serde(default = "default_drift_week")]
    pub drift_week: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_numerical")]
    pub numerical: Vec<String>,
    #[serde(default = "default_categorical")]
    pub categorical: Vec<String>,
    #[serde(default = "default_target")]
    pub target: String,
}

fn default_data_url() -> String {
    DEFAULT_DATA_URL.to_string()
}

fn default_csv_member() -> String {
    "hour.csv".to_string()
}

fn default_workspace_dir() -> String {
    "examen_evidently_workspace".to_string()
}

fn default_html_dir() -> String {
    ".".to_string()
}

fn default_project_prefix() -> String {
    "examen_bike_drift".to_string()
}

fn default_n_estimators() -> usize {
    50
}

fn default_split_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.3
}

fn bounds(start: &str, end: &str) -> WindowBounds {
    WindowBounds {
        start: start.to_string(),
        end: end.to_string(),
    }
}

fn default_reference() -> WindowBounds {
    bounds("2011-01-01 00:00:00", "2011-01-28 23:00:00")
}

fn default_evaluation() -> WindowBounds {
    bounds("2011-01-29 00:00:00", "2011-02-28 23:00:00")
}

fn default_weeks() -> Vec<WeekConfig> {
    [
        ("week1", "2011-01-29 00:00:00", "2011-02-07 23:00:00"),
        ("week2", "2011-02-07 00:00:00", "2011-02-14 23:00:00"),
        ("week3", "2011-02-15 00:00:00", "2011-02-21 23:00:00"),
    ]
    .into_iter()
    .map(|(name, start, end)| WeekConfig {
        name: name.to_string(),
        start: start.to_string(),
        end: end.to_string(),
    })
    .collect()
}

fn default_drift_week() -> String {
    "week3".to_string()
}

fn default_numerical() -> Vec<String> {
    ["temp", "atemp", "hum", "windspeed", "mnth", "hr", "weekday"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_categorical() -> Vec<String> {
    ["season", "holiday", "workingday"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_target() -> String {
    "cnt".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            seed: 0,
            split_seed: default_split_seed(),
            test_size: default_test_size(),
        }
    }
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            evaluation: default_evaluation(),
            weeks: default_weeks(),
            drift_week: default_drift_week(),
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            numerical: default_numerical(),
            categorical: default_categorical(),
            target: default_target(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_url: default_data_url(),
            csv_member: default_csv_member(),
            accept_invalid_certs: false,
            workspace_dir: default_workspace_dir(),
            html_dir: default_html_dir(),
            project_prefix: default_project_prefix(),
            model: ModelConfig::default(),
            windows: WindowsConfig::default(),
            features: FeaturesConfig::default(),
        }
    }
}

/// Parsed windows ready for slicing.
#[derive(Debug, Clone)]
pub struct ResolvedWindows {
    pub reference: TimeWindow,
    pub evaluation: TimeWindow,
    pub weeks: Vec<NamedWindow>,
    pub drift_week: NamedWindow,
}

impl MonitorConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.model.test_size > 0.0 && self.model.test_size < 1.0) {
            anyhow::bail!(
                "model.test_size must lie strictly between 0 and 1, got {}",
                self.model.test_size
            );
        }
        if self.model.n_estimators == 0 {
            anyhow::bail!("model.n_estimators must be at least 1");
        }
        if self.features.numerical.is_empty() && self.features.categorical.is_empty() {
            anyhow::bail!("at least one feature column is required");
        }
        self.resolve_windows()?;
        Ok(())
    }

    pub fn resolve_windows(&self) -> anyhow::Result<ResolvedWindows> {
        let w = &self.windows;
        let reference = TimeWindow::parse(&w.reference.start, &w.reference.end)?;
        let evaluation = TimeWindow::parse(&w.evaluation.start, &w.evaluation.end)?;
        let weeks = w
            .weeks
            .iter()
            .map(|week| -> anyhow::Result<NamedWindow> {
                Ok(NamedWindow {
                    name: week.name.clone(),
                    window: TimeWindow::parse(&week.start, &week.end)?,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let drift_week = weeks
            .iter()
            .find(|week| week.name == w.drift_week)
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("windows.drift_week '{}' is not a configured week", w.drift_week)
            })?;
        Ok(ResolvedWindows {
            reference,
            evaluation,
            weeks,
            drift_week,
        })
    }

    /// Every feature column, numerical first.
    pub fn feature_columns(&self) -> Vec<String> {
        self.features
            .numerical
            .iter()
            .chain(self.features.categorical.iter())
            .cloned()
            .collect()
    }

    pub fn project_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.project_prefix, suffix)
    }
}
