pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod window;
pub mod workspace;

pub use config::MonitorConfig;
pub use data::{extract_member, fetch_archive, fetch_observations, load_hourly_csv, Observations};
pub use model::{train_test_split, BikeModel, ForestParams};
pub use pipeline::{run, run_with_observations, RunSummary};
pub use report::{ColumnMapping, Preset, Report};
pub use window::{NamedWindow, TimeWindow};
pub use workspace::{add_report_to_workspace, Project, Workspace};
