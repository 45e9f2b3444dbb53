/// Errors raised while fetching and parsing the bike-sharing dataset.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("download of {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataframe error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("row {row}: invalid date '{value}' in column '{column}'")]
    InvalidDate {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("row {row}: hour {hour} is out of range")]
    InvalidHour { row: usize, hour: i64 },

    #[error("row {row}: missing value in column '{column}'")]
    MissingValue { row: usize, column: String },
}

/// Errors raised while parsing time windows.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("invalid timestamp '{value}': expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("window start {start} is after its end {end}")]
    Inverted { start: String, end: String },
}

/// Errors raised while training or scoring the model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("dataframe error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("random forest error: {0}")]
    Forest(#[from] smartcore::error::Failed),

    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("test size {0} must lie strictly between 0 and 1")]
    InvalidTestSize(f64),
}

/// Errors raised while computing or persisting reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("dataframe error: {0}")]
    Frame(#[from] polars::error::PolarsError),

    #[error("statistics error: {0}")]
    Stats(#[from] statrs::StatsError),

    #[error("{preset} report needs reference data")]
    MissingReference { preset: &'static str },

    #[error("column mapping has no {0} column")]
    MissingMapping(&'static str),

    #[error("{0} data is empty")]
    EmptyData(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the on-disk monitoring workspace.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("workspace: project not found (id={0})")]
    ProjectNotFound(uuid::Uuid),

    #[error("workspace: I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("workspace: JSON error at {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}
