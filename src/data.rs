use std::io::{Cursor, Read};

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::config::MonitorConfig;
use crate::error::DataError;
use crate::window::{select_positions, TimeWindow};

/// Hourly observations with a timestamp index parallel to the frame rows.
#[derive(Debug, Clone)]
pub struct Observations {
    frame: DataFrame,
    index: Vec<NaiveDateTime>,
}

impl Observations {
    /// Index `frame` by the date in `dteday` combined with the hour in `hr`.
    pub fn from_frame(frame: DataFrame) -> Result<Self, DataError> {
        let index = {
            let dates = frame.column("dteday")?.utf8()?;
            let hours = frame.column("hr")?.cast(&DataType::Int64)?;
            let hours = hours.i64()?;

            let mut index = Vec::with_capacity(frame.height());
            for (row, (date, hour)) in dates.into_iter().zip(hours.into_iter()).enumerate() {
                let date = date.ok_or_else(|| DataError::MissingValue {
                    row,
                    column: "dteday".to_string(),
                })?;
                let hour = hour.ok_or_else(|| DataError::MissingValue {
                    row,
                    column: "hr".to_string(),
                })?;
                index.push(combine_date_hour(row, date, hour)?);
            }
            index
        };
        Ok(Self { frame, index })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Earliest and latest timestamps, `None` when empty.
    pub fn time_range(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let min = self.index.iter().min()?;
        let max = self.index.iter().max()?;
        Some((*min, *max))
    }

    /// Rows at the given positions, in the order given.
    pub fn take(&self, positions: &[u32]) -> Result<Self, DataError> {
        let indices = UInt32Chunked::from_vec("", positions.to_vec());
        let frame = self.frame.take(&indices)?;
        let index = positions.iter().map(|&p| self.index[p as usize]).collect();
        Ok(Self { frame, index })
    }

    /// Rows whose timestamp lies inside `window`.
    pub fn slice(&self, window: &TimeWindow) -> Result<Self, DataError> {
        self.take(&select_positions(&self.index, window))
    }

    /// Add or replace a column.
    pub fn with_column(mut self, column: Series) -> Result<Self, DataError> {
        self.frame.with_column(column)?;
        Ok(self)
    }
}

fn combine_date_hour(row: usize, date: &str, hour: i64) -> Result<NaiveDateTime, DataError> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").map_err(|_| {
        DataError::InvalidDate {
            row,
            column: "dteday",
            value: date.to_string(),
        }
    })?;
    u32::try_from(hour)
        .ok()
        .and_then(|h| day.and_hms_opt(h, 0, 0))
        .ok_or(DataError::InvalidHour { row, hour })
}

/// Numeric column as `f64`, nulls as NaN.
pub fn column_f64(frame: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    let series = frame.column(name)?.cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Ok(values)
}

/// Download the dataset archive into memory.
pub fn fetch_archive(url: &str, accept_invalid_certs: bool) -> Result<Vec<u8>, DataError> {
    if accept_invalid_certs {
        tracing::warn!(url, "TLS certificate verification is disabled for the dataset download");
    }
    let client = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?;
    download(&client, url)
}

fn download(client: &reqwest::blocking::Client, url: &str) -> Result<Vec<u8>, DataError> {
    tracing::info!(url, "downloading dataset archive");
    let response = client.get(url).send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(DataError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = response.bytes()?;
    tracing::info!(bytes = bytes.len(), "archive downloaded");
    Ok(bytes.to_vec())
}

/// Read one member of an in-memory zip archive.
pub fn extract_member(archive: &[u8], member: &str) -> Result<Vec<u8>, DataError> {
    let mut archive = ::zip::ZipArchive::new(Cursor::new(archive))?;
    let mut file = archive.by_name(member)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

pub fn load_hourly_csv(content: Vec<u8>) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(Cursor::new(content))
        .has_header(true)
        .finish()?;

    tracing::info!(rows = df.height(), columns = df.width(), "loaded hourly table");
    Ok(df)
}

/// Download, unpack and index the hourly bike-sharing table.
pub fn fetch_observations(config: &MonitorConfig) -> Result<Observations, DataError> {
    let archive = fetch_archive(&config.data_url, config.accept_invalid_certs)?;
    let csv = extract_member(&archive, &config.csv_member)?;
    let frame = load_hourly_csv(csv)?;
    Observations::from_frame(frame)
}
