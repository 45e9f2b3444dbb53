#![allow(dead_code)]

use std::fmt::Write;

use bike_drift_monitor::config::MonitorConfig;
use bike_drift_monitor::{load_hourly_csv, Observations};
use chrono::{Datelike, Duration, NaiveDate};
use tempfile::TempDir;

const HEADER: &str = "instant,dteday,season,yr,mnth,hr,holiday,weekday,workingday,weathersit,temp,atemp,hum,windspeed,casual,registered,cnt";

/// Hourly rows shaped like the UCI table, 2011-01-01 through 2011-02-28.
pub fn synthetic_hour_csv() -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');

    let first = NaiveDate::from_ymd_opt(2011, 1, 1).unwrap();
    let mut instant = 1;
    for day in 0..59 {
        let date = first + Duration::days(day);
        // 2011-01-01 was a Saturday
        let weekday = (6 + day) % 7;
        let holiday = i64::from(date == NaiveDate::from_ymd_opt(2011, 1, 17).unwrap());
        let workingday = i64::from((1..=5).contains(&weekday) && holiday == 0);
        for hr in 0..24i64 {
            let phase = (instant as f64 * 0.37).sin();
            let seasonal = day as f64 / 59.0;
            let temp = 0.15 + 0.25 * seasonal + 0.05 * phase;
            let atemp = temp * 0.95 + 0.02;
            let hum = 0.55 + 0.3 * (instant as f64 * 0.11).cos();
            let windspeed = 0.1 + 0.1 * (instant as f64 * 0.23).sin().abs();
            let weathersit = 1 + (instant % 3);
            let rush = if workingday == 1 && (hr == 8 || hr == 17) { 120.0 } else { 0.0 };
            let daylight = if (7..=20).contains(&hr) { 40.0 } else { 5.0 };
            let casual = (daylight * temp * 2.0).round() as i64;
            let registered = (daylight + rush + 150.0 * temp - 20.0 * hum).max(1.0).round() as i64;
            let cnt = casual + registered;
            let _ = writeln!(
                csv,
                "{instant},{},1,0,{},{hr},{holiday},{weekday},{workingday},{weathersit},{temp:.4},{atemp:.4},{hum:.4},{windspeed:.4},{casual},{registered},{cnt}",
                date.format("%Y-%m-%d"),
                date.month(),
            );
            instant += 1;
        }
    }
    csv
}

pub fn synthetic_observations() -> Observations {
    let frame = load_hourly_csv(synthetic_hour_csv().into_bytes()).unwrap();
    Observations::from_frame(frame).unwrap()
}

/// Config writing every artifact under `dir`, with a small forest.
pub fn test_config(dir: &TempDir) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.workspace_dir = dir.path().join("workspace").display().to_string();
    config.html_dir = dir.path().join("html").display().to_string();
    config.model.n_estimators = 10;
    config
}
