use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::WindowError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inclusive `[start, end]` timestamp range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, WindowError> {
        if start > end {
            return Err(WindowError::Inverted {
                start: start.format(TIMESTAMP_FORMAT).to_string(),
                end: end.format(TIMESTAMP_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two `YYYY-MM-DD HH:MM:SS` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        self.start <= *ts && *ts <= self.end
    }
}

/// A window with a label such as `week1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedWindow {
    pub name: String,
    pub window: TimeWindow,
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, WindowError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|source| {
        WindowError::InvalidTimestamp {
            value: value.to_string(),
            source,
        }
    })
}

/// Positions of the timestamps that fall inside `window`, in index order.
///
/// Nothing checks that the index covers the window; an uncovered window
/// simply selects no rows.
pub fn select_positions(index: &[NaiveDateTime], window: &TimeWindow) -> Vec<u32> {
    index
        .iter()
        .enumerate()
        .filter(|(_, ts)| window.contains(ts))
        .map(|(pos, _)| pos as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn hourly(from: &str, hours: i64) -> Vec<NaiveDateTime> {
        let start = parse_timestamp(from).unwrap();
        (0..hours).map(|h| start + Duration::hours(h)).collect()
    }

    #[test]
    fn bounds_are_inclusive() {
        let window = TimeWindow::parse("2011-01-29 00:00:00", "2011-02-07 23:00:00").unwrap();
        assert!(window.contains(&window.start));
        assert!(window.contains(&window.end));
        let before = window.start - Duration::hours(1);
        let after = window.end + Duration::hours(1);
        assert!(!window.contains(&before));
        assert!(!window.contains(&after));
    }

    #[test]
    fn week1_selects_ten_full_days() {
        let index = hourly("2011-01-01 00:00:00", 24 * 59);
        let window = TimeWindow::parse("2011-01-29 00:00:00", "2011-02-07 23:00:00").unwrap();
        let positions = select_positions(&index, &window);
        assert_eq!(positions.len(), 24 * 10);

        let first = index[positions[0] as usize];
        let last = index[*positions.last().unwrap() as usize];
        assert_eq!(first, window.start);
        assert_eq!(last, window.end);
    }

    #[test]
    fn overlapping_weeks_share_rows() {
        let index = hourly("2011-01-29 00:00:00", 24 * 31);
        let week1 = TimeWindow::parse("2011-01-29 00:00:00", "2011-02-07 23:00:00").unwrap();
        let week2 = TimeWindow::parse("2011-02-07 00:00:00", "2011-02-14 23:00:00").unwrap();
        let a = select_positions(&index, &week1);
        let b = select_positions(&index, &week2);
        let shared = a.iter().filter(|p| b.contains(p)).count();
        assert_eq!(shared, 24);
    }

    #[test]
    fn uncovered_window_is_empty() {
        let index = hourly("2011-01-01 00:00:00", 48);
        let window = TimeWindow::parse("2012-06-01 00:00:00", "2012-06-07 23:00:00").unwrap();
        assert!(select_positions(&index, &window).is_empty());
    }

    #[test]
    fn gaps_in_the_index_are_skipped() {
        let day = NaiveDate::from_ymd_opt(2011, 2, 1).unwrap();
        let index = vec![
            day.and_hms_opt(0, 0, 0).unwrap(),
            day.and_hms_opt(5, 0, 0).unwrap(),
            day.and_hms_opt(23, 0, 0).unwrap(),
        ];
        let window = TimeWindow::parse("2011-02-01 01:00:00", "2011-02-01 23:00:00").unwrap();
        assert_eq!(select_positions(&index, &window), vec![1, 2]);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            TimeWindow::parse("2011-02-01", "2011-02-02 00:00:00"),
            Err(WindowError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            TimeWindow::parse("2011-02-02 00:00:00", "2011-02-01 00:00:00"),
            Err(WindowError::Inverted { .. })
        ));
    }
}
