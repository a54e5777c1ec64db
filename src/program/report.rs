//! Progress Reporter aggregations over day completion timestamps.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::program::domain::ProgramSnapshot;

pub const WEEKLY_BUCKETS: i64 = 7;
pub const MONTHLY_BUCKETS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBucket {
    pub date: NaiveDate,
    pub completed_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyBucket {
    pub month: String,
    pub completed_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub current_program: Option<ProgramSnapshot>,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub completion_rate: i64,
    pub streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
    pub completed_programs: i64,
    pub weekly: Vec<DailyBucket>,
    pub monthly: Vec<MonthlyBucket>,
}

pub fn completion_rate(completed: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as i64
}

/// Last seven calendar days ending today, oldest first.
pub fn weekly_series(completions: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<DailyBucket> {
    let today = now.date_naive();
    (0..WEEKLY_BUCKETS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let completed_days = completions
                .iter()
                .filter(|at| at.date_naive() == date)
                .count() as i64;
            DailyBucket {
                date,
                completed_days,
            }
        })
        .collect()
}

/// Last six calendar months ending with the current one, oldest first.
pub fn monthly_series(completions: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<MonthlyBucket> {
    (0..MONTHLY_BUCKETS)
        .rev()
        .map(|back| {
            let (year, month) = months_before(now.year(), now.month(), back);
            let completed_days = completions
                .iter()
                .filter(|at| at.year() == year && at.month() == month)
                .count() as i64;
            MonthlyBucket {
                month: format!("{:04}-{:02}", year, month),
                completed_days,
            }
        })
        .collect()
}

fn months_before(year: i32, month: u32, back: u32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 - back as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn completion_rate_handles_empty() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(1, 21), 5);
        assert_eq!(completion_rate(21, 21), 100);
    }

    #[test]
    fn weekly_series_counts_per_day() {
        let now = at(2024, 3, 10);
        let completions = vec![at(2024, 3, 10), at(2024, 3, 10), at(2024, 3, 4), at(2024, 3, 3)];
        let weekly = weekly_series(&completions, now);
        assert_eq!(weekly.len(), 7);
        assert_eq!(weekly[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(weekly[0].completed_days, 1);
        assert_eq!(weekly[6].completed_days, 2);
        assert_eq!(weekly.iter().map(|b| b.completed_days).sum::<i64>(), 3);
    }

    #[test]
    fn monthly_series_crosses_year_boundary() {
        let now = at(2024, 2, 15);
        let completions = vec![at(2023, 9, 1), at(2023, 12, 31), at(2024, 2, 1), at(2023, 8, 1)];
        let monthly = monthly_series(&completions, now);
        let months: Vec<&str> = monthly.iter().map(|b| b.month.as_str()).collect();
        assert_eq!(
            months,
            vec!["2023-09", "2023-10", "2023-11", "2023-12", "2024-01", "2024-02"]
        );
        let counts: Vec<i64> = monthly.iter().map(|b| b.completed_days).collect();
        assert_eq!(counts, vec![1, 0, 0, 1, 0, 1]);
    }
}
