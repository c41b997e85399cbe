//! Calendar and dashboard views over a history and its forecast.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{PeriodInterval, Prediction};
use crate::prediction::{self, PredictionPolicy};

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid month {year}-{month:02}")]
    InvalidMonth { year: i32, month: u32 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayKind {
    Recorded,
    Predicted,
    Ovulation,
    Fertile,
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub kind: DayKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
}

fn classify(date: NaiveDate, history: &[PeriodInterval], prediction: &Prediction) -> DayKind {
    if history.iter().any(|p| p.contains(date)) {
        DayKind::Recorded
    } else if prediction.next_period.is_some_and(|r| r.contains(date)) {
        DayKind::Predicted
    } else if prediction.ovulation_date == Some(date) {
        DayKind::Ovulation
    } else if prediction.fertility_window.is_some_and(|w| w.contains(date)) {
        DayKind::Fertile
    } else {
        DayKind::Clear
    }
}

pub fn month_view(
    year: i32,
    month: u32,
    history: &[PeriodInterval],
    prediction: &Prediction,
) -> Result<MonthView, CalendarError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(CalendarError::InvalidMonth { year, month })?;

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| CalendarDay {
            date,
            kind: classify(date, history, prediction),
        })
        .collect();

    Ok(MonthView { year, month, days })
}

/// Figures shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub latest_period: Option<PeriodInterval>,
    pub latest_duration: Option<i64>,
    pub next_period_start: Option<NaiveDate>,
    /// Negative once the predicted start has passed.
    pub days_until_next: Option<i64>,
    pub average_cycle_length: Option<i64>,
    pub average_period_duration: i64,
    /// Rough day of the cycle on which ovulation falls.
    pub ovulation_cycle_day: Option<i64>,
}

pub fn summary(
    history: &[PeriodInterval],
    prediction: &Prediction,
    policy: &PredictionPolicy,
    today: NaiveDate,
) -> Summary {
    let latest = prediction::latest_period(history).cloned();
    let report = prediction::cycle_statistics(history, policy);
    let next_start = prediction.next_period.map(|r| r.start_date);
    let average_cycle = report.statistics.average_cycle_length;

    Summary {
        latest_duration: latest.as_ref().map(PeriodInterval::duration_days),
        latest_period: latest,
        next_period_start: next_start,
        days_until_next: next_start.map(|start| (start - today).num_days()),
        average_cycle_length: average_cycle,
        average_period_duration: report.statistics.average_period_duration,
        ovulation_cycle_day: average_cycle.map(|days| days / 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPeriod;
    use crate::prediction::local_forecast;
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn history() -> Vec<PeriodInterval> {
        vec![
            NewPeriod::new(date("2024-01-01"), date("2024-01-05")).into_interval(Uuid::new_v4()),
            NewPeriod::new(date("2024-01-29"), date("2024-02-02")).into_interval(Uuid::new_v4()),
        ]
    }

    #[test]
    fn february_marks_recorded_fertile_and_predicted_days() {
        let history = history();
        let local = local_forecast(&history, &PredictionPolicy::default());
        let view = month_view(2024, 2, &history, &local.prediction).unwrap();

        assert_eq!(view.days.len(), 29);
        let kind = |day: u32| view.days[day as usize - 1].kind;
        assert_eq!(kind(1), DayKind::Recorded);
        assert_eq!(kind(3), DayKind::Clear);
        assert_eq!(kind(7), DayKind::Fertile);
        assert_eq!(kind(12), DayKind::Ovulation);
        assert_eq!(kind(13), DayKind::Fertile);
        assert_eq!(kind(14), DayKind::Clear);
        assert_eq!(kind(26), DayKind::Predicted);
        assert_eq!(kind(29), DayKind::Predicted);
    }

    #[test]
    fn invalid_month_is_rejected() {
        assert!(month_view(2024, 13, &[], &Prediction::default()).is_err());
    }

    #[test]
    fn summary_counts_down_to_next_period() {
        let history = history();
        let policy = PredictionPolicy::default();
        let local = local_forecast(&history, &policy);

        let summary = summary(&history, &local.prediction, &policy, date("2024-02-20"));
        assert_eq!(summary.latest_duration, Some(5));
        assert_eq!(summary.next_period_start, Some(date("2024-02-26")));
        assert_eq!(summary.days_until_next, Some(6));
        assert_eq!(summary.average_cycle_length, Some(28));
        assert_eq!(summary.ovulation_cycle_day, Some(14));
    }

    #[test]
    fn empty_history_summary() {
        let summary = summary(&[], &Prediction::default(), &PredictionPolicy::default(), date("2024-02-20"));
        assert_eq!(summary.latest_period, None);
        assert_eq!(summary.days_until_next, None);
        assert_eq!(summary.average_period_duration, 5);
    }
}
