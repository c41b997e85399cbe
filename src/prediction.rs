//! Cycle statistics engine.
//!
//! Every function here is a pure function of a borrowed history snapshot.
//! Histories may arrive in any order and may contain intervals whose end
//! precedes their start; those are treated as missing.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{
    CycleReport, CycleStatistics, DateRange, FertilityWindow, PeriodInterval, Prediction,
};

/// Gaps between consecutive starts at or above this are data errors or
/// missing entries, not cycles.
pub const MAX_CYCLE_LENGTH_DAYS: i64 = 60;
/// Durations at or above this are not plausible periods.
pub const MAX_PERIOD_DURATION_DAYS: i64 = 15;
/// Ovulation is placed this many days before the next period starts.
pub const LUTEAL_PHASE_DAYS: i64 = 14;
pub const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
pub const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;

pub const DEFAULT_PERIOD_DURATION_DAYS: i64 = 5;
pub const REMOTE_CONFIDENCE_THRESHOLD: f32 = 0.7;
pub const SPARSE_HISTORY_CONFIDENCE: f32 = 0.4;
pub const ESTABLISHED_HISTORY_CONFIDENCE: f32 = 0.6;

/// Heuristic knobs. The biological constants above stay fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionPolicy {
    /// A remote prediction is preferred only when its confidence is
    /// strictly above this.
    pub remote_confidence_threshold: f32,
    /// Used when no recorded duration survives outlier filtering.
    pub default_period_duration: i64,
    /// Local confidence for a history of exactly two periods.
    pub sparse_history_confidence: f32,
    /// Local confidence for three or more periods.
    pub established_history_confidence: f32,
}

impl Default for PredictionPolicy {
    fn default() -> Self {
        Self {
            remote_confidence_threshold: REMOTE_CONFIDENCE_THRESHOLD,
            default_period_duration: DEFAULT_PERIOD_DURATION_DAYS,
            sparse_history_confidence: SPARSE_HISTORY_CONFIDENCE,
            established_history_confidence: ESTABLISHED_HISTORY_CONFIDENCE,
        }
    }
}

/// Local computation before any remote input is considered.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalForecast {
    /// Confidence is always `None` here; it is assigned when merging.
    pub prediction: Prediction,
    pub statistics: CycleStatistics,
    /// Well-formed intervals the forecast was computed from.
    pub samples: usize,
}

fn well_formed(history: &[PeriodInterval]) -> Vec<&PeriodInterval> {
    history.iter().filter(|p| p.is_well_formed()).collect()
}

/// Valid cycle lengths between consecutive period starts, in start order.
pub fn cycle_lengths(history: &[PeriodInterval]) -> Vec<i64> {
    let mut sorted = well_formed(history);
    sorted.sort_by_key(|p| p.start_date);

    sorted
        .windows(2)
        .map(|w| (w[1].start_date - w[0].start_date).num_days())
        .filter(|&days| days > 0 && days < MAX_CYCLE_LENGTH_DAYS)
        .collect()
}

fn rounded_mean(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mean = values.iter().sum::<i64>() as f64 / values.len() as f64;
    Some(mean.round() as i64)
}

/// Average/shortest/longest over already-filtered cycle lengths, paired
/// with a duration from [`average_period_duration`].
pub fn statistics(cycle_lengths: &[i64], average_period_duration: i64) -> CycleStatistics {
    CycleStatistics {
        average_cycle_length: rounded_mean(cycle_lengths),
        shortest_cycle_length: cycle_lengths.iter().copied().min(),
        longest_cycle_length: cycle_lengths.iter().copied().max(),
        average_period_duration,
    }
}

/// Rounded mean of plausible inclusive period durations, falling back to
/// the policy default when none survive.
pub fn average_period_duration(history: &[PeriodInterval], policy: &PredictionPolicy) -> i64 {
    let durations: Vec<i64> = history
        .iter()
        .map(PeriodInterval::duration_days)
        .filter(|&days| days > 0 && days < MAX_PERIOD_DURATION_DAYS)
        .collect();

    rounded_mean(&durations).unwrap_or(policy.default_period_duration)
}

/// Most recent well-formed period by start date.
pub fn latest_period(history: &[PeriodInterval]) -> Option<&PeriodInterval> {
    history
        .iter()
        .filter(|p| p.is_well_formed())
        .max_by_key(|p| p.start_date)
}

/// Predict the next period's date range.
/// Requires at least 2 periods and one non-outlier cycle length. Dates that
/// would fall past the calendar's range yield `None`.
pub fn predict_next_period(
    history: &[PeriodInterval],
    policy: &PredictionPolicy,
) -> Option<DateRange> {
    if history.len() < 2 {
        return None;
    }

    let average_cycle = rounded_mean(&cycle_lengths(history))?;
    let latest = latest_period(history)?;

    let start_date = latest
        .start_date
        .checked_add_signed(Duration::days(average_cycle))?;
    let duration = average_period_duration(history, policy);
    let end_date = start_date.checked_add_signed(Duration::days(duration - 1))?;

    Some(DateRange {
        start_date,
        end_date,
    })
}

/// Ovulation date and fertile window anchored to a predicted period start.
/// The window runs from 5 days before ovulation to the day after.
pub fn ovulation_and_fertility(
    next_period_start: Option<NaiveDate>,
) -> (Option<NaiveDate>, Option<FertilityWindow>) {
    let Some(start) = next_period_start else {
        return (None, None);
    };

    let dates = start
        .checked_sub_signed(Duration::days(LUTEAL_PHASE_DAYS))
        .and_then(|ovulation| {
            let window = FertilityWindow {
                start: ovulation.checked_sub_signed(Duration::days(FERTILE_DAYS_BEFORE_OVULATION))?,
                end: ovulation.checked_add_signed(Duration::days(FERTILE_DAYS_AFTER_OVULATION))?,
            };
            Some((ovulation, window))
        });

    match dates {
        Some((ovulation, window)) => (Some(ovulation), Some(window)),
        None => (None, None),
    }
}

/// Statistics view for a history, including bookkeeping fields.
pub fn cycle_statistics(history: &[PeriodInterval], policy: &PredictionPolicy) -> CycleReport {
    let stats = statistics(
        &cycle_lengths(history),
        average_period_duration(history, policy),
    );

    let last = latest_period(history);

    CycleReport {
        total_periods: history.len(),
        statistics: stats,
        last_period_start: last.map(|p| p.start_date),
        last_period_end: last.map(|p| p.end_date),
    }
}

/// Full local forecast without confidence.
pub fn local_forecast(history: &[PeriodInterval], policy: &PredictionPolicy) -> LocalForecast {
    let next_period = predict_next_period(history, policy);
    let (ovulation_date, fertility_window) =
        ovulation_and_fertility(next_period.map(|range| range.start_date));

    LocalForecast {
        prediction: Prediction {
            next_period,
            ovulation_date,
            fertility_window,
            confidence: None,
        },
        statistics: cycle_statistics(history, policy).statistics,
        samples: history.iter().filter(|p| p.is_well_formed()).count(),
    }
}
