use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Symptom {
    Cramps,
    Headache,
    Fatigue,
    Bloating,
    BreastTenderness,
    Acne,
    Nausea,
    BackPain,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Normal,
    Tired,
    Stressed,
    Energetic,
}

/// One recorded menstruation episode.
///
/// `end_date >= start_date` is enforced when a period is saved through a
/// store, but the engine still tolerates histories that violate it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodInterval {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub symptoms: BTreeSet<Symptom>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub description: Option<String>,
}

impl PeriodInterval {
    pub fn is_well_formed(&self) -> bool {
        self.end_date >= self.start_date
    }

    /// Inclusive day count, so a single-day period lasts 1 day.
    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.is_well_formed() && date >= self.start_date && date <= self.end_date
    }
}

/// Input of the Add Period flow. The id is assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub symptoms: BTreeSet<Symptom>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            symptoms: BTreeSet::new(),
            mood: None,
            description: None,
        }
    }

    pub fn into_interval(self, id: Uuid) -> PeriodInterval {
        PeriodInterval {
            id,
            start_date: self.start_date,
            end_date: self.end_date,
            symptoms: self.symptoms,
            mood: self.mood,
            description: self.description,
        }
    }
}

/// Partial update. `None` leaves the field unchanged; `Some(None)` clears
/// an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PeriodPatch {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub symptoms: Option<BTreeSet<Symptom>>,
    pub mood: Option<Option<Mood>>,
    pub description: Option<Option<String>>,
}

impl PeriodPatch {
    pub fn apply_to(&self, interval: &mut PeriodInterval) {
        if let Some(start) = self.start_date {
            interval.start_date = start;
        }
        if let Some(end) = self.end_date {
            interval.end_date = end;
        }
        if let Some(ref symptoms) = self.symptoms {
            interval.symptoms = symptoms.clone();
        }
        if let Some(mood) = self.mood {
            interval.mood = mood;
        }
        if let Some(ref description) = self.description {
            interval.description = description.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_date.is_none()
            && self.end_date.is_none()
            && self.symptoms.is_none()
            && self.mood.is_none()
            && self.description.is_none()
    }
}

/// Calendar-date range, serialized as ISO-8601 `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FertilityWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FertilityWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Derived cycle statistics. Cycle fields are `None` until at least one
/// valid cycle length exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatistics {
    pub average_cycle_length: Option<i64>,
    pub shortest_cycle_length: Option<i64>,
    pub longest_cycle_length: Option<i64>,
    pub average_period_duration: i64,
}

/// Statistics view including history bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleReport {
    pub total_periods: usize,
    pub statistics: CycleStatistics,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub next_period: Option<DateRange>,
    pub ovulation_date: Option<NaiveDate>,
    pub fertility_window: Option<FertilityWindow>,
    pub confidence: Option<f32>,
}

impl Prediction {
    pub fn is_available(&self) -> bool {
        self.next_period.is_some()
    }
}

/// Payload returned by an enhanced remote predictor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemotePrediction {
    pub prediction: Prediction,
    #[serde(default)]
    pub statistics: Option<CycleStatistics>,
}
