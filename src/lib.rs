//! Privacy-first cycle tracking.
//!
//! The core is [`prediction`], a set of pure functions turning a period
//! history into cycle statistics and a next-period forecast, and
//! [`forecast::merge_with_remote`], which decides between that local
//! forecast and an optional remote one. [`tracker::Tracker`] wires both to
//! a [`store::PeriodStore`] and a [`remote::RemotePredictor`].

pub mod cache;
pub mod calendar;
pub mod config;
pub mod crypto;
pub mod error;
pub mod forecast;
pub mod models;
pub mod prediction;
pub mod remote;
pub mod storage;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};
pub use forecast::{Forecast, ForecastStatus, PredictionSource};
pub use models::{
    CycleStatistics, DateRange, FertilityWindow, Mood, NewPeriod, PeriodInterval, PeriodPatch,
    Prediction, RemotePrediction, Symptom,
};
pub use prediction::PredictionPolicy;
pub use tracker::{PublishedForecast, Tracker, TrackerOptions};
