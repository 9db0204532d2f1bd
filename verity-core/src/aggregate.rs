//! Aggregator: derives summary statistics from the event store
//!
//! A snapshot is a pure function of the store at scan time:
//!
//!   total_predictions = |predictions|
//!   fake_count / real_count = predictions grouped by label
//!   accuracy_pct   = 100 × |feedback where correct| / |feedback|
//!   average_rating = Σ rating / |feedback with a rating|
//!
//! Empty denominators produce 0.0 so a scrape always has a value to report.
//! The snapshot is recomputed in full on every call; the tallies below are
//! the only place counting happens.

use std::sync::Arc;

use futures::TryStreamExt;
use serde::Serialize;

use crate::error::VerityError;
use crate::models::{FeedbackEvent, Label, PredictionEvent};
use crate::store::EventStore;

/// Derived statistics. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateSnapshot {
    pub total_predictions: u64,
    pub fake_count: u64,
    pub real_count: u64,
    pub feedback_count: u64,
    pub correct_count: u64,
    pub rated_count: u64,
    pub accuracy_pct: f64,
    pub average_rating: f64,
}

/// Running label counts over a prediction scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionTally {
    pub fake: u64,
    pub real: u64,
}

impl PredictionTally {
    pub fn observe(&mut self, prediction: &PredictionEvent) {
        self.observe_label(prediction.label);
    }

    pub fn observe_label(&mut self, label: Label) {
        match label {
            Label::Fake => self.fake += 1,
            Label::Real => self.real += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.fake + self.real
    }
}

/// Running correctness and rating sums over a feedback scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackTally {
    pub count: u64,
    pub correct: u64,
    pub rated: u64,
    pub rating_sum: u64,
}

impl FeedbackTally {
    pub fn observe(&mut self, feedback: &FeedbackEvent) {
        self.observe_parts(feedback.correct, feedback.rating);
    }

    pub fn observe_parts(&mut self, correct: bool, rating: Option<u8>) {
        self.count += 1;
        if correct {
            self.correct += 1;
        }
        if let Some(r) = rating {
            self.rated += 1;
            self.rating_sum += u64::from(r);
        }
    }

    pub fn accuracy_pct(&self) -> f64 {
        ratio(self.correct, self.count) * 100.0
    }

    pub fn average_rating(&self) -> f64 {
        ratio(self.rating_sum, self.rated)
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl AggregateSnapshot {
    pub fn from_tallies(predictions: PredictionTally, feedback: FeedbackTally) -> Self {
        Self {
            total_predictions: predictions.total(),
            fake_count: predictions.fake,
            real_count: predictions.real,
            feedback_count: feedback.count,
            correct_count: feedback.correct,
            rated_count: feedback.rated,
            accuracy_pct: feedback.accuracy_pct(),
            average_rating: feedback.average_rating(),
        }
    }
}

/// Computes `AggregateSnapshot`s on demand from an event store.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn EventStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Full scan of both event sets. Fails only if the store fails mid-scan.
    pub async fn snapshot(&self) -> Result<AggregateSnapshot, VerityError> {
        let predictions = self
            .store
            .predictions()
            .try_fold(PredictionTally::default(), |mut tally, p| async move {
                tally.observe(&p);
                Ok(tally)
            })
            .await?;

        let feedback = self
            .store
            .feedback()
            .try_fold(FeedbackTally::default(), |mut tally, f| async move {
                tally.observe(&f);
                Ok(tally)
            })
            .await?;

        Ok(AggregateSnapshot::from_tallies(predictions, feedback))
    }
}
