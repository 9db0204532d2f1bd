use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Label, PredictionId};
use crate::error::VerityError;

/// A stored classifier verdict. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEvent {
    pub id: PredictionId,
    pub title: String,
    pub text: String,
    pub label: Label,
    pub confidence: f64,
    pub latency_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub title: String,
    pub text: String,
    pub label: Label,
    pub confidence: f64,
    pub latency_seconds: Option<f64>,
}

impl NewPrediction {
    pub fn new(label: Label, confidence: f64) -> Self {
        Self {
            title: String::new(),
            text: String::new(),
            label,
            confidence,
            latency_seconds: None,
        }
    }

    pub fn validate(&self) -> Result<(), VerityError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(VerityError::validation(format!(
                "confidence must be within [0, 1], got {}",
                self.confidence
            )));
        }
        if let Some(latency) = self.latency_seconds {
            if !latency.is_finite() || latency < 0.0 {
                return Err(VerityError::validation(format!(
                    "latency_seconds must be non-negative, got {}",
                    latency
                )));
            }
        }
        Ok(())
    }
}
