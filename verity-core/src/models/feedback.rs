use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PredictionId;
use crate::error::VerityError;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A user's judgement of a stored prediction. Several may exist per prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub id: i64,
    pub prediction_id: PredictionId,
    pub correct: bool,
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn feedback_type(&self) -> &'static str {
        feedback_type(self.correct)
    }
}

/// Label value used for `fakenews_feedback_total{feedback_type}`.
pub fn feedback_type(correct: bool) -> &'static str {
    if correct {
        "correct"
    } else {
        "incorrect"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewFeedback {
    pub prediction_id: PredictionId,
    pub correct: bool,
    #[serde(default)]
    pub rating: Option<i64>,
}

impl NewFeedback {
    pub fn new(prediction_id: PredictionId, correct: bool, rating: Option<i64>) -> Self {
        Self {
            prediction_id,
            correct,
            rating,
        }
    }

    /// Checks the rating range and narrows it to its stored width.
    pub fn validated_rating(&self) -> Result<Option<u8>, VerityError> {
        match self.rating {
            None => Ok(None),
            Some(r) if (MIN_RATING as i64..=MAX_RATING as i64).contains(&r) => Ok(Some(r as u8)),
            Some(r) => Err(VerityError::validation(format!(
                "rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, r
            ))),
        }
    }
}
