pub mod feedback;
pub mod label;
pub mod prediction;

pub use feedback::{feedback_type, FeedbackEvent, NewFeedback, MAX_RATING, MIN_RATING};
pub use label::Label;
pub use prediction::{NewPrediction, PredictionEvent};

/// Identifier assigned by the event store. Monotonic per store.
pub type PredictionId = i64;
