pub mod aggregate;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use aggregate::{AggregateSnapshot, Aggregator, FeedbackTally, PredictionTally};
pub use classifier::{
    Classification, Classifier, ClassifierConfig, ClassifierError, HttpClassifier,
};
pub use config::VerityConfig;
pub use error::VerityError;
pub use models::{FeedbackEvent, Label, NewFeedback, NewPrediction, PredictionEvent, PredictionId};
pub use store::{EventStore, MemoryEventStore, PgEventStore};
