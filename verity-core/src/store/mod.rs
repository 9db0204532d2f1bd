//! Event store: append-only persistence for predictions and feedback
//!
//! `EventStore` is the seam between the service and its persistence layer.
//! Two backends ship with the crate:
//! - **Postgres** (`PgEventStore`): durable, used in deployment
//! - **Memory** (`MemoryEventStore`): process-local, used by tests and demos
//!
//! Scans are exposed as streams so the aggregator never has to hold a whole
//! table in memory. Every call to `predictions()` / `feedback()` begins a new
//! scan in insertion order.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::VerityError;
use crate::models::{FeedbackEvent, NewFeedback, NewPrediction, PredictionEvent, PredictionId};

pub mod memory;
pub mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Finite, restartable scan over stored events.
pub type EventStream<'a, T> = BoxStream<'a, Result<T, VerityError>>;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a prediction and return its freshly assigned id.
    async fn record_prediction(
        &self,
        prediction: NewPrediction,
    ) -> Result<PredictionId, VerityError>;

    /// Append feedback for an existing prediction.
    ///
    /// Fails with `Validation` for a rating outside 1..=5 and with `NotFound`
    /// when the prediction does not exist. Neither case writes anything.
    async fn record_feedback(&self, feedback: NewFeedback) -> Result<FeedbackEvent, VerityError>;

    async fn get_prediction(&self, id: PredictionId)
        -> Result<Option<PredictionEvent>, VerityError>;

    /// All predictions in insertion order.
    fn predictions(&self) -> EventStream<'_, PredictionEvent>;

    /// All feedback in insertion order.
    fn feedback(&self) -> EventStream<'_, FeedbackEvent>;

    /// Short backend description, or an error when the backend is unreachable.
    async fn health(&self) -> Result<String, VerityError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}
