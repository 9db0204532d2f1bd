use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;

use super::{EventStore, EventStream};
use crate::error::VerityError;
use crate::models::{FeedbackEvent, NewFeedback, NewPrediction, PredictionEvent, PredictionId};

#[derive(Debug, Default)]
struct Events {
    predictions: Vec<PredictionEvent>,
    feedback: Vec<FeedbackEvent>,
}

/// Process-local store. Ids start at 1 and equal the insertion position.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Events>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn record_prediction(
        &self,
        prediction: NewPrediction,
    ) -> Result<PredictionId, VerityError> {
        prediction.validate()?;

        let mut events = self.events.write().await;
        let id = events.predictions.len() as PredictionId + 1;
        events.predictions.push(PredictionEvent {
            id,
            title: prediction.title,
            text: prediction.text,
            label: prediction.label,
            confidence: prediction.confidence,
            latency_seconds: prediction.latency_seconds,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn record_feedback(&self, feedback: NewFeedback) -> Result<FeedbackEvent, VerityError> {
        let rating = feedback.validated_rating()?;

        let mut events = self.events.write().await;
        if !events.predictions.iter().any(|p| p.id == feedback.prediction_id) {
            return Err(VerityError::NotFound {
                prediction_id: feedback.prediction_id,
            });
        }

        let event = FeedbackEvent {
            id: events.feedback.len() as i64 + 1,
            prediction_id: feedback.prediction_id,
            correct: feedback.correct,
            rating,
            created_at: Utc::now(),
        };
        events.feedback.push(event.clone());
        Ok(event)
    }

    async fn get_prediction(
        &self,
        id: PredictionId,
    ) -> Result<Option<PredictionEvent>, VerityError> {
        let events = self.events.read().await;
        Ok(events.predictions.iter().find(|p| p.id == id).cloned())
    }

    fn predictions(&self) -> EventStream<'_, PredictionEvent> {
        // The copy is taken on first poll, so the scan sees everything
        // committed before it started.
        stream::once(async move { self.events.read().await.predictions.clone() })
            .flat_map(|snapshot| stream::iter(snapshot.into_iter().map(Ok)))
            .boxed()
    }

    fn feedback(&self) -> EventStream<'_, FeedbackEvent> {
        stream::once(async move { self.events.read().await.feedback.clone() })
            .flat_map(|snapshot| stream::iter(snapshot.into_iter().map(Ok)))
            .boxed()
    }

    async fn health(&self) -> Result<String, VerityError> {
        let events = self.events.read().await;
        Ok(format!(
            "memory ({} predictions, {} feedback)",
            events.predictions.len(),
            events.feedback.len()
        ))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
