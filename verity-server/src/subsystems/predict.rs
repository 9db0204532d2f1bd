//! Prediction subsystem: classify an article and record the verdict
//!
//! Flow: validate input → call the model server (timed) → append a
//! `PredictionEvent` → bump the prediction counter and latency histogram.
//! Metrics are only touched once the event is stored.

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use verity_core::{
    Classifier, ClassifierError, EventStore, Label, NewPrediction, PredictionId, VerityError,
};

use crate::metrics::Metrics;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Store(#[from] VerityError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictOutcome {
    pub id: PredictionId,
    pub prediction: Label,
    /// Absent when the model produced no probability.
    pub confidence: Option<f64>,
    pub latency_seconds: f64,
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub async fn predict(
    store: &dyn EventStore,
    classifier: &dyn Classifier,
    metrics: &Metrics,
    title: String,
    text: String,
) -> Result<PredictOutcome, PredictError> {
    if title.trim().is_empty() && text.trim().is_empty() {
        return Err(PredictError::InvalidInput(
            "title or text must be non-empty".to_string(),
        ));
    }

    let start = Instant::now();
    let classification = classifier.classify(&title, &text).await?;
    let elapsed = start.elapsed().as_secs_f64();
    let latency = round3(elapsed);

    let id = store
        .record_prediction(NewPrediction {
            title,
            text,
            label: classification.label,
            confidence: classification.confidence,
            latency_seconds: Some(latency),
        })
        .await?;

    metrics.observe_prediction(classification.label, elapsed);

    tracing::info!(
        prediction_id = id,
        label = %classification.label,
        confidence = classification.confidence,
        latency_seconds = latency,
        classifier = classifier.name(),
        "Prediction recorded"
    );

    let confidence = if classification.confidence > 0.0 {
        Some(round3(classification.confidence))
    } else {
        None
    };

    Ok(PredictOutcome {
        id,
        prediction: classification.label,
        confidence,
        latency_seconds: latency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use verity_core::{AggregateSnapshot, Aggregator, Classification, MemoryEventStore};

    struct FixedClassifier(Classification);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _title: &str,
            _text: &str,
        ) -> Result<Classification, ClassifierError> {
            Ok(self.0)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DownClassifier;

    #[async_trait]
    impl Classifier for DownClassifier {
        async fn classify(
            &self,
            _title: &str,
            _text: &str,
        ) -> Result<Classification, ClassifierError> {
            Err(ClassifierError::RetryExhausted { attempts: 3 })
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn fixed(label: Label, confidence: f64) -> FixedClassifier {
        FixedClassifier(Classification { label, confidence })
    }

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.123456), 0.123);
        assert_eq!(round3(0.9996), 1.0);
        assert_eq!(round3(0.0), 0.0);
    }

    #[tokio::test]
    async fn test_predict_records_event() {
        let store = MemoryEventStore::new();
        let metrics = Metrics::new().unwrap();
        let outcome = predict(
            &store,
            &fixed(Label::Fake, 0.87654),
            &metrics,
            "Title".to_string(),
            "Body".to_string(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.prediction, Label::Fake);
        assert_eq!(outcome.confidence, Some(0.877));

        let stored = store.get_prediction(outcome.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Title");
        assert_eq!(stored.label, Label::Fake);
        assert_eq!(stored.latency_seconds, Some(outcome.latency_seconds));
    }

    #[tokio::test]
    async fn test_zero_confidence_reported_as_none() {
        let store = MemoryEventStore::new();
        let metrics = Metrics::new().unwrap();
        let outcome = predict(
            &store,
            &fixed(Label::Real, 0.0),
            &metrics,
            "t".to_string(),
            "x".to_string(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.confidence, None);
    }

    #[tokio::test]
    async fn test_blank_input_rejected_without_write() {
        let store = std::sync::Arc::new(MemoryEventStore::new());
        let metrics = Metrics::new().unwrap();
        let err = predict(
            store.as_ref(),
            &fixed(Label::Real, 0.5),
            &metrics,
            "  ".to_string(),
            "".to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PredictError::InvalidInput(_)));

        let snap = Aggregator::new(store).snapshot().await.unwrap();
        assert_eq!(snap, AggregateSnapshot::default());
    }

    #[tokio::test]
    async fn test_classifier_failure_writes_nothing() {
        let store = std::sync::Arc::new(MemoryEventStore::new());
        let metrics = Metrics::new().unwrap();
        let err = predict(
            store.as_ref(),
            &DownClassifier,
            &metrics,
            "t".to_string(),
            "x".to_string(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PredictError::Classifier(_)));

        let snap = Aggregator::new(store).snapshot().await.unwrap();
        assert_eq!(snap.total_predictions, 0);
    }
}
