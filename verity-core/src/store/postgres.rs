use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use sqlx::PgPool;

use super::{EventStore, EventStream};
use crate::error::VerityError;
use crate::models::{
    FeedbackEvent, Label, NewFeedback, NewPrediction, PredictionEvent, PredictionId,
};

const SELECT_PREDICTIONS: &str = r#"
    SELECT id, title, text, label, confidence, latency_seconds, created_at
    FROM predictions
    ORDER BY id
"#;

const SELECT_FEEDBACK: &str = r#"
    SELECT id, prediction_id, correct, rating, created_at
    FROM feedback
    ORDER BY id
"#;

#[derive(Debug, sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    title: String,
    text: String,
    label: String,
    confidence: f64,
    latency_seconds: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for PredictionEvent {
    type Error = VerityError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        let label: Label = row
            .label
            .parse()
            .map_err(|e| VerityError::Storage(sqlx::Error::Decode(Box::new(e))))?;
        Ok(PredictionEvent {
            id: row.id,
            title: row.title,
            text: row.text,
            label,
            confidence: row.confidence,
            latency_seconds: row.latency_seconds,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeedbackRow {
    id: i64,
    prediction_id: i64,
    correct: bool,
    rating: Option<i16>,
    created_at: DateTime<Utc>,
}

impl From<FeedbackRow> for FeedbackEvent {
    fn from(row: FeedbackRow) -> Self {
        FeedbackEvent {
            id: row.id,
            prediction_id: row.prediction_id,
            correct: row.correct,
            // The column CHECK keeps ratings within 1..=5.
            rating: row.rating.map(|r| r as u8),
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed event store. Tables are created by `db::ensure_schema`.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn record_prediction(
        &self,
        prediction: NewPrediction,
    ) -> Result<PredictionId, VerityError> {
        prediction.validate()?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO predictions (title, text, label, confidence, latency_seconds)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&prediction.title)
        .bind(&prediction.text)
        .bind(prediction.label.as_str())
        .bind(prediction.confidence)
        .bind(prediction.latency_seconds)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(prediction_id = id, label = %prediction.label, "Recorded prediction");
        Ok(id)
    }

    async fn record_feedback(&self, feedback: NewFeedback) -> Result<FeedbackEvent, VerityError> {
        let rating = feedback.validated_rating()?;

        let mut tx = self.pool.begin().await?;

        // FOR SHARE keeps the referenced row stable until the insert commits.
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM predictions WHERE id = $1 FOR SHARE")
                .bind(feedback.prediction_id)
                .fetch_optional(&mut *tx)
                .await?;

        if exists.is_none() {
            return Err(VerityError::NotFound {
                prediction_id: feedback.prediction_id,
            });
        }

        let row: FeedbackRow = sqlx::query_as(
            r#"
            INSERT INTO feedback (prediction_id, correct, rating)
            VALUES ($1, $2, $3)
            RETURNING id, prediction_id, correct, rating, created_at
            "#,
        )
        .bind(feedback.prediction_id)
        .bind(feedback.correct)
        .bind(rating.map(i16::from))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            prediction_id = feedback.prediction_id,
            feedback_id = row.id,
            "Recorded feedback"
        );
        Ok(row.into())
    }

    async fn get_prediction(
        &self,
        id: PredictionId,
    ) -> Result<Option<PredictionEvent>, VerityError> {
        let row: Option<PredictionRow> = sqlx::query_as(
            r#"
            SELECT id, title, text, label, confidence, latency_seconds, created_at
            FROM predictions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PredictionEvent::try_from).transpose()
    }

    fn predictions(&self) -> EventStream<'_, PredictionEvent> {
        sqlx::query_as::<_, PredictionRow>(SELECT_PREDICTIONS)
            .fetch(&self.pool)
            .map(|row| row.map_err(VerityError::from).and_then(PredictionEvent::try_from))
            .boxed()
    }

    fn feedback(&self) -> EventStream<'_, FeedbackEvent> {
        sqlx::query_as::<_, FeedbackRow>(SELECT_FEEDBACK)
            .fetch(&self.pool)
            .map(|row| row.map(FeedbackEvent::from).map_err(VerityError::from))
            .boxed()
    }

    async fn health(&self) -> Result<String, VerityError> {
        Ok(crate::db::health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
