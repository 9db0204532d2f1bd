use verity_core::{EventStore, FeedbackEvent, NewFeedback, VerityError};

use crate::metrics::Metrics;

/// Append feedback and count it. Rejected feedback leaves the counters alone.
pub async fn submit_feedback(
    store: &dyn EventStore,
    metrics: &Metrics,
    feedback: NewFeedback,
) -> Result<FeedbackEvent, VerityError> {
    let event = store.record_feedback(feedback).await?;
    metrics.observe_feedback(event.correct);

    tracing::info!(
        prediction_id = event.prediction_id,
        feedback_id = event.id,
        feedback_type = event.feedback_type(),
        rating = ?event.rating,
        "Feedback recorded"
    );

    Ok(event)
}
