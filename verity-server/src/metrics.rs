//! Prometheus metrics for the prediction service
//!
//! Two kinds of values are exported:
//! - **Event metrics** (`fakenews_predictions_total`, `fakenews_feedback_total`,
//!   `fakenews_prediction_latency_seconds`, `fakenews_requests_inprogress`)
//!   are bumped by the request handlers as things happen.
//! - **Derived gauges** (`fakenews_total_predictions`, `fakenews_fake_count`,
//!   `fakenews_real_count`, `fakenews_model_accuracy`, `fakenews_average_rating`)
//!   are copied from an `AggregateSnapshot` right before each scrape is encoded.
//!
//! The registry is owned by `Metrics`; nothing is registered process-wide.
//! Setting the derived gauges and encoding happen under one lock, so every
//! exposition carries a single snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::RwLock;
use verity_core::models::feedback_type;
use verity_core::{AggregateSnapshot, Aggregator, Label};

/// Latency histogram buckets, in seconds.
pub const LATENCY_BUCKETS: [f64; 5] = [0.1, 0.5, 1.0, 2.0, 5.0];

pub struct Metrics {
    registry: Registry,
    predictions_total: IntCounterVec,
    prediction_latency: Histogram,
    feedback_total: IntCounterVec,
    average_rating: Gauge,
    total_predictions: Gauge,
    model_accuracy: Gauge,
    fake_count: Gauge,
    real_count: Gauge,
    requests_inprogress: IntGauge,
    render_lock: Mutex<()>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let predictions_total = IntCounterVec::new(
            Opts::new("fakenews_predictions_total", "Total number of predictions made"),
            &["result"],
        )?;
        let prediction_latency = Histogram::with_opts(
            HistogramOpts::new(
                "fakenews_prediction_latency_seconds",
                "Time spent producing a prediction",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let feedback_total = IntCounterVec::new(
            Opts::new("fakenews_feedback_total", "Total feedback submissions"),
            &["feedback_type"],
        )?;
        let average_rating = Gauge::new(
            "fakenews_average_rating",
            "Mean user rating over all rated feedback",
        )?;
        let total_predictions =
            Gauge::new("fakenews_total_predictions", "Number of stored predictions")?;
        let model_accuracy = Gauge::new(
            "fakenews_model_accuracy",
            "Percentage of feedback marking the prediction correct",
        )?;
        let fake_count = Gauge::new("fakenews_fake_count", "Stored predictions labelled FAKE")?;
        let real_count = Gauge::new("fakenews_real_count", "Stored predictions labelled REAL")?;
        let requests_inprogress = IntGauge::new(
            "fakenews_requests_inprogress",
            "Prediction and feedback requests currently being served",
        )?;

        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(prediction_latency.clone()))?;
        registry.register(Box::new(feedback_total.clone()))?;
        registry.register(Box::new(average_rating.clone()))?;
        registry.register(Box::new(total_predictions.clone()))?;
        registry.register(Box::new(model_accuracy.clone()))?;
        registry.register(Box::new(fake_count.clone()))?;
        registry.register(Box::new(real_count.clone()))?;
        registry.register(Box::new(requests_inprogress.clone()))?;

        // Materialise every label value so a fresh process exports zeros.
        for label in Label::ALL {
            predictions_total.with_label_values(&[label.as_str()]);
        }
        for correct in [true, false] {
            feedback_total.with_label_values(&[feedback_type(correct)]);
        }

        Ok(Self {
            registry,
            predictions_total,
            prediction_latency,
            feedback_total,
            average_rating,
            total_predictions,
            model_accuracy,
            fake_count,
            real_count,
            requests_inprogress,
            render_lock: Mutex::new(()),
        })
    }

    pub fn observe_prediction(&self, label: Label, latency_seconds: f64) {
        self.predictions_total
            .with_label_values(&[label.as_str()])
            .inc();
        self.prediction_latency.observe(latency_seconds);
    }

    pub fn observe_feedback(&self, correct: bool) {
        self.feedback_total
            .with_label_values(&[feedback_type(correct)])
            .inc();
    }

    /// Count a request as in progress until the returned guard is dropped.
    pub fn track_request(&self) -> InProgressGuard {
        self.requests_inprogress.inc();
        InProgressGuard {
            gauge: self.requests_inprogress.clone(),
        }
    }

    pub fn requests_inprogress(&self) -> i64 {
        self.requests_inprogress.get()
    }

    /// Copy `snapshot` into the derived gauges and encode the whole registry.
    pub fn render(&self, snapshot: &AggregateSnapshot) -> Result<String, prometheus::Error> {
        let _render = self
            .render_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        self.total_predictions.set(snapshot.total_predictions as f64);
        self.fake_count.set(snapshot.fake_count as f64);
        self.real_count.set(snapshot.real_count as f64);
        self.model_accuracy.set(snapshot.accuracy_pct);
        self.average_rating.set(snapshot.average_rating);

        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Decrements `fakenews_requests_inprogress` on drop.
pub struct InProgressGuard {
    gauge: IntGauge,
}

impl Drop for InProgressGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Serves scrapes: aggregates, then renders. Keeps the last successful
/// snapshot so a store outage does not blank the derived gauges.
pub struct MetricsExporter {
    aggregator: Aggregator,
    metrics: Arc<Metrics>,
    scans_started: AtomicU64,
    last_good: RwLock<Option<(u64, AggregateSnapshot)>>,
}

impl MetricsExporter {
    pub fn new(aggregator: Aggregator, metrics: Arc<Metrics>) -> Self {
        Self {
            aggregator,
            metrics,
            scans_started: AtomicU64::new(0),
            last_good: RwLock::new(None),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Current snapshot, or the last one that succeeded (zeros if none has).
    pub async fn current_snapshot(&self) -> AggregateSnapshot {
        let scan = self.scans_started.fetch_add(1, Ordering::SeqCst);
        match self.aggregator.snapshot().await {
            Ok(snapshot) => {
                self.remember(scan, snapshot).await;
                snapshot
            }
            Err(e) => {
                let fallback = self.last_good().await;
                tracing::warn!(
                    error = %e,
                    have_previous = fallback.is_some(),
                    "Aggregation failed, exporting last known snapshot"
                );
                fallback.unwrap_or_default()
            }
        }
    }

    /// Last successful snapshot, if any scan has completed.
    pub async fn last_good(&self) -> Option<AggregateSnapshot> {
        self.last_good.read().await.map(|(_, snapshot)| snapshot)
    }

    /// Keep `snapshot` unless a scan that started later has already landed.
    async fn remember(&self, scan: u64, snapshot: AggregateSnapshot) {
        let mut last_good = self.last_good.write().await;
        let superseded = matches!(*last_good, Some((newest, _)) if newest > scan);
        if !superseded {
            *last_good = Some((scan, snapshot));
        }
    }

    pub async fn scrape(&self) -> Result<String, prometheus::Error> {
        let snapshot = self.current_snapshot().await;
        self.metrics.render(&snapshot)
    }
}

#[cfg(test)]
pub(crate) fn sample_value(body: &str, sample: &str) -> Option<f64> {
    body.lines()
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            let (name, value) = l.rsplit_once(' ')?;
            if name == sample {
                value.parse().ok()
            } else {
                None
            }
        })
}
