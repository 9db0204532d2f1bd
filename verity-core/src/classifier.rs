//! Inference boundary: client for the external model server
//!
//! The ensemble model (TF-IDF + LogisticRegression/RandomForest/XGBoost soft
//! voting) is served out of process. This module only knows its HTTP contract:
//!
//! `POST {url}/predict` with `{"text": "<title> <text>"}` answers
//! `{"label": "fake", "confidence": 0.93}`. `confidence` may be null when
//! the model cannot produce probabilities; that is reported as 0.0.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ClassifierSettings;
use crate::models::Label;

/// Abstraction over whatever produces REAL/FAKE verdicts.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, title: &str, text: &str) -> Result<Classification, ClassifierError>;

    /// Classifier name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub label: Label,
    pub confidence: f64,
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model server error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed model server response: {0}")]
    InvalidResponse(String),

    #[error("Model server returned unknown label '{0}'")]
    InvalidLabel(String),

    #[error("Model server returned confidence {0} outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

impl ClassifierError {
    /// Transport failures, throttling and 5xx answers are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Http(_) => true,
            ClassifierError::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// Model-server client configuration
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl From<&ClassifierSettings> for ClassifierConfig {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            base_url: settings.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        }
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    label: String,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: Option<String>,
}

/// The text the model was trained on: title and body joined by one space.
pub fn model_input(title: &str, text: &str) -> String {
    format!("{} {}", title, text)
}

/// HTTP client for the model server, with retry on transport and 5xx failures.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: Client,
    config: ClassifierConfig,
}

impl HttpClassifier {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub async fn classify_text(&self, input: &str) -> Result<Classification, ClassifierError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.config.max_retries);

        let result = RetryIf::spawn(
            retry_strategy,
            || self.classify_once(input),
            ClassifierError::is_transient,
        )
        .await;

        match result {
            Ok(c) => Ok(c),
            Err(e) if e.is_transient() => {
                let attempts = self.config.max_retries + 1;
                tracing::error!(
                    attempts = attempts,
                    error = %e,
                    "All model server attempts failed"
                );
                Err(ClassifierError::RetryExhausted { attempts })
            }
            Err(e) => Err(e),
        }
    }

    async fn classify_once(&self, input: &str) -> Result<Classification, ClassifierError> {
        let url = format!("{}/predict", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&PredictRequest { text: input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.detail)
                .unwrap_or(body);
            tracing::warn!(code = status.as_u16(), message = %message, "Model server error");
            return Err(ClassifierError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: PredictResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;
        let label: Label = parsed
            .label
            .parse()
            .map_err(|_| ClassifierError::InvalidLabel(parsed.label.clone()))?;
        let confidence = parsed.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifierError::InvalidConfidence(confidence));
        }

        Ok(Classification { label, confidence })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, title: &str, text: &str) -> Result<Classification, ClassifierError> {
        self.classify_text(&model_input(title, text)).await
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> ClassifierConfig {
        ClassifierConfig {
            base_url,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_classify_posts_joined_text() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/predict"))
            .and(body_json(serde_json::json!({ "text": "Headline Body text" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "fake",
                "confidence": 0.91
            })))
            .mount(&mock_server)
            .await;

        let result = client.classify("Headline", "Body text").await.unwrap();
        assert_eq!(result.label, Label::Fake);
        assert!((result.confidence - 0.91).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_missing_confidence_becomes_zero() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "REAL",
                "confidence": null
            })))
            .mount(&mock_server)
            .await;

        let result = client.classify("t", "x").await.unwrap();
        assert_eq!(result.label, Label::Real);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_retries_on_503_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "detail": "model loading"
            })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "real",
                "confidence": 0.7
            })))
            .mount(&mock_server)
            .await;

        let result = client.classify("t", "x").await;
        assert!(result.is_ok(), "Expected success after retry: {:?}", result.err());
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_retries() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        match client.classify("t", "x").await {
            Err(ClassifierError::RetryExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_label_is_reported() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "label": "satire",
                "confidence": 0.5
            })))
            .mount(&mock_server)
            .await;

        match client.classify("t", "x").await {
            Err(ClassifierError::InvalidLabel(l)) => assert_eq!(l, "satire"),
            other => panic!("Expected InvalidLabel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "detail": "text too short"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.classify("t", "x").await {
            Err(ClassifierError::Api { code, message }) => {
                assert_eq!(code, 422);
                assert_eq!(message, "text too short");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_not_retried() {
        let mock_server = MockServer::start().await;
        let client = HttpClassifier::new(test_config(mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.classify("t", "x").await {
            Err(e @ ClassifierError::InvalidResponse(_)) => assert!(!e.is_transient()),
            other => panic!("Expected InvalidResponse, got {:?}", other),
        }
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let settings = ClassifierSettings {
            url: "http://model:8500/".to_string(),
            timeout_seconds: 3,
            max_retries: 1,
            retry_delay_ms: 5,
        };
        let cfg = ClassifierConfig::from(&settings);
        assert_eq!(cfg.base_url, "http://model:8500");
        assert_eq!(cfg.timeout, Duration::from_secs(3));
    }
}
