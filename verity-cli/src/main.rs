//! verity-cli: command-line client for the Verity prediction service
//!
//! # Subcommands
//! - `predict --title <t> --text <x> [--json]`      : classify an article
//! - `feedback <id> (--correct|--incorrect) [--rating N]`: rate a prediction
//! - `stats [--json]`                                : aggregate statistics
//! - `status`                                        : server health

use clap::{ArgGroup, Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "verity-cli",
    version,
    about = "Verity fake-news detector prediction and feedback client"
)]
struct Cli {
    /// Verity HTTP server URL (overrides VERITY_HTTP_URL env var)
    #[arg(long, env = "VERITY_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Classify a news article as REAL or FAKE
    Predict {
        /// Article headline
        #[arg(long, default_value = "")]
        title: String,

        /// Article body
        #[arg(long)]
        text: String,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Record whether a prediction was right
    #[command(group(ArgGroup::new("verdict").required(true).args(["correct", "incorrect"])))]
    Feedback {
        /// Prediction id returned by `predict`
        prediction_id: i64,

        /// The prediction was correct
        #[arg(long)]
        correct: bool,

        /// The prediction was wrong
        #[arg(long)]
        incorrect: bool,

        /// Optional 1-5 rating
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=5))]
        rating: Option<i64>,
    },

    /// Show aggregate statistics
    Stats {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show Verity server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictResponse {
    pub id: i64,
    pub prediction: String,
    pub confidence: Option<f64>,
    pub latency_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub total_predictions: u64,
    pub fake_count: u64,
    pub real_count: u64,
    pub feedback_count: u64,
    pub accuracy_pct: f64,
    pub average_rating: f64,
}

/// One-line human summary of a prediction.
pub fn format_prediction(p: &PredictResponse) -> String {
    let confidence = match p.confidence {
        Some(c) => format!("{:.1}%", c * 100.0),
        None => "n/a".to_string(),
    };
    format!(
        "#{} {} (confidence {}, {:.3}s)",
        p.id, p.prediction, confidence, p.latency_seconds
    )
}

/// Multi-line human summary of the aggregate snapshot.
pub fn format_stats(s: &StatsResponse) -> String {
    format!(
        "Predictions:    {} ({} fake, {} real)\n\
         Feedback:       {}\n\
         Accuracy:       {:.1}%\n\
         Average rating: {:.2}",
        s.total_predictions,
        s.fake_count,
        s.real_count,
        s.feedback_count,
        s.accuracy_pct,
        s.average_rating
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send the request and return the JSON body, exiting on transport or HTTP errors.
fn send_json(req: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("verity-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        let msg = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("verity-cli: server returned {}: {}", status, msg);
        std::process::exit(1);
    }
    body
}

fn do_predict(server: &str, title: &str, text: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/predict", server);
    let req = client(30)?
        .post(&url)
        .json(&serde_json::json!({ "title": title, "text": text }));
    let body = send_json(req, &url);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let parsed: PredictResponse = serde_json::from_value(body)?;
        println!("{}", format_prediction(&parsed));
    }
    Ok(())
}

fn do_feedback(
    server: &str,
    prediction_id: i64,
    correct: bool,
    rating: Option<i64>,
) -> anyhow::Result<()> {
    let url = format!("{}/feedback", server);
    let req = client(10)?.post(&url).json(&serde_json::json!({
        "prediction_id": prediction_id,
        "correct": correct,
        "rating": rating,
    }));
    let body = send_json(req, &url);
    println!(
        "Feedback #{} recorded for prediction #{}",
        body["id"], prediction_id
    );
    Ok(())
}

fn do_stats(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/stats", server);
    let body = send_json(client(10)?.get(&url), &url);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let parsed: StatsResponse = serde_json::from_value(body)?;
        println!("{}", format_stats(&parsed));
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Verity server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:         {}", body["store"].as_str().unwrap_or("?"));
            println!("Store detail:  {}", body["store_detail"].as_str().unwrap_or("?"));
            println!("Classifier:    {}", body["classifier"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("verity-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("verity-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Predict { title, text, json } => do_predict(&server, &title, &text, json),
        Commands::Feedback {
            prediction_id,
            correct,
            incorrect: _,
            rating,
        } => do_feedback(&server, prediction_id, correct, rating),
        Commands::Stats { json } => do_stats(&server, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("verity-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prediction_with_confidence() {
        let p = PredictResponse {
            id: 12,
            prediction: "FAKE".to_string(),
            confidence: Some(0.913),
            latency_seconds: 0.042,
        };
        assert_eq!(format_prediction(&p), "#12 FAKE (confidence 91.3%, 0.042s)");
    }

    #[test]
    fn test_format_prediction_without_confidence() {
        let p = PredictResponse {
            id: 1,
            prediction: "REAL".to_string(),
            confidence: None,
            latency_seconds: 0.5,
        };
        assert!(format_prediction(&p).contains("confidence n/a"));
    }

    #[test]
    fn test_stats_response_parses_server_snapshot() {
        let body = serde_json::json!({
            "total_predictions": 3,
            "fake_count": 2,
            "real_count": 1,
            "feedback_count": 2,
            "correct_count": 1,
            "rated_count": 2,
            "accuracy_pct": 50.0,
            "average_rating": 3.5
        });
        let stats: StatsResponse = serde_json::from_value(body).unwrap();
        let text = format_stats(&stats);
        assert!(text.contains("3 (2 fake, 1 real)"));
        assert!(text.contains("Accuracy:       50.0%"));
        assert!(text.contains("Average rating: 3.50"));
    }

    #[test]
    fn test_feedback_requires_verdict() {
        let parsed = Cli::try_parse_from(["verity-cli", "feedback", "3", "--rating", "4"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_feedback_rating_range_enforced() {
        let parsed =
            Cli::try_parse_from(["verity-cli", "feedback", "3", "--correct", "--rating", "6"]);
        assert!(parsed.is_err());

        let parsed =
            Cli::try_parse_from(["verity-cli", "feedback", "3", "--incorrect", "--rating", "1"])
                .unwrap();
        match parsed.command {
            Commands::Feedback {
                prediction_id,
                correct,
                incorrect,
                rating,
            } => {
                assert_eq!(prediction_id, 3);
                assert!(!correct);
                assert!(incorrect);
                assert_eq!(rating, Some(1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_verdict_flags_conflict() {
        let parsed =
            Cli::try_parse_from(["verity-cli", "feedback", "3", "--correct", "--incorrect"]);
        assert!(parsed.is_err());
    }
}
