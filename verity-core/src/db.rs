use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

const CREATE_PREDICTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS predictions (
    id              BIGSERIAL PRIMARY KEY,
    title           TEXT NOT NULL,
    text            TEXT NOT NULL,
    label           VARCHAR(10) NOT NULL CHECK (label IN ('REAL', 'FAKE')),
    confidence      DOUBLE PRECISION NOT NULL,
    latency_seconds DOUBLE PRECISION,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_FEEDBACK: &str = r#"
CREATE TABLE IF NOT EXISTS feedback (
    id            BIGSERIAL PRIMARY KEY,
    prediction_id BIGINT NOT NULL REFERENCES predictions(id),
    correct       BOOLEAN NOT NULL,
    rating        SMALLINT CHECK (rating BETWEEN 1 AND 5),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_FEEDBACK_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS feedback_prediction_id_idx ON feedback (prediction_id)";

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

/// Create the event tables if they are missing. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in [CREATE_PREDICTIONS, CREATE_FEEDBACK, CREATE_FEEDBACK_INDEX] {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::info!("Database schema ready");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}
