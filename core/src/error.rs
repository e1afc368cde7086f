use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid record in '{table}': {detail}")]
    InvalidRecord { table: &'static str, detail: String },

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Statistical validation failed: {0}")]
    Statistics(String),

    #[error("Evaluation run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Rejections raised while validating an `EngineConfig`.
/// Values are never clamped; the offending field is always named.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("weight for '{signal}' is {value}; weights must be finite and >= 0")]
    NegativeWeight { signal: &'static str, value: f64 },

    #[error("signal weights sum to {sum}; they must sum to 1.0")]
    WeightSum { sum: f64 },
}

pub type RiskResult<T> = Result<T, RiskError>;
