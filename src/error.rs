use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdequacyError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid Configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    #[error("more than one tree in the sampled state is not supported ('{first}' and '{second}')")]
    UnsupportedMultiTreeState { first: String, second: String },

    #[error("could not find an entry for '{0}' in the trace log")]
    MissingTraceColumn(String),

    #[error("requested {requested} replicates but only {available} {kind} samples remain after burn-in")]
    InsufficientSamples {
        requested: usize,
        available: usize,
        kind: &'static str,
    },
}

pub type PpResult<T> = Result<T, AdequacyError>;
