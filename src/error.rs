use thiserror::Error;

#[derive(Error, Debug)]
pub enum DqError {
    #[error("input error: {0}")]
    Input(String),

    #[error("agent '{agent}' failed: {detail}")]
    Agent { agent: String, detail: String },

    #[error("artifact sink error: {0}")]
    Sink(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DqError>;
