use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] estate_sync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No batch input provided")]
    EmptyInput,
    #[error("Invalid batch on line {line}: {message}")]
    InvalidBatchLine { line: usize, message: String },
    #[error("Either --approve or --reject <REASON> is required")]
    MissingDecision,
}
