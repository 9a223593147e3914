//! Error type shared by the training engine.
//! Bad inputs and malformed models come back as `Error`.
//! Mismatched dimensions between internal tables are programming errors and panic instead.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid option or option combination, detected before training starts.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("context window length must be odd, got {0}")]
    EvenWindowLength(usize),
    /// Input whose shape does not fit the model, e.g. a profile column of wrong size.
    #[error("dimension mismatch: {0}")]
    Dimension(String),
    #[error("empty training subject")]
    EmptySubject,
    /// A state carries forward mass at `position` but has nowhere to go.
    #[error("state {state} has no out-transitions but is reached at position {position}")]
    DeadEndState { state: usize, position: usize },
    #[error("transition {from}->{to} is not mirrored between out- and in-transitions")]
    AsymmetricTransitions { from: usize, to: usize },
    #[error("state {state} lost every out-transition")]
    EmptyTransitions { state: usize },
    #[error("subject has zero likelihood at position {position}")]
    ZeroLikelihood { position: usize },
    #[error("accumulated prior mass is zero")]
    DegeneratePriors,
    #[error("accumulated profile of state {state} is zero at column {column}")]
    DegenerateProfile { state: usize, column: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
