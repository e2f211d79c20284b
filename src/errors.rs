use thiserror::Error;

/// Boundary error type, mirroring the `GPError`/`GPResult` shape: one
/// `thiserror` enum covering every fallible crossing of the crate boundary.
/// Internal, non-exceptional structural outcomes (idempotent disconnect,
/// silent acyclic-violating connect) are modeled as `Option`/no-ops, not as
/// `Err` variants here — see `src/graph/mod.rs`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("unsupported mutation: {0}")]
    UnsupportedMutation(String),

    #[error("unknown activation: {0}")]
    UnknownActivation(String),

    #[error("unknown optimizer: {0}")]
    UnknownOptimizer(String),

    #[error("unknown cost: {0}")]
    UnknownCost(String),

    #[error("lookahead optimizer cannot wrap another lookahead optimizer")]
    NestedLookahead,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
