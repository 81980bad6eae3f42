use thiserror::Error;

/// Errors surfaced by the engine's public entry points.
///
/// `NumericFailure` and `BudgetExceeded` from the wider error taxonomy are
/// deliberately absent here: IRR non-convergence is carried as data on
/// [`crate::economics::IrrOutcome`] and degradation-budget violations as
/// data on [`crate::degradation::DegradationStatus`], never thrown. Only
/// violations that make the request itself impossible to evaluate abort
/// the call.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
