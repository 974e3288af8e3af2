use thiserror::Error;

/// Errors surfaced by the solver's fallible entry points.
///
/// `InvalidArgument` is raised before any table is touched, so the engine
/// state is unchanged when it comes back. `LogicError` means an internal
/// invariant broke mid-iteration; partially written tables are not rolled
/// back and the engine should be discarded.
#[derive(Debug, Error)]
pub enum CfrError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("logic error: {0}")]
    LogicError(String),

    /// A regret table and a policy disagree on their action keys.
    #[error("inconsistent action keys between regret table and policy")]
    InconsistentKeys,
}
