use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckError {
    /// Options that cannot be combined, e.g. a scheduler in qualitative mode.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Caller-supplied data (hints, vectors) violates its contract.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("invalid property: {0}")]
    InvalidProperty(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    /// A critical requirement of the min-max solver is still enabled.
    #[error("solver requirements not checked: {0}")]
    UncheckedRequirement(String),

    #[error("linear program could not be solved: {0}")]
    Lp(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),
}

pub type Result<T> = std::result::Result<T, CheckError>;

impl From<minilp::Error> for CheckError {
    fn from(e: minilp::Error) -> Self {
        CheckError::Lp(e.to_string())
    }
}
