use crate::orchestrator::EncodingState;

pub type DemoResult<T> = Result<T, DemoError>;

#[derive(thiserror::Error, Debug)]
pub enum DemoError {
    /// Default asset could not be loaded. Never escapes the preloader.
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    #[error("encode failed: {0:#}")]
    Encode(anyhow::Error),

    #[error("{op} rejected while {state:?}")]
    InvalidTransition {
        op: &'static str,
        state: EncodingState,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DemoError {
    pub fn invalid(op: &'static str, state: EncodingState) -> Self {
        Self::InvalidTransition { op, state }
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
