//! Error taxonomy shared by every search component.

use thiserror::Error;

/// Failures raised while initializing bounds, backing up values or solving
/// the per-step linear programs.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The world returned something the search cannot work with.
    #[error("world contract violated in `{operation}`: {detail}")]
    World {
        operation: &'static str,
        detail: String,
    },

    #[error("no action available at stage {stage}")]
    EmptyActionSpace { stage: usize },

    /// Infeasible, unbounded or otherwise failed LP solve.
    #[error("linear program failed: {0}")]
    Solver(String),

    #[error("unknown LP variable `{0}`")]
    UnknownVariable(String),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn world(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::World {
            operation,
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = SearchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::SearchError;

    #[test]
    fn world_errors_name_the_operation() {
        let err = SearchError::world("next_state", "no successor");
        assert_eq!(
            err.to_string(),
            "world contract violated in `next_state`: no successor"
        );
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SearchError = io.into();
        assert!(matches!(err, SearchError::Io(_)));
    }
}
