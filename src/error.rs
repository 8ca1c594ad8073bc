use std::path::PathBuf;

/// Errors raised while wiring up or feeding the earnings engine.
///
/// Bad completed-test data is never an error: it is dropped or corrected
/// during normalization. Only structural misconfiguration and unreadable
/// inputs surface here.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The legacy schedule does not define a single period.
    #[error("arc start day schedule has no periods")]
    EmptyArcSchedule,

    /// A legacy period starts before the study does.
    #[error("arc start day for period {index} is negative ({offset})")]
    NegativeArcOffset { index: usize, offset: i64 },

    /// A legacy period starts too far after the study to fall on a calendar date.
    #[error("arc start day for period {index} is {offset}, past the limit of {max} days")]
    ArcOffsetOutOfRange { index: usize, offset: i64, max: i64 },

    /// A study burst without sessions has no start date.
    #[error("study burst {index} has no scheduled sessions")]
    EmptyStudyBurst { index: usize },

    #[error("invalid dollar amount: {0}")]
    InvalidAmount(String),

    #[error("unsupported completed test file: {}", .0.display())]
    UnsupportedInput(PathBuf),

    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
