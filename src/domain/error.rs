//! Domain error types.
//!
//! Everything here is raised while a run is being assembled. Once the
//! scheduler starts stepping bars, unavailable data is NaN and order
//! rejections are notifications, so no variant below describes a
//! steady-state failure.

/// Top-level error type for linetrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{node} needs at least {expected} input(s), got {got}")]
    TooFewInputs {
        node: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid period for {node}: {reason}")]
    InvalidPeriod { node: &'static str, reason: String },

    #[error("{node}: input {input} does not refer to an existing line")]
    UnknownInput { node: &'static str, input: usize },

    #[error("node {node} has no line named {line:?}")]
    UnknownLine { node: String, line: String },

    #[error("feed {feed} has {got} bars, expected {expected}")]
    FeedMisaligned {
        feed: usize,
        expected: usize,
        got: usize,
    },

    #[error("feed {feed} bar {bar} is dated {got}, expected {expected}")]
    FeedDatesMismatch {
        feed: usize,
        bar: usize,
        expected: chrono::NaiveDate,
        got: chrono::NaiveDate,
    },

    #[error("no data feed added to the run")]
    NoFeeds,

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no data for {name}")]
    NoData { name: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for errors raised while wiring the node graph.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            EngineError::TooFewInputs { .. }
                | EngineError::InvalidPeriod { .. }
                | EngineError::UnknownInput { .. }
                | EngineError::UnknownLine { .. }
        )
    }
}

impl EngineError {
    /// Process exit status used by the CLI for this error family.
    pub fn exit_status(&self) -> u8 {
        match self {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::TooFewInputs { .. }
            | EngineError::InvalidPeriod { .. }
            | EngineError::UnknownInput { .. }
            | EngineError::UnknownLine { .. } => 4,
            EngineError::FeedMisaligned { .. }
            | EngineError::FeedDatesMismatch { .. }
            | EngineError::NoFeeds
            | EngineError::Data { .. }
            | EngineError::NoData { .. } => 5,
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
