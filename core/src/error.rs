use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown artifact kind: {0}")]
    UnknownArtifactKind(String),
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),
    #[error("indicator '{0}' is registered more than once")]
    DuplicateIndicator(String),
    #[error("output schema does not contain the reproduction-number indicator '{0}'")]
    MissingRtIndicator(String),
    #[error("unknown region: {0}")]
    UnknownRegion(String),
    #[error("artifact not found at {}", .0.display())]
    MissingArtifact(PathBuf),
    #[error("malformed output table: {0}")]
    MalformedOutputTable(String),
    #[error("statistical sanity violation on '{indicator}': {}", .failures.join("; "))]
    StatisticalSanityViolation {
        indicator: String,
        failures: Vec<String>,
    },
    #[error("strict mode: {count} warning(s) raised, first: {first}")]
    StrictModeViolation { count: usize, first: String },
    #[error("projection model failed for region {region}: {message}")]
    Model { region: String, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
