use std::path::PathBuf;

/// Failures that abort startup. Nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("no watch targets configured")]
    NoTargets,

    #[error("no integration executable configured")]
    NoIntegration,

    #[error("watch target {path} is not a readable directory: {source}")]
    InvalidTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("failed to watch {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("failed to start the event source: {0}")]
    EventSource(#[source] notify::Error),

    #[error("failed to launch integration {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("integration exited before it was ready ({status})")]
    ExitedBeforeReady { status: String },
}

/// Failures while turning one filesystem event into frames. The event is dropped,
/// the watch loop carries on.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("failed to serialise frame: {0}")]
    Serialise(#[from] serde_json::Error),

    #[error("failed to write to the integration pipe: {0}")]
    Pipe(#[source] std::io::Error),

    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl EventError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures on the receiving side of the pipe. The offending frame is skipped.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("undecodable contents for {name}: {source}")]
    Contents {
        name: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("frame for {name} carries no destinations argument")]
    NoDestinations { name: String },

    #[error("frame name {name:?} is not a single file name")]
    UnsafeName { name: String },

    #[error("frame path {path:?} escapes the destination root")]
    UnsafePath { path: String },
}
