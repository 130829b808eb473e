use thiserror::Error;

#[derive(Debug, Error)]
pub enum FairError {
    #[error("parser binary unavailable: {0}")]
    MissingParser(String),
    #[error("parser invocation failed: `{command}` {status}\nstderr: {stderr}")]
    ToolInvocation {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("malformed archive JSON at byte {offset}: {message} (near `{snippet}`)")]
    Decode {
        offset: usize,
        message: String,
        snippet: String,
    },
    #[error("unexpected archive shape: {0}")]
    ArchiveShape(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("output path collides with another source: {0}")]
    OutputCollision(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FairWarnCode {
    W001EmptyOutput,
    W002DerivationSkipped,
    W003CacheUnreadable,
    W004OutputCollision,
}

impl FairWarnCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::W001EmptyOutput => "W001_EMPTY_OUTPUT",
            Self::W002DerivationSkipped => "W002_DERIVATION_SKIPPED",
            Self::W003CacheUnreadable => "W003_CACHE_UNREADABLE",
            Self::W004OutputCollision => "W004_OUTPUT_COLLISION",
        }
    }
}
