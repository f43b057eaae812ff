use thiserror::Error;

/// Top-level failure taxonomy shared by the webhook, the document pipeline
/// and the tool server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    Authentication,
    MalformedInput,
    Upstream,
    PartialCompletion,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication_failure",
            Self::MalformedInput => "malformed_input",
            Self::Upstream => "upstream_failure",
            Self::PartialCompletion => "partial_completion",
        }
    }

    /// Authentication and malformed input are rejected outright; the others
    /// may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream | Self::PartialCompletion)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("platform request `{path}` failed: {message}")]
    Transport { path: String, message: String },
    #[error("platform api error [{path}]: code={code}, msg={msg}")]
    Api { path: String, code: i64, msg: String },
    #[error("platform response for `{path}` could not be decoded: {message}")]
    Decode { path: String, message: String },
    #[error("credential failure: {0}")]
    Credentials(String),
    /// A local file handed to an upload could not be used.
    #[error("local file `{path}` rejected: {message}")]
    LocalFile { path: String, message: String },
}

impl PlatformError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::LocalFile { .. } => FailureClass::MalformedInput,
            Self::Transport { .. } | Self::Api { .. } | Self::Decode { .. } | Self::Credentials(_) => {
                FailureClass::Upstream
            }
        }
    }

    pub fn api_code(&self) -> Option<i64> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// A document write that stopped part-way. Batches before `blocks_written`
/// stay in the document; nothing is rolled back.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("document submission aborted after {blocks_written} blocks: {source}")]
pub struct SubmissionError {
    pub blocks_written: usize,
    #[source]
    pub source: PlatformError,
}

impl SubmissionError {
    pub fn class(&self) -> FailureClass {
        if self.blocks_written == 0 {
            FailureClass::Upstream
        } else {
            FailureClass::PartialCompletion
        }
    }

    /// Index of the first block that was not written.
    pub fn resume_offset(&self) -> usize {
        self.blocks_written
    }
}
