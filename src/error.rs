use thiserror::Error;

/// Failure of a single invocation, whether it came from a batch line or
/// from the direct command line.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Display omits the line number; batch reports already prefix it.
    #[error("cannot tokenize: {message}")]
    Tokenize { line: usize, message: String },

    #[error("unknown command '{0}'")]
    NotFound(String),

    #[error("{0}")]
    Option(String),

    #[error("remote operation failed: {0:#}")]
    Remote(anyhow::Error),
}

impl CommandError {
    /// Short tag for the failure class, used in batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::Tokenize { .. } => "tokenize",
            CommandError::NotFound(_) => "not-found",
            CommandError::Option(_) => "option",
            CommandError::Remote(_) => "remote",
        }
    }
}

impl From<clap::Error> for CommandError {
    fn from(err: clap::Error) -> Self {
        CommandError::Option(err.to_string().trim_end().to_string())
    }
}

pub type Result<T> = std::result::Result<T, CommandError>;
