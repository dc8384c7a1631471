use std::{io, path::PathBuf};

use thiserror::Error;

// Two fatal kinds: I/O (always tagged with the offending path) and
// unsupported format. Lenient-parse conditions never surface here; they are
// recovered at the line that produced them.
#[derive(Error, Debug)]
pub enum GtabError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, GtabError>;

impl GtabError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GtabError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        GtabError::UnsupportedFormat(msg.into())
    }
}
