use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::mapping::ParseErrorKind;

/// An error raised while fixing up an obfuscated bundle.
///
/// Every variant is fatal: the pipeline performs a single attempt and the
/// original archive is only replaced once all preceding steps succeeded.
#[derive(Debug, Error)]
pub enum FixupError {
    /// The archive or mapping file does not exist.
    #[error("file does not exist: {}", path.display())]
    MissingFile {
        /// The path that was expected to exist.
        path: PathBuf,
    },
    /// A manifest line could not be split into a name and a value.
    #[error("malformed manifest line {line_number}: {line:?}")]
    MalformedManifest {
        /// The 1-based physical line number.
        line_number: usize,
        /// The offending line.
        line: String,
    },
    /// A mapping file line could not be parsed.
    #[error("invalid mapping line {line_number}: {line:?} ({kind})")]
    Parse {
        /// The 1-based line number within the mapping file.
        line_number: usize,
        /// The offending line, lossily decoded.
        line: String,
        /// What was wrong with it.
        kind: ParseErrorKind,
    },
    /// Reading or writing a file failed.
    #[error("i/o error on {}", path.display())]
    Io {
        /// The file or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The archive container could not be read or written.
    #[error("archive error on {}", path.display())]
    Archive {
        /// The archive being processed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: zip::result::ZipError,
    },
}

impl FixupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        FixupError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        FixupError::Archive {
            path: path.into(),
            source,
        }
    }

    /// Maps a "not found" error to [`FixupError::MissingFile`], everything
    /// else to [`FixupError::Io`].
    pub(crate) fn open(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            FixupError::MissingFile { path }
        } else {
            FixupError::Io { path, source }
        }
    }
}
