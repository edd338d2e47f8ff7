use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatError {
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Entry already exists: {0}")]
    Exists(String),

    #[error("No space left: {0}")]
    NoSpace(String),

    #[error("Could not create entry with this name: {0}")]
    NameUnavailable(String),

    #[error("File too large for FAT16: {0} bytes")]
    TooLarge(u64),

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("I/O error at image offset {offset:#x}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Inconsistent filesystem structure: {0}")]
    Invalid(String),
}
