use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Invalid magic number in header (not an archive)")]
    InvalidMagic,

    #[error("Invalid directory magic at offset {0} (archive corrupted)")]
    CorruptedDirectory(u32),

    #[error("Invalid allocation unit size: {0}")]
    InvalidAllocationSize(u32),

    #[error("Out of space: no free run of {0} allocation units")]
    OutOfSpace(u32),

    #[error("Directory node is full")]
    DirectoryFull,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Entry name too long: {0} (31 bytes max)")]
    NameTooLong(String),

    #[error("Archive not opened in read mode")]
    NotReadable,

    #[error("Archive not opened in write mode")]
    NotWritable,

    #[error("Insufficient buffer: {have} bytes for a {need} byte file")]
    InsufficientBuffer { have: usize, need: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
