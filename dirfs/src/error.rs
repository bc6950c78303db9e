use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("an entry named {0:?} of the same kind already exists")]
    NameCollision(String),
    #[error("no free sector for a file header")]
    NoFreeHeaderBlock,
    #[error("not enough free sectors for file data")]
    NoFreeDataBlocks,
    #[error("requested {requested} bytes, files are limited to {max} bytes")]
    FileTooLarge { requested: usize, max: usize },
    #[error("directory entry table is full")]
    DirectoryFull,
    #[error("no such file or directory: {0:?}")]
    PathComponentNotFound(String),
    #[error("{0:?} is not a directory")]
    NotADirectory(String),
    #[error("{0:?} is not a file")]
    NotAFile(String),
    #[error("device is too small")]
    DeviceFull,
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("name {0:?} is too long")]
    NameTooLong(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("device does not contain a formatted file system")]
    Unformatted,
    #[error("device I/O failed")]
    Io(#[from] std::io::Error),
}
