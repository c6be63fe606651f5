use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RomVfsError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    BinRwError(#[from] binrw::Error),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),

    #[error("No decoder recognized the input")]
    UnsupportedFormat,

    #[error("Recognized container has an inconsistent field: {0}")]
    InvalidFormat(String),

    #[error("Path resolves to nothing: {0}")]
    NotFound(String),

    #[error("Read of {len} bytes at offset {offset:#x} escapes a window of {window:#x} bytes")]
    OutOfRange { offset: u64, len: u64, window: u64 },

    #[error("ExeFS holds at most 10 files with names of at most 8 bytes")]
    ExeFsCapacity,

    #[error("File data region exceeds the representable size")]
    SizeLimit,

    #[error("Duplicate sibling name in tree: {0}")]
    InvalidTree(String),

    #[error("Operation is not supported here: {0}")]
    NotSupported(String),
}

pub type RomVfsResult<T> = result::Result<T, RomVfsError>;
