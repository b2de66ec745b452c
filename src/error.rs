//! Unified error type surfaced across the crate.

use crate::device::DeviceErr;
use crate::dir::DirError;
use crate::fat::FatError;
use crate::file::FileError;
use core::fmt;

/// The error kinds a caller of this crate can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    NotDirectory,
    Exists,
    IsDirectory,
    ReadOnly,
    NotEmpty,
    NoSpace,
    Busy,
    IoError(DeviceErr),
    InvalidName,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "no such file or directory"),
            Error::NotDirectory => write!(f, "not a directory"),
            Error::Exists => write!(f, "file exists"),
            Error::IsDirectory => write!(f, "is a directory"),
            Error::ReadOnly => write!(f, "read-only volume"),
            Error::NotEmpty => write!(f, "directory not empty"),
            Error::NoSpace => write!(f, "no space left on device"),
            Error::Busy => write!(f, "resource busy"),
            Error::IoError(e) => write!(f, "i/o error: {:?}", e),
            Error::InvalidName => write!(f, "invalid name"),
        }
    }
}

impl From<DeviceErr> for Error {
    fn from(e: DeviceErr) -> Self {
        Error::IoError(e)
    }
}

impl From<FatError> for Error {
    fn from(e: FatError) -> Self {
        match e {
            FatError::Io(d) => Error::IoError(d),
            FatError::NoSpace => Error::NoSpace,
            FatError::InvalidCluster => Error::NotFound,
        }
    }
}

impl From<DirError> for Error {
    fn from(e: DirError) -> Self {
        match e {
            DirError::NotFound => Error::NotFound,
            DirError::NotDirectory => Error::NotDirectory,
            DirError::Exists => Error::Exists,
            DirError::InvalidName => Error::InvalidName,
            DirError::NoSpace => Error::NoSpace,
            DirError::Fat(e) => e.into(),
        }
    }
}

impl From<FileError> for Error {
    fn from(e: FileError) -> Self {
        match e {
            FileError::IsDirectory => Error::IsDirectory,
            FileError::NotDirectory => Error::NotDirectory,
            FileError::NotEmpty => Error::NotEmpty,
            FileError::ReadOnly => Error::ReadOnly,
            FileError::Dir(e) => e.into(),
            FileError::Fat(e) => e.into(),
        }
    }
}
