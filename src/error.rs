//! Error kinds returned by filesystem operations.

use std::fmt;

use crate::device::DeviceError;

/// An error produced by a filesystem operation.
///
/// Variant names follow POSIX conventions (the semantics, not the host's
/// `errno` identifiers, per the engine's external-collaborator boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
	/// A name exceeded `FS_FILENAME_SIZE - 1` bytes.
	NameTooLong,
	/// Expected a directory inode, got something else.
	NotADirectory,
	/// Expected a non-directory inode, got a directory.
	IsADirectory,
	/// No entry with that name, or no inode at that index.
	NoSuchEntry,
	/// An entry with that name already exists.
	EntryExists,
	/// `rmdir`/`unlinkat` target directory was not empty.
	DirectoryNotEmpty,
	/// No free inode or block available.
	NoSpace,
	/// Content would not fit in a single block.
	TooLarge,
	/// A negative count/offset or other malformed argument.
	InvalidArgument,
	/// Attempted to unlink `.` or `..`.
	NotPermitted,
	/// The underlying block device failed.
	Io(DeviceError),
}

impl fmt::Display for FsError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::NameTooLong => write!(f, "name too long"),
			Self::NotADirectory => write!(f, "not a directory"),
			Self::IsADirectory => write!(f, "is a directory"),
			Self::NoSuchEntry => write!(f, "no such entry"),
			Self::EntryExists => write!(f, "entry exists"),
			Self::DirectoryNotEmpty => write!(f, "directory not empty"),
			Self::NoSpace => write!(f, "no space left"),
			Self::TooLarge => write!(f, "content too large"),
			Self::InvalidArgument => write!(f, "invalid argument"),
			Self::NotPermitted => write!(f, "operation not permitted"),
			Self::Io(e) => write!(f, "device error: {e}"),
		}
	}
}

impl std::error::Error for FsError {}

impl From<DeviceError> for FsError {
	fn from(e: DeviceError) -> Self {
		Self::Io(e)
	}
}

/// Shorthand for results of fallible filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
