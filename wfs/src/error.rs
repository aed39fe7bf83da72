//! Errors returned by per-request filesystem operations.
//!
//! Fatal startup errors (bad arguments, unmappable disks, inconsistent
//! superblocks) use [`std::io::Error`] instead and abort the mount.

use libc::c_int;
use std::fmt;

/// An error produced while servicing a filesystem request.
///
/// Each variant maps to exactly one POSIX errno through [`FsError::errno`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FsError {
	/// A path component does not exist.
	NoEntry,
	/// A non-directory was used as a directory.
	NotDirectory,
	/// A directory was used where a regular file is required.
	IsDirectory,
	/// The target name already exists in its parent directory.
	Exists,
	/// A directory still contains entries.
	NotEmpty,
	/// No free inode or data block is left.
	NoSpace,
	/// The file would grow past the last supported block index.
	FileTooBig,
	/// A name does not fit in a directory entry.
	InvalidName,
	/// The on-disk structures are inconsistent.
	Io,
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
	/// Returns the errno corresponding to the error.
	pub fn errno(self) -> c_int {
		match self {
			Self::NoEntry => libc::ENOENT,
			Self::NotDirectory => libc::ENOTDIR,
			Self::IsDirectory => libc::EISDIR,
			Self::Exists => libc::EEXIST,
			Self::NotEmpty => libc::ENOTEMPTY,
			Self::NoSpace => libc::ENOSPC,
			Self::FileTooBig => libc::EFBIG,
			Self::InvalidName => libc::EINVAL,
			Self::Io => libc::EIO,
		}
	}
}

impl fmt::Display for FsError {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::NoEntry => "no such file or directory",
			Self::NotDirectory => "not a directory",
			Self::IsDirectory => "is a directory",
			Self::Exists => "file exists",
			Self::NotEmpty => "directory not empty",
			Self::NoSpace => "no space left on device",
			Self::FileTooBig => "file too large",
			Self::InvalidName => "invalid name",
			Self::Io => "input/output error",
		};
		write!(fmt, "{s}")
	}
}

impl std::error::Error for FsError {}
