//! Sizing of the disk images backing a volume.

use std::fs;
use std::fs::File;
use std::io;
use std::io::Error;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// ioctl request returning a block device's capacity in bytes.
///
/// `_IOR(0x12, 114, u64)` on Linux.
const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

/// Asks the kernel for the capacity of the block device behind `dev`.
fn device_size(dev: &File) -> io::Result<u64> {
	let mut bytes: u64 = 0;
	let ret = unsafe { libc::ioctl(dev.as_raw_fd(), BLKGETSIZE64 as _, &mut bytes) };
	if ret < 0 {
		return Err(Error::last_os_error());
	}
	Ok(bytes)
}

/// Returns the capacity in bytes of the disk image at `path`.
///
/// A regular file reports its length; a block or character device is asked
/// through [`BLKGETSIZE64`]. Anything else has no usable capacity.
pub fn get_disk_size(path: &Path) -> io::Result<u64> {
	let metadata = fs::metadata(path)?;
	let kind = metadata.file_type();

	if kind.is_file() {
		return Ok(metadata.len());
	}
	if kind.is_block_device() || kind.is_char_device() {
		return device_size(&File::open(path)?);
	}
	Ok(0)
}
