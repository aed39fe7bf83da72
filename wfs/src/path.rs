//! Path resolution.

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::Inode;

/// The inode number of the root directory.
pub const ROOT_INODE: u64 = 0;

/// Splits `path` into its parent path and final component.
///
/// Trailing slashes are ignored; the basename of the root is empty.
pub fn split_parent(path: &str) -> (&str, &str) {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() {
		return ("/", "");
	}

	match trimmed.rfind('/') {
		Some(0) => ("/", &trimmed[1..]),
		Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
		None => ("/", trimmed),
	}
}

impl Wfs {
	/// Walks `path` from the root directory and returns the final inode
	/// together with its number.
	///
	/// Empty components are skipped, so `/`, `//` and the empty path all
	/// resolve to the root.
	pub(crate) fn resolve_path(&self, path: &str) -> FsResult<(Inode, u64)> {
		let mut num = ROOT_INODE;
		let mut inode = self.load_inode(num)?;

		for component in path.split('/').filter(|c| !c.is_empty()) {
			if !inode.is_dir() {
				return Err(FsError::NotDirectory);
			}

			let entry = self
				.find_dentry(&inode, component)?
				.ok_or(FsError::NoEntry)?;
			num = entry.num as u64;
			inode = self.load_inode(num)?;
		}

		Ok((inode, num))
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn split() {
		assert_eq!(split_parent("/"), ("/", ""));
		assert_eq!(split_parent(""), ("/", ""));
		assert_eq!(split_parent("/f"), ("/", "f"));
		assert_eq!(split_parent("/a/b"), ("/a", "b"));
		assert_eq!(split_parent("/a/b/c"), ("/a/b", "c"));
		assert_eq!(split_parent("/a/b/"), ("/a", "b"));
		assert_eq!(split_parent("f"), ("/", "f"));
	}
}
