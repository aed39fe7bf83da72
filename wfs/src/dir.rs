//! Directory entry management.
//!
//! A directory's data blocks form a packed array of [`Dentry`] records, 16
//! per block. The logical end of the array is `size / DENTRY_SIZE`; inserts
//! always append there, while deletes zero the slot in place and leave a
//! hole. Only the direct block slots are ever used by directories.

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::Dentry;
use crate::layout::Inode;
use crate::layout::DENTRY_SIZE;
use crate::layout::ENTRIES_PER_BLOCK;
use crate::layout::N_BLOCKS;
use bytemuck::cast_slice;
use bytemuck::cast_slice_mut;
use bytemuck::Zeroable;
use log::debug;

/// One block's worth of directory entries.
type DentryBlock = [Dentry; ENTRIES_PER_BLOCK];

impl Wfs {
	/// Reads the directory block stored in data block `blk`.
	fn read_dentry_block(&self, blk: u64) -> FsResult<DentryBlock> {
		let mut entries: DentryBlock = [Dentry::zeroed(); ENTRIES_PER_BLOCK];
		self.read_block(blk, cast_slice_mut(&mut entries))?;
		Ok(entries)
	}

	/// Looks up `name` in directory `dir`.
	///
	/// Comparison is exact and case-sensitive. Returns `None` when the name
	/// is absent.
	pub(crate) fn find_dentry(&self, dir: &Inode, name: &str) -> FsResult<Option<Dentry>> {
		for slot in 0..N_BLOCKS {
			if dir.blocks[slot] == 0 {
				continue;
			}

			let entries = self.read_dentry_block(dir.blocks[slot] as u64)?;
			for entry in entries {
				if !entry.is_free() && entry.name() == name {
					return Ok(Some(entry));
				}
			}
		}
		Ok(None)
	}

	/// Appends an entry binding `name` to inode `num` at the logical end of
	/// directory `dir`.
	///
	/// A new direct block is allocated when the end falls into an
	/// unallocated slot. The directory inode (grown size, possibly a new
	/// block pointer) is persisted.
	pub(crate) fn add_dentry(&mut self, dir: &mut Inode, name: &str, num: u64) -> FsResult<()> {
		let entry = Dentry::new(name, num)?;

		let total_entries = dir.size as u64 / DENTRY_SIZE;
		let block_idx = (total_entries / ENTRIES_PER_BLOCK as u64) as usize;
		let entry_idx = (total_entries % ENTRIES_PER_BLOCK as u64) as usize;
		if block_idx >= N_BLOCKS {
			return Err(FsError::NoSpace);
		}

		if dir.blocks[block_idx] == 0 {
			let blk = self.allocate_data_block()?;
			dir.blocks[block_idx] = blk as i64;
			debug!("allocated block {blk} for directory inode {}", dir.num);
		}

		let blk = dir.blocks[block_idx] as u64;
		let mut entries = self.read_dentry_block(blk)?;
		entries[entry_idx] = entry;
		self.write_block(blk, cast_slice(&entries))?;

		dir.size += DENTRY_SIZE as i64;
		self.store_inode(dir);
		Ok(())
	}

	/// Removes the entry named `name` from directory `dir` by zeroing its
	/// slot. The directory's size is left unchanged.
	pub(crate) fn remove_dentry(&mut self, dir: &mut Inode, name: &str) -> FsResult<()> {
		for slot in 0..N_BLOCKS {
			if dir.blocks[slot] == 0 {
				continue;
			}

			let blk = dir.blocks[slot] as u64;
			let mut entries = self.read_dentry_block(blk)?;
			let pos = entries
				.iter()
				.position(|e| !e.is_free() && e.name() == name);
			if let Some(pos) = pos {
				entries[pos] = Dentry::zeroed();
				return self.write_block(blk, cast_slice(&entries));
			}
		}
		Err(FsError::NoEntry)
	}

	/// Tells whether directory `dir` contains no entries other than `.` and
	/// `..`.
	pub(crate) fn dir_is_empty(&self, dir: &Inode) -> FsResult<bool> {
		for slot in 0..N_BLOCKS {
			if dir.blocks[slot] == 0 {
				continue;
			}

			let entries = self.read_dentry_block(dir.blocks[slot] as u64)?;
			for entry in entries {
				if entry.is_free() {
					continue;
				}
				if entry.name() != "." && entry.name() != ".." {
					return Ok(false);
				}
			}
		}
		Ok(true)
	}

	/// Returns every live entry of directory `dir`, excluding any stored
	/// `.`/`..`.
	pub(crate) fn dir_entries(&self, dir: &Inode) -> FsResult<Vec<Dentry>> {
		let mut out = Vec::new();
		for slot in 0..N_BLOCKS {
			if dir.blocks[slot] == 0 {
				continue;
			}

			let entries = self.read_dentry_block(dir.blocks[slot] as u64)?;
			for entry in entries {
				if entry.is_free() || entry.name() == "." || entry.name() == ".." {
					continue;
				}
				out.push(entry);
			}
		}
		Ok(out)
	}
}
