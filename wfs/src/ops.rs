//! The top-level filesystem operations.
//!
//! Every operation takes a POSIX-style path, resolves it through the path
//! walker and works on inode records and data blocks through the RAID
//! layer. Failed operations roll their allocations back where that is
//! straightforward; a `write` that runs out of space mid-loop keeps the
//! blocks it already placed but never advances the file size past the bytes
//! actually written.

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::Dentry;
use crate::layout::Inode;
use crate::layout::BLOCK_SIZE;
use crate::layout::DENTRY_SIZE;
use crate::layout::D_BLOCK;
use crate::layout::ENTRIES_PER_BLOCK;
use crate::layout::INDIRECT_BLOCK_ENTRIES;
use crate::layout::IND_BLOCK;
use crate::layout::MAX_NAME;
use crate::layout::N_BLOCKS;
use crate::path::split_parent;
use crate::path::ROOT_INODE;
use bytemuck::cast_slice;
use bytemuck::Zeroable;
use log::debug;
use log::warn;
use utils::util::get_timestamp;

/// An entry reported by [`Wfs::readdir`].
#[derive(Clone, Debug)]
pub struct ReaddirEntry {
	/// The entry's name.
	pub name: String,
	/// The referenced inode number.
	pub num: u64,
	/// The referenced inode's mode.
	pub mode: u32,
}

/// Returns the current Unix timestamp in seconds.
fn now() -> i64 {
	get_timestamp().as_secs() as i64
}

impl Wfs {
	/// Bootstraps the root directory on first mount.
	///
	/// If the root inode does not yet describe a directory holding `.` and
	/// `..`, it is rebuilt: data-region block 0 (which the allocator never
	/// hands out) receives the two entries and the inode is reset to an
	/// empty directory owned by the mounting process.
	pub fn init_root(&mut self) -> FsResult<()> {
		let root = self.load_inode(ROOT_INODE)?;
		if root.is_dir() && root.size as u64 >= 2 * DENTRY_SIZE {
			return Ok(());
		}

		debug!("initializing root directory");
		let uid = unsafe { libc::getuid() };
		let gid = unsafe { libc::getgid() };
		let mut root = Inode::new(ROOT_INODE, libc::S_IFDIR | 0o755, uid, gid, 2, now());
		root.size = (2 * DENTRY_SIZE) as i64;

		let mut entries = [Dentry::zeroed(); ENTRIES_PER_BLOCK];
		entries[0] = Dentry::new(".", ROOT_INODE)?;
		entries[1] = Dentry::new("..", ROOT_INODE)?;
		self.write_block(0, cast_slice(&entries))?;

		self.store_inode(&root);
		Ok(())
	}

	/// Returns the inode record behind `path`.
	pub fn getattr(&self, path: &str) -> FsResult<Inode> {
		let (inode, _) = self.resolve_path(path)?;
		Ok(inode)
	}

	/// Creates a node at `path` with the given mode.
	///
	/// The mode carries the file type bit; directories start with two
	/// links, regular files with one. Returns the new inode.
	pub fn mknod(&mut self, path: &str, mode: u32) -> FsResult<Inode> {
		let (parent_path, name) = split_parent(path);
		if name.is_empty() {
			return Err(FsError::Exists);
		}
		if name.len() >= MAX_NAME {
			return Err(FsError::InvalidName);
		}

		let (mut parent, _) = self.resolve_path(parent_path)?;
		if !parent.is_dir() {
			return Err(FsError::NotDirectory);
		}
		if self.find_dentry(&parent, name)?.is_some() {
			return Err(FsError::Exists);
		}

		let num = self.allocate_inode()?;
		let uid = unsafe { libc::getuid() };
		let gid = unsafe { libc::getgid() };
		let nlinks = if mode & libc::S_IFDIR != 0 { 2 } else { 1 };
		let inode = Inode::new(num, mode, uid, gid, nlinks, now());
		self.store_inode(&inode);

		if let Err(err) = self.add_dentry(&mut parent, name, num) {
			self.free_inode(num);
			return Err(err);
		}

		let now = now();
		parent.mtim = now;
		parent.ctim = now;
		self.store_inode(&parent);

		debug!("created `{path}` (inode {num})");
		Ok(inode)
	}

	/// Creates a directory at `path`.
	pub fn mkdir(&mut self, path: &str, mode: u32) -> FsResult<Inode> {
		self.mknod(path, mode | libc::S_IFDIR)
	}

	/// Removes the regular file at `path`, releasing its inode and every
	/// data block it references. Returns the freed inode number.
	pub fn unlink(&mut self, path: &str) -> FsResult<u64> {
		let (parent_path, name) = split_parent(path);
		let (mut parent, _) = self.resolve_path(parent_path)?;

		let entry = self.find_dentry(&parent, name)?.ok_or(FsError::NoEntry)?;
		let mut target = self.load_inode(entry.num as u64)?;
		if target.is_dir() {
			return Err(FsError::IsDirectory);
		}

		self.remove_dentry(&mut parent, name)?;

		for slot in 0..D_BLOCK {
			if target.blocks[slot] != 0 {
				self.free_data_block(target.blocks[slot] as u64);
				target.blocks[slot] = 0;
			}
		}
		if let Err(err) = self.free_indirect_blocks(&mut target) {
			warn!(
				"unlink `{path}`: failed to free indirect blocks of inode {}: {err}",
				target.num
			);
		}
		self.free_inode(target.num as u64);

		let now = now();
		parent.mtim = now;
		parent.ctim = now;
		self.store_inode(&parent);

		debug!("unlinked `{path}` (inode {})", target.num);
		Ok(target.num as u64)
	}

	/// Removes the empty directory at `path`. Returns the freed inode
	/// number.
	pub fn rmdir(&mut self, path: &str) -> FsResult<u64> {
		let (parent_path, name) = split_parent(path);
		let (mut parent, _) = self.resolve_path(parent_path)?;

		let entry = self.find_dentry(&parent, name)?.ok_or(FsError::NoEntry)?;
		let target = self.load_inode(entry.num as u64)?;
		if !target.is_dir() {
			return Err(FsError::NotDirectory);
		}
		if !self.dir_is_empty(&target)? {
			return Err(FsError::NotEmpty);
		}

		self.remove_dentry(&mut parent, name)?;
		parent.nlinks -= 1;

		for slot in 0..N_BLOCKS {
			if target.blocks[slot] != 0 {
				self.free_data_block(target.blocks[slot] as u64);
			}
		}
		self.free_inode(target.num as u64);

		let now = now();
		parent.mtim = now;
		parent.ctim = now;
		self.store_inode(&parent);

		debug!("removed directory `{path}` (inode {})", target.num);
		Ok(target.num as u64)
	}

	/// Reads up to `size` bytes at `offset` from the regular file at
	/// `path`.
	///
	/// The count is clamped to the file size; hitting an unallocated block
	/// ends the read early with the bytes gathered so far.
	pub fn read(&self, path: &str, offset: u64, size: usize) -> FsResult<Vec<u8>> {
		let (inode, _) = self.resolve_path(path)?;
		if !inode.is_reg() {
			return Err(FsError::IsDirectory);
		}

		let file_size = inode.size as u64;
		if offset >= file_size {
			return Ok(Vec::new());
		}

		let mut remaining = size.min((file_size - offset) as usize);
		let mut pos = offset;
		let mut out = Vec::with_capacity(remaining);
		while remaining > 0 {
			let block_index = (pos / BLOCK_SIZE) as usize;
			let block_off = (pos % BLOCK_SIZE) as usize;

			let blk = if block_index < D_BLOCK {
				inode.blocks[block_index]
			} else if block_index < D_BLOCK + INDIRECT_BLOCK_ENTRIES {
				if inode.blocks[IND_BLOCK] == 0 {
					break;
				}
				let ptrs = self.read_indirect_pointers(&inode)?;
				ptrs[block_index - D_BLOCK]
			} else {
				break;
			};
			if blk == 0 {
				break;
			}

			let mut block = [0u8; BLOCK_SIZE as usize];
			self.read_block(blk as u64, &mut block)?;

			let to_read = remaining.min(BLOCK_SIZE as usize - block_off);
			out.extend_from_slice(&block[block_off..block_off + to_read]);

			pos += to_read as u64;
			remaining -= to_read;
		}

		Ok(out)
	}

	/// Writes `data` at `offset` into the regular file at `path`,
	/// allocating direct and indirect blocks on demand.
	///
	/// Returns the number of bytes written, which is less than
	/// `data.len()` when an allocation fails mid-way. Fails with
	/// `FileTooBig` as soon as the write reaches past the last supported
	/// block index.
	pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
		let (mut inode, _) = self.resolve_path(path)?;
		if !inode.is_reg() {
			return Err(FsError::IsDirectory);
		}

		let mut written = 0;
		let mut pos = offset;
		let mut alloc_err = None;
		while written < data.len() {
			let block_index = (pos / BLOCK_SIZE) as usize;
			let block_off = (pos % BLOCK_SIZE) as usize;

			let blk = if block_index < D_BLOCK {
				if inode.blocks[block_index] == 0 {
					match self.allocate_data_block() {
						Ok(blk) => inode.blocks[block_index] = blk as i64,
						Err(err) => {
							alloc_err = Some(err);
							break;
						}
					}
				}
				inode.blocks[block_index] as u64
			} else if block_index < D_BLOCK + INDIRECT_BLOCK_ENTRIES {
				if let Err(err) = self.allocate_indirect_block(&mut inode) {
					alloc_err = Some(err);
					break;
				}
				match self.allocate_indirect_data_block(&mut inode, block_index - D_BLOCK) {
					Ok(blk) => blk,
					Err(err) => {
						alloc_err = Some(err);
						break;
					}
				}
			} else {
				return Err(FsError::FileTooBig);
			};

			let mut block = [0u8; BLOCK_SIZE as usize];
			self.read_block(blk, &mut block)?;

			let to_write = (data.len() - written).min(BLOCK_SIZE as usize - block_off);
			block[block_off..block_off + to_write].copy_from_slice(&data[written..written + to_write]);
			self.write_block(blk, &block)?;

			pos += to_write as u64;
			written += to_write;
		}

		if pos > inode.size as u64 {
			inode.size = pos as i64;
		}
		let now = now();
		inode.mtim = now;
		inode.ctim = now;
		self.store_inode(&inode);

		if written == 0 {
			if let Some(err) = alloc_err {
				return Err(err);
			}
		}
		Ok(written)
	}

	/// Lists the directory at `path`.
	///
	/// `.` and `..` are synthesized first; stored entries with those names
	/// are filtered out.
	pub fn readdir(&self, path: &str) -> FsResult<Vec<ReaddirEntry>> {
		let (dir, num) = self.resolve_path(path)?;
		if !dir.is_dir() {
			return Err(FsError::NotDirectory);
		}

		let mut out = vec![
			ReaddirEntry {
				name: ".".to_owned(),
				num,
				mode: dir.mode,
			},
			ReaddirEntry {
				name: "..".to_owned(),
				num,
				mode: dir.mode,
			},
		];
		for entry in self.dir_entries(&dir)? {
			let mode = match self.load_inode(entry.num as u64) {
				Ok(inode) => inode.mode,
				Err(err) => {
					warn!(
						"readdir `{path}`: cannot load inode {} of entry `{}`: {err}",
						entry.num,
						entry.name()
					);
					continue;
				}
			};
			out.push(ReaddirEntry {
				name: entry.name().to_owned(),
				num: entry.num as u64,
				mode,
			});
		}

		Ok(out)
	}
}
