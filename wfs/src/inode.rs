//! Load and store of inode records.
//!
//! The inode table holds one record every [`INODE_SIZE`] bytes. Reads come
//! from disk 0; writes go to every disk — the table is fully mirrored
//! regardless of the RAID mode.

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::Inode;
use crate::layout::INODE_SIZE;
use bytemuck::bytes_of;
use bytemuck::pod_read_unaligned;
use std::mem::size_of;

impl Wfs {
	/// Reads inode record `num` from disk 0.
	pub(crate) fn load_inode(&self, num: u64) -> FsResult<Inode> {
		if num >= self.sb.num_inodes {
			return Err(FsError::Io);
		}

		let off = self.sb.i_blocks_ptr + num * INODE_SIZE;
		Ok(pod_read_unaligned(self.disks.read_at(
			0,
			off,
			size_of::<Inode>(),
		)))
	}

	/// Writes the record of `inode` to every disk.
	pub(crate) fn store_inode(&mut self, inode: &Inode) {
		let off = self.sb.i_blocks_ptr + inode.num as u64 * INODE_SIZE;
		self.disks.write_all_disks(off, bytes_of(inode));
	}
}
