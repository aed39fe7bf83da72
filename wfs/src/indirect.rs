//! The single-level indirect block of an inode.
//!
//! Slot [`IND_BLOCK`] of an inode holds either zero or the number of a data
//! block containing [`INDIRECT_BLOCK_ENTRIES`] packed `i64` data-block
//! numbers, where zero again means "empty slot". The indirect block is only
//! allocated once a file needs a block index at or past [`D_BLOCK`].

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::Inode;
use crate::layout::IND_BLOCK;
use crate::layout::INDIRECT_BLOCK_ENTRIES;
use bytemuck::cast_slice;
use bytemuck::cast_slice_mut;
use log::debug;

/// The in-memory image of an indirect block.
pub(crate) type IndirectPointers = [i64; INDIRECT_BLOCK_ENTRIES];

impl Wfs {
	/// Reads the indirect pointer array of `inode`.
	pub(crate) fn read_indirect_pointers(&self, inode: &Inode) -> FsResult<IndirectPointers> {
		if inode.blocks[IND_BLOCK] == 0 {
			return Err(FsError::NoEntry);
		}

		let mut ptrs: IndirectPointers = [0; INDIRECT_BLOCK_ENTRIES];
		self.read_block(inode.blocks[IND_BLOCK] as u64, cast_slice_mut(&mut ptrs))?;
		Ok(ptrs)
	}

	/// Writes the indirect pointer array of `inode` back to disk.
	pub(crate) fn write_indirect_pointers(
		&mut self,
		inode: &Inode,
		ptrs: &IndirectPointers,
	) -> FsResult<()> {
		if inode.blocks[IND_BLOCK] == 0 {
			return Err(FsError::NoEntry);
		}

		self.write_block(inode.blocks[IND_BLOCK] as u64, cast_slice(ptrs))
	}

	/// Ensures `inode` has an indirect block, allocating and zero-filling
	/// one if needed. The updated inode is persisted.
	pub(crate) fn allocate_indirect_block(&mut self, inode: &mut Inode) -> FsResult<()> {
		if inode.blocks[IND_BLOCK] != 0 {
			return Ok(());
		}

		let blk = self.allocate_data_block()?;
		inode.blocks[IND_BLOCK] = blk as i64;

		let zero: IndirectPointers = [0; INDIRECT_BLOCK_ENTRIES];
		if let Err(err) = self.write_block(blk, cast_slice(&zero)) {
			self.free_data_block(blk);
			inode.blocks[IND_BLOCK] = 0;
			return Err(err);
		}

		self.store_inode(inode);
		debug!("allocated indirect block {blk} for inode {}", inode.num);
		Ok(())
	}

	/// Returns the data block behind indirect slot `idx` of `inode`,
	/// allocating one if the slot is empty.
	pub(crate) fn allocate_indirect_data_block(
		&mut self,
		inode: &mut Inode,
		idx: usize,
	) -> FsResult<u64> {
		if idx >= INDIRECT_BLOCK_ENTRIES {
			return Err(FsError::FileTooBig);
		}

		let mut ptrs = self.read_indirect_pointers(inode)?;
		if ptrs[idx] != 0 {
			return Ok(ptrs[idx] as u64);
		}

		let blk = self.allocate_data_block()?;
		ptrs[idx] = blk as i64;

		if let Err(err) = self.write_indirect_pointers(inode, &ptrs) {
			self.free_data_block(blk);
			return Err(err);
		}

		debug!(
			"allocated data block {blk} at indirect slot {idx} of inode {}",
			inode.num
		);
		Ok(blk)
	}

	/// Frees every data block referenced by the indirect block of `inode`,
	/// then the indirect block itself. The updated inode is persisted.
	pub(crate) fn free_indirect_blocks(&mut self, inode: &mut Inode) -> FsResult<()> {
		if inode.blocks[IND_BLOCK] == 0 {
			return Ok(());
		}

		let mut ptrs = self.read_indirect_pointers(inode)?;
		for ptr in ptrs.iter_mut() {
			if *ptr != 0 {
				self.free_data_block(*ptr as u64);
				*ptr = 0;
			}
		}
		self.write_indirect_pointers(inode, &ptrs)?;

		self.free_data_block(inode.blocks[IND_BLOCK] as u64);
		inode.blocks[IND_BLOCK] = 0;
		self.store_inode(inode);
		Ok(())
	}
}
