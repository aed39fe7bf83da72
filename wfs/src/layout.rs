//! On-disk format of a WFS volume.
//!
//! Every disk of a volume carries the same layout:
//!
//! ```text
//!         d_bitmap_ptr        d_blocks_ptr
//!              v                   v
//! +----+---------+---------+--------+--------------------------+
//! | SB | IBITMAP | DBITMAP | INODES |       DATA BLOCKS        |
//! +----+---------+---------+--------+--------------------------+
//! 0    ^                   ^
//! i_bitmap_ptr        i_blocks_ptr
//! ```
//!
//! All records are little-endian with natural field alignment; the structs
//! below are byte-exact images of the disk content.

use crate::error::FsError;
use crate::error::FsResult;
use bytemuck::Pod;
use bytemuck::Zeroable;
use std::mem::size_of;
use utils::util::ceil_division;
use utils::util::round_up;

/// The size of a block in bytes.
pub const BLOCK_SIZE: u64 = 512;
/// The maximum length of a directory entry name, including the NUL byte.
pub const MAX_NAME: usize = 28;
/// The maximum number of disks in a volume.
pub const MAX_DISKS: usize = 10;

/// The number of direct block slots in an inode.
pub const D_BLOCK: usize = 6;
/// The index of the indirect block slot in an inode.
pub const IND_BLOCK: usize = D_BLOCK;
/// The total number of block slots in an inode.
pub const N_BLOCKS: usize = IND_BLOCK + 1;

/// The number of block pointers held by an indirect block.
pub const INDIRECT_BLOCK_ENTRIES: usize = BLOCK_SIZE as usize / size_of::<i64>();

/// The stride of a record in the inode table.
pub const INODE_SIZE: u64 = 512;
/// The size of a directory entry in bytes.
pub const DENTRY_SIZE: u64 = size_of::<Dentry>() as u64;
/// The number of directory entries per block.
pub const ENTRIES_PER_BLOCK: usize = (BLOCK_SIZE / DENTRY_SIZE) as usize;

/// The size of the superblock in bytes.
pub const SB_SIZE: u64 = size_of::<Superblock>() as u64;

/// Inode and data block counts are rounded up to a multiple of this value at
/// format time.
pub const COUNT_ALIGN: u64 = 32;

/// The superblock, stored at offset zero of every disk.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Superblock {
	/// The capacity of the inode table.
	pub num_inodes: u64,
	/// The capacity of the data region, in blocks.
	pub num_data_blocks: u64,
	/// The byte offset of the inode bitmap.
	pub i_bitmap_ptr: u64,
	/// The byte offset of the data bitmap.
	pub d_bitmap_ptr: u64,
	/// The byte offset of the inode table.
	pub i_blocks_ptr: u64,
	/// The byte offset of the data region.
	pub d_blocks_ptr: u64,
	/// The RAID mode (`0` = stripe, `1` = mirror, `2` = mirror with
	/// majority reads).
	pub raid_mode: i32,
	/// The number of disks the volume was formatted with.
	pub num_disks: i32,
	/// Structure padding.
	pub _padding: [u8; 8],
	/// The canonical ordering tags assigned to the disks at format time.
	pub disk_order: [[u8; MAX_NAME]; MAX_DISKS],
}

impl Superblock {
	/// Returns the total byte extent of the filesystem described by the
	/// superblock.
	pub fn total_size(&self) -> u64 {
		self.d_blocks_ptr + self.num_data_blocks * BLOCK_SIZE
	}

	/// Returns the size of the inode bitmap in bytes.
	pub fn i_bitmap_size(&self) -> u64 {
		ceil_division(self.num_inodes, 8)
	}

	/// Returns the size of the data bitmap in bytes.
	pub fn d_bitmap_size(&self) -> u64 {
		ceil_division(self.num_data_blocks, 8)
	}
}

/// Returns the canonical ordering tag for disk `i` (counted from zero).
///
/// Tags have the form `DISK_0001`, `DISK_0002`, ...
pub fn disk_tag(i: usize) -> [u8; MAX_NAME] {
	let mut tag = [0u8; MAX_NAME];
	let s = format!("DISK_{:04}", i + 1);
	tag[..s.len()].copy_from_slice(s.as_bytes());
	tag
}

/// An inode record.
///
/// Records are written back-to-back with a stride of [`INODE_SIZE`] bytes;
/// the bytes past the struct are unused padding.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Inode {
	/// The inode number.
	pub num: i32,
	/// File type and permission bits.
	pub mode: u32,
	/// User ID of the owner.
	pub uid: u32,
	/// Group ID of the owner.
	pub gid: u32,
	/// Total size in bytes.
	pub size: i64,
	/// Number of hard links.
	pub nlinks: i32,
	/// Structure padding.
	pub _padding: [u8; 4],
	/// Timestamp of the last access.
	pub atim: i64,
	/// Timestamp of the last content modification.
	pub mtim: i64,
	/// Timestamp of the last status change.
	pub ctim: i64,
	/// Block slots: `0..D_BLOCK` are direct data blocks, slot `IND_BLOCK`
	/// is the indirect block. A value of zero means the slot is
	/// unallocated.
	pub blocks: [i64; N_BLOCKS],
}

impl Inode {
	/// Creates a fresh inode with the given identity, owner and timestamp.
	///
	/// The size is zero and no block is allocated.
	pub fn new(num: u64, mode: u32, uid: u32, gid: u32, nlinks: i32, now: i64) -> Self {
		Self {
			num: num as _,
			mode,
			uid,
			gid,
			size: 0,
			nlinks,
			_padding: [0; 4],
			atim: now,
			mtim: now,
			ctim: now,
			blocks: [0; N_BLOCKS],
		}
	}

	/// Tells whether the inode is a directory.
	pub fn is_dir(&self) -> bool {
		self.mode & libc::S_IFDIR != 0
	}

	/// Tells whether the inode is a regular file.
	pub fn is_reg(&self) -> bool {
		self.mode & libc::S_IFREG != 0
	}
}

/// A directory entry.
///
/// An entry whose name is empty is a free slot.
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct Dentry {
	/// The entry's name, NUL-terminated.
	pub name: [u8; MAX_NAME],
	/// The referenced inode number.
	pub num: i32,
}

impl Dentry {
	/// Creates an entry binding `name` to inode `num`.
	///
	/// Fails if the name does not fit in the fixed-size name field.
	pub fn new(name: &str, num: u64) -> FsResult<Self> {
		let bytes = name.as_bytes();
		if bytes.is_empty() || bytes.len() >= MAX_NAME {
			return Err(FsError::InvalidName);
		}

		let mut entry = Self::zeroed();
		entry.name[..bytes.len()].copy_from_slice(bytes);
		entry.num = num as _;
		Ok(entry)
	}

	/// Returns the entry's name.
	///
	/// A corrupted (non-UTF-8) name reads as empty, which makes the slot
	/// invisible to lookups.
	pub fn name(&self) -> &str {
		let len = self.name.iter().position(|b| *b == 0).unwrap_or(MAX_NAME);
		std::str::from_utf8(&self.name[..len]).unwrap_or("")
	}

	/// Tells whether the slot is free.
	pub fn is_free(&self) -> bool {
		self.name[0] == 0
	}
}

/// The byte offsets of every region of a freshly formatted volume.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
	/// The byte offset of the inode bitmap.
	pub i_bitmap_ptr: u64,
	/// The byte offset of the data bitmap.
	pub d_bitmap_ptr: u64,
	/// The byte offset of the inode table.
	pub i_blocks_ptr: u64,
	/// The byte offset of the data region.
	pub d_blocks_ptr: u64,
	/// The total size of the filesystem in bytes.
	pub total_size: u64,
}

impl Layout {
	/// Computes the layout for the given capacities.
	///
	/// The bitmaps follow the superblock directly; the inode table starts
	/// at the next block boundary after them.
	pub fn compute(num_inodes: u64, num_data_blocks: u64) -> Self {
		let mut offset = SB_SIZE;

		let i_bitmap_ptr = offset;
		offset += ceil_division(num_inodes, 8);

		let d_bitmap_ptr = offset;
		offset += ceil_division(num_data_blocks, 8);

		offset = round_up(offset, BLOCK_SIZE);

		let i_blocks_ptr = offset;
		offset += num_inodes * INODE_SIZE;

		let d_blocks_ptr = offset;
		offset += num_data_blocks * BLOCK_SIZE;

		Self {
			i_bitmap_ptr,
			d_bitmap_ptr,
			i_blocks_ptr,
			d_blocks_ptr,
			total_size: offset,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn record_sizes() {
		assert_eq!(size_of::<Superblock>(), 344);
		assert_eq!(size_of::<Inode>(), 112);
		assert_eq!(size_of::<Dentry>(), 32);
		assert_eq!(ENTRIES_PER_BLOCK, 16);
		assert_eq!(INDIRECT_BLOCK_ENTRIES, 64);
	}

	#[test]
	fn layout_32_inodes_64_blocks() {
		let layout = Layout::compute(32, 64);

		assert_eq!(layout.i_bitmap_ptr, 344);
		assert_eq!(layout.d_bitmap_ptr, 348);
		// Bitmaps end at 356, padded to the next block boundary
		assert_eq!(layout.i_blocks_ptr, 512);
		assert_eq!(layout.d_blocks_ptr, 512 + 32 * 512);
		assert_eq!(layout.total_size, 512 + 32 * 512 + 64 * 512);
	}

	#[test]
	fn disk_tags() {
		assert_eq!(&disk_tag(0)[..10], b"DISK_0001\0");
		assert_eq!(&disk_tag(9)[..10], b"DISK_0010\0");
	}

	#[test]
	fn dentry_names() {
		let entry = Dentry::new("hello", 3).unwrap();
		assert_eq!(entry.name(), "hello");
		assert_eq!(entry.num, 3);
		assert!(!entry.is_free());

		assert!(Dentry::new("", 0).is_err());
		// 27 bytes is the longest storable name
		assert!(Dentry::new(&"a".repeat(27), 0).is_ok());
		assert!(Dentry::new(&"a".repeat(28), 0).is_err());

		assert!(Dentry::zeroed().is_free());
	}
}
