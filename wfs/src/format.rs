//! Formatting of a new volume onto a set of disk images.
//!
//! Every disk receives the same superblock (including the canonical
//! ordering tags), an inode bitmap with only the root inode marked, an
//! empty data bitmap and the root inode record. The rest of the image is
//! left untouched.

use crate::layout::disk_tag;
use crate::layout::Inode;
use crate::layout::Layout;
use crate::layout::Superblock;
use crate::layout::COUNT_ALIGN;
use crate::layout::MAX_DISKS;
use crate::raid::RaidMode;
use bytemuck::bytes_of;
use bytemuck::Zeroable;
use std::fs::OpenOptions;
use std::io;
use std::io::Error;
use std::io::ErrorKind;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::path::PathBuf;
use utils::disk::get_disk_size;
use utils::util::ceil_division;
use utils::util::get_timestamp;
use utils::util::round_up;

/// Formats `disks` as a single volume in the given RAID mode.
///
/// Both counts are rounded up to the next multiple of [`COUNT_ALIGN`]. The
/// computed filesystem extent must fit on every image.
pub fn format_disks(
	raid: RaidMode,
	disks: &[PathBuf],
	num_inodes: u64,
	num_data_blocks: u64,
) -> io::Result<()> {
	if disks.len() < raid.min_disks() {
		return Err(Error::new(
			ErrorKind::InvalidInput,
			format!(
				"RAID mode {raid} requires at least {} disks, got {}",
				raid.min_disks(),
				disks.len()
			),
		));
	}
	if disks.len() > MAX_DISKS {
		return Err(Error::new(
			ErrorKind::InvalidInput,
			format!("too many disks specified (max {MAX_DISKS})"),
		));
	}
	if num_inodes == 0 || num_data_blocks == 0 {
		return Err(Error::new(
			ErrorKind::InvalidInput,
			"inode and data block counts must be positive",
		));
	}

	let num_inodes = round_up(num_inodes, COUNT_ALIGN);
	let num_data_blocks = round_up(num_data_blocks, COUNT_ALIGN);
	let layout = Layout::compute(num_inodes, num_data_blocks);

	for path in disks {
		let size = get_disk_size(path)
			.map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.display())))?;
		if size < layout.total_size {
			return Err(Error::new(
				ErrorKind::InvalidData,
				format!(
					"{}: image too small ({size} < {} bytes)",
					path.display(),
					layout.total_size
				),
			));
		}
	}

	let mut sb = Superblock::zeroed();
	sb.num_inodes = num_inodes;
	sb.num_data_blocks = num_data_blocks;
	sb.i_bitmap_ptr = layout.i_bitmap_ptr;
	sb.d_bitmap_ptr = layout.d_bitmap_ptr;
	sb.i_blocks_ptr = layout.i_blocks_ptr;
	sb.d_blocks_ptr = layout.d_blocks_ptr;
	sb.raid_mode = raid.as_raw();
	sb.num_disks = disks.len() as i32;
	for i in 0..disks.len() {
		sb.disk_order[i] = disk_tag(i);
	}

	let uid = unsafe { libc::getuid() };
	let gid = unsafe { libc::getgid() };
	let now = get_timestamp().as_secs() as i64;
	let root = Inode::new(0, libc::S_IFDIR | 0o755, uid, gid, 2, now);

	// Inode 0 is the root directory
	let mut i_bitmap = vec![0u8; ceil_division(num_inodes, 8) as usize];
	i_bitmap[0] = 0x01;
	let d_bitmap = vec![0u8; ceil_division(num_data_blocks, 8) as usize];

	for path in disks {
		let mut file = OpenOptions::new()
			.write(true)
			.open(path)
			.map_err(|e| Error::new(e.kind(), format!("{}: {e}", path.display())))?;

		file.seek(SeekFrom::Start(0))?;
		file.write_all(bytes_of(&sb))?;

		file.seek(SeekFrom::Start(layout.i_bitmap_ptr))?;
		file.write_all(&i_bitmap)?;

		file.seek(SeekFrom::Start(layout.d_bitmap_ptr))?;
		file.write_all(&d_bitmap)?;

		file.seek(SeekFrom::Start(layout.i_blocks_ptr))?;
		file.write_all(bytes_of(&root))?;
	}

	Ok(())
}
