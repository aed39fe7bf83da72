//! Memory-mapped access to the disk images backing a volume.
//!
//! The images are mapped shared read/write for the lifetime of the mount;
//! dropping a [`DiskImage`] unmaps it. The kernel page cache is responsible
//! for writing dirty pages back to the files.

use crate::layout::Superblock;
use crate::layout::MAX_DISKS;
use crate::layout::SB_SIZE;
use bytemuck::pod_read_unaligned;
use log::debug;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::io;
use std::io::Error;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;

/// A single mapped disk image.
pub struct DiskImage {
	/// The path the image was opened from.
	path: PathBuf,
	/// The shared writable mapping of the whole image.
	map: MmapMut,
}

impl DiskImage {
	/// Opens and maps the disk image at `path`.
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let map = unsafe { MmapMut::map_mut(&file)? };

		Ok(Self {
			path: path.to_path_buf(),
			map,
		})
	}

	/// Returns the path the image was opened from.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Returns the size of the mapping in bytes.
	pub fn len(&self) -> u64 {
		self.map.len() as u64
	}

	/// Reads the superblock copy stored on the image.
	fn superblock(&self) -> Superblock {
		pod_read_unaligned(&self.map[..SB_SIZE as usize])
	}
}

/// The ordered set of disks of a mounted volume.
///
/// Disks are held in the canonical order recorded in the superblock at
/// format time, not in the order they were supplied on the command line.
pub struct DiskSet {
	images: Vec<DiskImage>,
}

impl DiskSet {
	/// Maps the given disk images and checks that together they form a
	/// consistent volume.
	///
	/// The function verifies that every superblock is byte-equal to the
	/// first one, that the number of supplied disks matches the format,
	/// that each image covers the filesystem extent, and finally reorders
	/// the images to the canonical order. Returns the superblock along
	/// with the set.
	pub fn open(paths: &[PathBuf]) -> io::Result<(Superblock, Self)> {
		if paths.is_empty() {
			return Err(Error::new(ErrorKind::InvalidInput, "no disks specified"));
		}
		if paths.len() > MAX_DISKS {
			return Err(Error::new(
				ErrorKind::InvalidInput,
				format!("too many disks specified (max {MAX_DISKS})"),
			));
		}

		let mut images = Vec::with_capacity(paths.len());
		for path in paths {
			let image = DiskImage::open(path).map_err(|e| {
				Error::new(e.kind(), format!("{}: {e}", path.display()))
			})?;
			if image.len() < SB_SIZE {
				return Err(Error::new(
					ErrorKind::InvalidData,
					format!("{}: too small to hold a superblock", path.display()),
				));
			}
			images.push(image);
		}

		let sb: Superblock = images[0].superblock();
		for image in &images[1..] {
			let a = &images[0].map[..SB_SIZE as usize];
			let b = &image.map[..SB_SIZE as usize];
			if a != b {
				return Err(Error::new(
					ErrorKind::InvalidData,
					format!(
						"{}: superblock does not match {}",
						image.path().display(),
						images[0].path().display()
					),
				));
			}
		}

		if sb.num_disks as usize != images.len() {
			return Err(Error::new(
				ErrorKind::InvalidData,
				format!(
					"wrong number of disks: expected {}, got {}",
					sb.num_disks,
					images.len()
				),
			));
		}

		let total_size = sb.total_size();
		for image in &images {
			if image.len() < total_size {
				return Err(Error::new(
					ErrorKind::InvalidData,
					format!(
						"{}: image too small for filesystem ({} < {total_size} bytes)",
						image.path().display(),
						image.len()
					),
				));
			}
		}

		let images = reorder(images, &sb)?;
		Ok((sb, Self { images }))
	}

	/// Returns the number of disks in the set.
	pub fn count(&self) -> usize {
		self.images.len()
	}

	/// Returns `len` bytes of disk `disk` starting at byte offset `off`.
	pub fn read_at(&self, disk: usize, off: u64, len: usize) -> &[u8] {
		&self.images[disk].map[off as usize..off as usize + len]
	}

	/// Writes `data` to disk `disk` at byte offset `off`.
	pub fn write_at(&mut self, disk: usize, off: u64, data: &[u8]) {
		let off = off as usize;
		self.images[disk].map[off..off + data.len()].copy_from_slice(data);
	}

	/// Writes `data` at byte offset `off` on every disk of the set.
	pub fn write_all_disks(&mut self, off: u64, data: &[u8]) {
		for disk in 0..self.images.len() {
			self.write_at(disk, off, data);
		}
	}

	/// Flushes every mapping to its backing file.
	pub fn sync(&self) -> io::Result<()> {
		for image in &self.images {
			image.map.flush()?;
		}
		Ok(())
	}
}

/// Reorders `images` to the canonical order recorded in `sb.disk_order`.
///
/// Each supplied disk's identity is the tag stored in its own superblock
/// slot; a tag that cannot be matched to a canonical slot is a fatal error.
fn reorder(images: Vec<DiskImage>, sb: &Superblock) -> io::Result<Vec<DiskImage>> {
	let num_disks = images.len();
	let tags: Vec<_> = images
		.iter()
		.enumerate()
		.map(|(i, image)| image.superblock().disk_order[i])
		.collect();

	let mut slots = Vec::with_capacity(num_disks);
	for slot in 0..num_disks {
		let tag = &sb.disk_order[slot];
		let i = tags.iter().position(|t| t == tag).ok_or_else(|| {
			Error::new(
				ErrorKind::InvalidData,
				format!(
					"no supplied disk carries the ordering tag `{}`",
					String::from_utf8_lossy(tag).trim_end_matches('\0')
				),
			)
		})?;
		slots.push(i);
	}

	let mut images: Vec<_> = images.into_iter().map(Some).collect();
	let mut ordered = Vec::with_capacity(num_disks);
	for (slot, i) in slots.into_iter().enumerate() {
		let image = images[i].take().ok_or_else(|| {
			Error::new(
				ErrorKind::InvalidData,
				"duplicate disk ordering tag across supplied disks",
			)
		})?;
		debug!("disk {}: {}", slot, image.path().display());
		ordered.push(image);
	}

	Ok(ordered)
}
