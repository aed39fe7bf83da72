//! The in-memory state of a mounted volume.

use crate::disk::DiskSet;
use crate::layout::Superblock;
use crate::raid::RaidMode;
use std::io;
use std::io::Error;
use std::io::ErrorKind;
use std::path::PathBuf;

/// A mounted WFS volume.
///
/// The structure owns the mapped disk images; all on-disk structures are
/// read and written through it. Operations assume they are executed by a
/// single caller at a time.
pub struct Wfs {
	/// The superblock, identical on every disk.
	pub(crate) sb: Superblock,
	/// The active RAID mode.
	pub(crate) raid: RaidMode,
	/// The disks, in canonical order.
	pub(crate) disks: DiskSet,
}

impl Wfs {
	/// Opens the volume backed by the given disk images.
	///
	/// The images may be supplied in any order; they are verified and
	/// rearranged to the order recorded at format time.
	pub fn open(paths: &[PathBuf]) -> io::Result<Self> {
		let (sb, disks) = DiskSet::open(paths)?;
		let raid = RaidMode::from_raw(sb.raid_mode).ok_or_else(|| {
			Error::new(
				ErrorKind::InvalidData,
				format!("unknown RAID mode {}", sb.raid_mode),
			)
		})?;

		Ok(Self { sb, raid, disks })
	}

	/// Returns the volume's superblock.
	pub fn superblock(&self) -> &Superblock {
		&self.sb
	}

	/// Returns the active RAID mode.
	pub fn raid_mode(&self) -> RaidMode {
		self.raid
	}

	/// Flushes all mappings to the backing files.
	pub fn sync(&self) -> io::Result<()> {
		self.disks.sync()
	}
}
