//! Placement of data blocks across the disks of a volume.
//!
//! Every data-region access goes through [`Wfs::read_block`] and
//! [`Wfs::write_block`], which translate a logical block number into byte
//! ranges on the mapped disks according to the active RAID mode.

use crate::error::FsError;
use crate::error::FsResult;
use crate::fs::Wfs;
use crate::layout::BLOCK_SIZE;
use std::fmt;
use std::str::FromStr;

/// The placement policy of a volume, fixed at format time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RaidMode {
	/// Each block lives on exactly one disk, selected round-robin.
	Stripe,
	/// Every disk holds a full copy; reads come from disk 0.
	Mirror,
	/// Like `Mirror`, but reads return the copy agreeing with the most
	/// other disks.
	MirrorVote,
}

impl RaidMode {
	/// Decodes the raw superblock value.
	pub fn from_raw(n: i32) -> Option<Self> {
		match n {
			0 => Some(Self::Stripe),
			1 => Some(Self::Mirror),
			2 => Some(Self::MirrorVote),
			_ => None,
		}
	}

	/// Returns the value stored in the superblock.
	pub fn as_raw(self) -> i32 {
		match self {
			Self::Stripe => 0,
			Self::Mirror => 1,
			Self::MirrorVote => 2,
		}
	}

	/// Returns the minimum number of disks the mode requires.
	pub fn min_disks(self) -> usize {
		2
	}
}

impl FromStr for RaidMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"0" => Ok(Self::Stripe),
			"1" => Ok(Self::Mirror),
			"1v" => Ok(Self::MirrorVote),
			_ => Err(format!("invalid RAID mode `{s}` (expected 0, 1 or 1v)")),
		}
	}
}

impl fmt::Display for RaidMode {
	fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Stripe => "0",
			Self::Mirror => "1",
			Self::MirrorVote => "1v",
		};
		write!(fmt, "{s}")
	}
}

impl Wfs {
	/// Returns the disk index and byte offset of logical block `blk` in
	/// stripe mode.
	fn stripe_location(&self, blk: u64) -> (usize, u64) {
		let num_disks = self.disks.count() as u64;
		let disk = (blk % num_disks) as usize;
		let stripe = blk / num_disks;
		(disk, self.sb.d_blocks_ptr + stripe * BLOCK_SIZE)
	}

	/// Reads the first `buf.len()` bytes of logical data block `blk` into
	/// `buf`.
	pub(crate) fn read_block(&self, blk: u64, buf: &mut [u8]) -> FsResult<()> {
		debug_assert!(buf.len() <= BLOCK_SIZE as usize);
		if blk >= self.sb.num_data_blocks {
			return Err(FsError::Io);
		}

		match self.raid {
			RaidMode::Stripe => {
				let (disk, off) = self.stripe_location(blk);
				buf.copy_from_slice(self.disks.read_at(disk, off, buf.len()));
			}
			RaidMode::Mirror => {
				let off = self.sb.d_blocks_ptr + blk * BLOCK_SIZE;
				buf.copy_from_slice(self.disks.read_at(0, off, buf.len()));
			}
			RaidMode::MirrorVote => {
				let off = self.sb.d_blocks_ptr + blk * BLOCK_SIZE;
				let winner = self.vote(off, buf.len());
				buf.copy_from_slice(self.disks.read_at(winner, off, buf.len()));
			}
		}
		Ok(())
	}

	/// Writes `buf` to the beginning of logical data block `blk`.
	pub(crate) fn write_block(&mut self, blk: u64, buf: &[u8]) -> FsResult<()> {
		debug_assert!(buf.len() <= BLOCK_SIZE as usize);
		if blk >= self.sb.num_data_blocks {
			return Err(FsError::Io);
		}

		match self.raid {
			RaidMode::Stripe => {
				let (disk, off) = self.stripe_location(blk);
				self.disks.write_at(disk, off, buf);
			}
			RaidMode::Mirror | RaidMode::MirrorVote => {
				let off = self.sb.d_blocks_ptr + blk * BLOCK_SIZE;
				self.disks.write_all_disks(off, buf);
			}
		}
		Ok(())
	}

	/// Returns the index of the disk whose copy of the `len` bytes at `off`
	/// agrees with the most other disks. Ties go to the lowest index.
	fn vote(&self, off: u64, len: usize) -> usize {
		let num_disks = self.disks.count();
		let mut counts = vec![0usize; num_disks];

		for i in 0..num_disks {
			for j in i + 1..num_disks {
				let a = self.disks.read_at(i, off, len);
				let b = self.disks.read_at(j, off, len);
				if a == b {
					counts[i] += 1;
					counts[j] += 1;
				}
			}
		}

		let mut winner = 0;
		for (i, count) in counts.iter().enumerate() {
			if *count > counts[winner] {
				winner = i;
			}
		}
		winner
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn raw_roundtrip() {
		for mode in [RaidMode::Stripe, RaidMode::Mirror, RaidMode::MirrorVote] {
			assert_eq!(RaidMode::from_raw(mode.as_raw()), Some(mode));
		}
		assert_eq!(RaidMode::from_raw(3), None);
		assert_eq!(RaidMode::from_raw(-1), None);
	}

	#[test]
	fn parse() {
		assert_eq!("0".parse::<RaidMode>(), Ok(RaidMode::Stripe));
		assert_eq!("1".parse::<RaidMode>(), Ok(RaidMode::Mirror));
		assert_eq!("1v".parse::<RaidMode>(), Ok(RaidMode::MirrorVote));
		assert!("2".parse::<RaidMode>().is_err());
		assert!("raid1".parse::<RaidMode>().is_err());
	}
}
