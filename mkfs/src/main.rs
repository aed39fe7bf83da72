//! The `mkfs.wfs` tool initializes a WFS volume on a set of disk images.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use wfs::format::format_disks;
use wfs::RaidMode;

/// Formats a set of disk images as a single WFS volume.
#[derive(Parser)]
#[command(name = "mkfs.wfs")]
struct Args {
	/// The RAID mode: `0` (stripe), `1` (mirror) or `1v` (mirror with
	/// majority reads).
	#[arg(short = 'r', value_name = "MODE")]
	raid: String,

	/// A disk image of the volume. Repeat for each disk.
	#[arg(short = 'd', value_name = "DISK", required = true)]
	disks: Vec<PathBuf>,

	/// The number of inodes (rounded up to a multiple of 32).
	#[arg(short = 'i', value_name = "INODES")]
	inodes: u64,

	/// The number of data blocks (rounded up to a multiple of 32).
	#[arg(short = 'b', value_name = "BLOCKS")]
	blocks: u64,
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();

	let raid = args.raid.parse::<RaidMode>().map_err(anyhow::Error::msg)?;

	format_disks(raid, &args.disks, args.inodes, args.blocks)
		.context("cannot create filesystem")?;
	Ok(())
}
