//! The `wfs` daemon mounts a WFS volume assembled from several disk images.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use fuser::MountOption;
use log::debug;
use log::info;
use std::path::PathBuf;
use wfs::fuse::WfsFuse;
use wfs::Wfs;

/// Mounts a WFS volume.
#[derive(Parser)]
#[command(name = "wfs", about = "Mount a WFS volume built from several disk images")]
struct Args {
	/// Run in the foreground. The daemon never detaches, so this is the
	/// only behavior; the flag is accepted for familiarity.
	#[arg(short = 'f')]
	foreground: bool,

	/// Additional mount options, passed through to the FUSE host.
	#[arg(short = 'o', value_name = "OPTION")]
	options: Vec<String>,

	/// The volume's disk images, in any order, followed by the mount point.
	#[arg(required = true, num_args = 2.., value_name = "DISK... MOUNTPOINT")]
	args: Vec<PathBuf>,
}

fn main() -> Result<()> {
	env_logger::init();
	let args = Args::parse();
	if !args.foreground {
		debug!("running in the foreground anyway; the daemon does not detach");
	}

	// `num_args` guarantees at least one disk before the mount point
	let (mountpoint, disks) = args.args.split_last().unwrap();

	let fs = Wfs::open(disks).context("cannot open volume")?;
	info!(
		"mounting {} disks in RAID mode {} on {}",
		fs.superblock().num_disks,
		fs.raid_mode(),
		mountpoint.display()
	);

	let mut options = vec![MountOption::FSName("wfs".to_owned())];
	options.extend(args.options.iter().cloned().map(MountOption::CUSTOM));

	fuser::mount2(WfsFuse::new(fs), mountpoint, &options).context("cannot mount filesystem")?;
	Ok(())
}
