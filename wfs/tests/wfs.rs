//! End-to-end tests driving the library API against temporary disk images.

use std::fs;
use std::fs::File;
use std::path::PathBuf;
use tempfile::TempDir;
use wfs::error::FsError;
use wfs::format::format_disks;
use wfs::layout::Layout;
use wfs::layout::Superblock;
use wfs::layout::BLOCK_SIZE;
use wfs::layout::DENTRY_SIZE;
use wfs::layout::D_BLOCK;
use wfs::layout::INDIRECT_BLOCK_ENTRIES;
use wfs::layout::IND_BLOCK;
use wfs::RaidMode;
use wfs::Wfs;

const FILE_MODE: u32 = libc::S_IFREG | 0o644;
const DIR_MODE: u32 = 0o755;

/// Creates `count` zeroed disk images of `size` bytes in `dir`.
fn make_disks(dir: &TempDir, count: usize, size: u64) -> Vec<PathBuf> {
	(0..count)
		.map(|i| {
			let path = dir.path().join(format!("disk{i}.img"));
			let file = File::create(&path).unwrap();
			file.set_len(size).unwrap();
			path
		})
		.collect()
}

/// Formats a fresh volume and returns the image paths.
///
/// `inodes` and `blocks` should already be multiples of 32 so the image
/// size can be computed directly from them.
fn setup(raid: &str, count: usize, inodes: u64, blocks: u64) -> (TempDir, Vec<PathBuf>) {
	let dir = tempfile::tempdir().unwrap();
	let layout = Layout::compute(inodes, blocks);
	let disks = make_disks(&dir, count, layout.total_size);

	let raid: RaidMode = raid.parse().unwrap();
	format_disks(raid, &disks, inodes, blocks).unwrap();
	(dir, disks)
}

/// Opens the volume and bootstraps the root directory.
fn mount(disks: &[PathBuf]) -> Wfs {
	let mut fs = Wfs::open(disks).unwrap();
	fs.init_root().unwrap();
	fs
}

/// Reads the superblock copy of a disk image.
fn read_superblock(path: &PathBuf) -> Superblock {
	let bytes = fs::read(path).unwrap();
	bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<Superblock>()])
}

/// Returns the bitmap regions (inode bitmap + data bitmap) of a disk image.
fn read_bitmaps(path: &PathBuf) -> Vec<u8> {
	let sb = read_superblock(path);
	let bytes = fs::read(path).unwrap();
	bytes[sb.i_bitmap_ptr as usize..(sb.d_bitmap_ptr + sb.d_bitmap_size()) as usize].to_vec()
}

#[test]
fn format_writes_rounded_counts() {
	let dir = tempfile::tempdir().unwrap();
	let layout = Layout::compute(32, 32);
	let disks = make_disks(&dir, 2, layout.total_size);

	format_disks(RaidMode::Mirror, &disks, 1, 17).unwrap();

	let sb = read_superblock(&disks[0]);
	assert_eq!(sb.num_inodes, 32);
	assert_eq!(sb.num_data_blocks, 32);
	assert_eq!(sb.num_disks, 2);
	assert_eq!(sb.raid_mode, 1);
	assert_eq!(&sb.disk_order[0][..10], b"DISK_0001\0");
	assert_eq!(&sb.disk_order[1][..10], b"DISK_0002\0");

	// Identical superblock on every disk
	assert_eq!(bytemuck::bytes_of(&sb), bytemuck::bytes_of(&read_superblock(&disks[1])));
}

#[test]
fn format_requires_two_disks() {
	let dir = tempfile::tempdir().unwrap();
	let disks = make_disks(&dir, 1, 1 << 20);

	for raid in [RaidMode::Stripe, RaidMode::Mirror, RaidMode::MirrorVote] {
		assert!(format_disks(raid, &disks, 32, 64).is_err());
	}
}

#[test]
fn format_rejects_small_images() {
	let dir = tempfile::tempdir().unwrap();
	let layout = Layout::compute(32, 64);
	let disks = make_disks(&dir, 2, layout.total_size - 1);

	assert!(format_disks(RaidMode::Mirror, &disks, 32, 64).is_err());
}

#[test]
fn mount_rejects_wrong_disk_count() {
	let (_dir, disks) = setup("1", 3, 32, 64);
	assert!(Wfs::open(&disks[..2]).is_err());
}

#[test]
fn mount_rejects_mismatched_superblocks() {
	let (_dir, disks) = setup("1", 2, 32, 64);

	// Flip one byte inside the second disk's superblock
	let mut bytes = fs::read(&disks[1]).unwrap();
	bytes[8] ^= 0xff;
	fs::write(&disks[1], bytes).unwrap();

	assert!(Wfs::open(&disks).is_err());
}

#[test]
fn mount_accepts_any_supplied_order() {
	let (_dir, disks) = setup("1", 3, 32, 64);

	let mut shuffled = disks.clone();
	shuffled.reverse();
	let mut fs = Wfs::open(&shuffled).unwrap();
	fs.init_root().unwrap();
	fs.mknod("/f", FILE_MODE).unwrap();
	assert_eq!(fs.write("/f", b"abc", 0).unwrap(), 3);
	assert_eq!(fs.read("/f", 0, 3).unwrap(), b"abc");
}

#[test]
fn write_read_roundtrip_survives_remount() {
	let (_dir, disks) = setup("1", 2, 32, 64);

	{
		let mut fs = mount(&disks);
		fs.mkdir("/a", DIR_MODE).unwrap();
		fs.mknod("/a/f", FILE_MODE).unwrap();
		assert_eq!(fs.write("/a/f", b"hello\0world", 0).unwrap(), 11);
	}

	let fs = mount(&disks);
	assert_eq!(fs.read("/a/f", 0, 11).unwrap(), b"hello\0world");
	assert_eq!(fs.getattr("/a/f").unwrap().size, 11);

	// In mirror mode the images stay byte-identical
	drop(fs);
	assert_eq!(fs::read(&disks[0]).unwrap(), fs::read(&disks[1]).unwrap());
}

#[test]
fn getattr_reports_inode_fields() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	let root = fs.getattr("/").unwrap();
	assert!(root.is_dir());
	assert_eq!(root.num, 0);
	assert_eq!(root.nlinks, 2);
	assert_eq!(root.size as u64, 2 * DENTRY_SIZE);

	fs.mknod("/f", FILE_MODE).unwrap();
	let inode = fs.getattr("/f").unwrap();
	assert!(inode.is_reg());
	assert_eq!(inode.nlinks, 1);
	assert_eq!(inode.size, 0);

	assert_eq!(fs.getattr("/missing").unwrap_err(), FsError::NoEntry);
	assert_eq!(fs.getattr("/f/x").unwrap_err(), FsError::NotDirectory);
}

#[test]
fn read_clamps_and_stops_at_holes() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mknod("/f", FILE_MODE).unwrap();
	fs.write("/f", b"0123456789", 0).unwrap();

	assert_eq!(fs.read("/f", 0, 100).unwrap(), b"0123456789");
	assert_eq!(fs.read("/f", 4, 3).unwrap(), b"456");
	assert_eq!(fs.read("/f", 10, 1).unwrap(), b"");
	assert_eq!(fs.read("/f", 100, 1).unwrap(), b"");

	// A write past the first block leaves a hole; reads from the start
	// stop at it
	fs.mknod("/sparse", FILE_MODE).unwrap();
	fs.write("/sparse", b"tail", 2 * BLOCK_SIZE).unwrap();
	assert_eq!(fs.read("/sparse", 0, 16).unwrap(), b"");
	assert_eq!(fs.read("/sparse", 2 * BLOCK_SIZE, 4).unwrap(), b"tail");

	assert_eq!(fs.read("/", 0, 1).unwrap_err(), FsError::IsDirectory);
}

#[test]
fn write_within_block_splices() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mknod("/f", FILE_MODE).unwrap();
	fs.write("/f", b"aaaaaaaaaa", 0).unwrap();
	fs.write("/f", b"BB", 4).unwrap();

	assert_eq!(fs.read("/f", 0, 10).unwrap(), b"aaaaBBaaaa");
	assert_eq!(fs.getattr("/f").unwrap().size, 10);
}

#[test]
fn indirect_boundary() {
	let (_dir, disks) = setup("1", 2, 32, 96);
	let mut fs = mount(&disks);

	// The last direct byte does not allocate an indirect block
	fs.mknod("/f", FILE_MODE).unwrap();
	fs.write("/f", b"x", D_BLOCK as u64 * BLOCK_SIZE - 1).unwrap();
	assert_eq!(fs.getattr("/f").unwrap().blocks[IND_BLOCK], 0);

	// The next byte does
	fs.write("/f", b"y", D_BLOCK as u64 * BLOCK_SIZE).unwrap();
	assert_ne!(fs.getattr("/f").unwrap().blocks[IND_BLOCK], 0);

	assert_eq!(fs.read("/f", D_BLOCK as u64 * BLOCK_SIZE - 1, 2).unwrap(), b"xy");
}

#[test]
fn write_past_last_block_fails_efbig() {
	let (_dir, disks) = setup("1", 2, 32, 96);
	let mut fs = mount(&disks);

	let last = (D_BLOCK + INDIRECT_BLOCK_ENTRIES) as u64 * BLOCK_SIZE;

	fs.mknod("/f", FILE_MODE).unwrap();
	assert_eq!(fs.write("/f", b"z", last - 1).unwrap(), 1);
	assert_eq!(fs.write("/f", b"z", last).unwrap_err(), FsError::FileTooBig);

	// A write straddling the limit fails without growing the file
	let size_before = fs.getattr("/f").unwrap().size;
	assert_eq!(fs.write("/f", &[0u8; 1024], last - 512).unwrap_err(), FsError::FileTooBig);
	assert_eq!(fs.getattr("/f").unwrap().size, size_before);
}

#[test]
fn indirect_write_roundtrip() {
	let (_dir, disks) = setup("1", 2, 32, 96);
	let mut fs = mount(&disks);

	// 20 blocks crosses well into the indirect range
	let data: Vec<u8> = (0..20 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
	fs.mknod("/big", FILE_MODE).unwrap();
	assert_eq!(fs.write("/big", &data, 0).unwrap(), data.len());
	assert_eq!(fs.read("/big", 0, data.len()).unwrap(), data);
	assert_eq!(
		fs.read("/big", 7 * BLOCK_SIZE + 3, 1000).unwrap(),
		&data[(7 * BLOCK_SIZE + 3) as usize..][..1000]
	);
}

#[test]
fn unlink_restores_bitmaps() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	// The first create allocates the root's dentry block, which stays with
	// the root; snapshot after it so the round trip is exact
	fs.mknod("/keep", FILE_MODE).unwrap();
	let before = read_bitmaps(&disks[0]);

	fs.mknod("/f", FILE_MODE).unwrap();
	let data = vec![7u8; 9 * BLOCK_SIZE as usize];
	fs.write("/f", &data, 0).unwrap();
	assert_ne!(read_bitmaps(&disks[0]), before);

	fs.unlink("/f").unwrap();
	assert_eq!(read_bitmaps(&disks[0]), before);

	assert_eq!(fs.getattr("/f").unwrap_err(), FsError::NoEntry);
	assert_eq!(fs.unlink("/f").unwrap_err(), FsError::NoEntry);
}

#[test]
fn mkdir_rmdir_restores_bitmaps() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	// Prime the root's dentry block so it is not part of the round trip
	fs.mkdir("/keep", DIR_MODE).unwrap();
	let before = read_bitmaps(&disks[0]);

	fs.mkdir("/d", DIR_MODE).unwrap();
	fs.rmdir("/d").unwrap();

	assert_eq!(read_bitmaps(&disks[0]), before);
}

#[test]
fn bitmaps_mirrored_in_every_mode() {
	for raid in ["0", "1", "1v"] {
		let (_dir, disks) = setup(raid, 3, 32, 64);
		let mut fs = mount(&disks);

		fs.mkdir("/d", DIR_MODE).unwrap();
		fs.mknod("/d/f", FILE_MODE).unwrap();
		fs.write("/d/f", &[1u8; 2000], 0).unwrap();

		let reference = read_bitmaps(&disks[0]);
		for disk in &disks[1..] {
			assert_eq!(read_bitmaps(disk), reference, "raid {raid}");
		}
	}
}

#[test]
fn unlink_rejects_directories() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mkdir("/d", DIR_MODE).unwrap();
	assert_eq!(fs.unlink("/d").unwrap_err(), FsError::IsDirectory);
	assert_eq!(fs.rmdir("/d").unwrap(), 1);
}

#[test]
fn rmdir_requires_empty_directory() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mkdir("/d", DIR_MODE).unwrap();
	fs.mknod("/d/x", FILE_MODE).unwrap();

	assert_eq!(fs.rmdir("/d").unwrap_err(), FsError::NotEmpty);
	assert_eq!(fs.rmdir("/x").unwrap_err(), FsError::NoEntry);
	assert_eq!(fs.rmdir("/d/x").unwrap_err(), FsError::NotDirectory);

	let nlinks_before = fs.getattr("/").unwrap().nlinks;
	fs.unlink("/d/x").unwrap();
	fs.rmdir("/d").unwrap();
	assert_eq!(fs.getattr("/").unwrap().nlinks, nlinks_before - 1);
}

#[test]
fn mknod_rejects_duplicates_and_bad_names() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mknod("/f", FILE_MODE).unwrap();
	assert_eq!(fs.mknod("/f", FILE_MODE).unwrap_err(), FsError::Exists);
	assert_eq!(fs.mkdir("/f", DIR_MODE).unwrap_err(), FsError::Exists);
	assert_eq!(fs.mknod("/", FILE_MODE).unwrap_err(), FsError::Exists);

	let long = format!("/{}", "n".repeat(28));
	assert_eq!(fs.mknod(&long, FILE_MODE).unwrap_err(), FsError::InvalidName);

	assert_eq!(fs.mknod("/missing/f", FILE_MODE).unwrap_err(), FsError::NoEntry);
	assert_eq!(fs.mknod("/f/x", FILE_MODE).unwrap_err(), FsError::NotDirectory);
}

#[test]
fn freed_inode_is_reused_first_fit() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	for i in 0..16 {
		let inode = fs.mknod(&format!("/f{i}"), FILE_MODE).unwrap();
		assert_eq!(inode.num as u64, i + 1);
	}

	fs.unlink("/f7").unwrap();

	// The freed slot is taken again; the dentry appends at the logical end
	let size_before = fs.getattr("/").unwrap().size;
	let inode = fs.mknod("/g", FILE_MODE).unwrap();
	assert_eq!(inode.num, 8);
	assert_eq!(fs.getattr("/").unwrap().size, size_before + DENTRY_SIZE as i64);

	let names: Vec<String> = fs.readdir("/").unwrap().into_iter().map(|e| e.name).collect();
	assert_eq!(names.len(), 2 + 16);
	assert_eq!(&names[..2], &[".".to_owned(), "..".to_owned()]);
	assert!(names.contains(&"g".to_owned()));
	assert!(!names.contains(&"f7".to_owned()));
}

#[test]
fn readdir_synthesizes_dot_entries() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	fs.mkdir("/d", DIR_MODE).unwrap();
	fs.mknod("/d/f", FILE_MODE).unwrap();

	// A fresh directory holds no entries on disk, yet lists `.` and `..`
	let entries = fs.readdir("/d").unwrap();
	let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
	assert_eq!(names, [".", "..", "f"]);
	assert!(entries[0].mode & libc::S_IFDIR != 0);
	assert!(entries[2].mode & libc::S_IFREG != 0);

	assert_eq!(fs.readdir("/d/f").unwrap_err(), FsError::NotDirectory);
}

#[test]
fn space_exhaustion_reports_enospc() {
	let (_dir, disks) = setup("1", 2, 32, 32);
	let mut fs = mount(&disks);

	// 31 allocatable blocks: one for the root's entries, then 6 direct +
	// the indirect block + 23 pointed blocks for the file
	fs.mknod("/f", FILE_MODE).unwrap();
	let data = vec![3u8; 32 * BLOCK_SIZE as usize];
	let written = fs.write("/f", &data, 0).unwrap();
	assert_eq!(written, 29 * BLOCK_SIZE as usize);
	assert_eq!(fs.getattr("/f").unwrap().size as usize, written);

	// Nothing left for anyone
	assert_eq!(fs.write("/f", b"x", written as u64).unwrap_err(), FsError::NoSpace);
	fs.mknod("/g", FILE_MODE).unwrap();
	assert_eq!(fs.write("/g", b"x", 0).unwrap_err(), FsError::NoSpace);

	// Freeing the big file makes room again
	fs.unlink("/f").unwrap();
	assert_eq!(fs.write("/g", b"x", 0).unwrap(), 1);
}

#[test]
fn inode_exhaustion_reports_enospc() {
	let (_dir, disks) = setup("1", 2, 32, 64);
	let mut fs = mount(&disks);

	// Inode 0 is the root; 31 remain
	for i in 0..31 {
		fs.mknod(&format!("/f{i}"), FILE_MODE).unwrap();
	}
	assert_eq!(fs.mknod("/overflow", FILE_MODE).unwrap_err(), FsError::NoSpace);

	// The failed create must not leak a dentry
	assert_eq!(fs.getattr("/overflow").unwrap_err(), FsError::NoEntry);
}

#[test]
fn stripe_places_blocks_round_robin() {
	let (_dir, disks) = setup("0", 3, 32, 96);
	let mut fs = mount(&disks);

	let data: Vec<u8> = (0..1600u64).map(|i| (i % 241) as u8).collect();
	fs.mknod("/big", FILE_MODE).unwrap();
	assert_eq!(fs.write("/big", &data, 0).unwrap(), 1600);
	assert_eq!(fs.read("/big", 0, 1600).unwrap(), data);

	let sb = *fs.superblock();
	let inode = fs.getattr("/big").unwrap();
	drop(fs);

	let images: Vec<Vec<u8>> = disks.iter().map(|p| fs::read(p).unwrap()).collect();
	for (i, chunk) in data.chunks(BLOCK_SIZE as usize).enumerate() {
		let blk = inode.blocks[i] as u64;
		assert_ne!(blk, 0);

		let disk = (blk % 3) as usize;
		let off = (sb.d_blocks_ptr + blk / 3 * BLOCK_SIZE) as usize;
		assert_eq!(&images[disk][off..off + chunk.len()], chunk, "file block {i}");
	}
}

#[test]
fn mirror_vote_outvotes_corrupted_disk() {
	let (_dir, disks) = setup("1v", 3, 32, 64);

	let data = vec![0xabu8; 4096];
	let (sb, first_block) = {
		let mut fs = mount(&disks);
		fs.mknod("/mv", FILE_MODE).unwrap();
		assert_eq!(fs.write("/mv", &data, 0).unwrap(), data.len());
		(*fs.superblock(), fs.getattr("/mv").unwrap().blocks[0] as u64)
	};

	// Corrupt one byte of the first file block on disk 1
	let off = (sb.d_blocks_ptr + first_block * BLOCK_SIZE) as usize;
	let mut bytes = fs::read(&disks[1]).unwrap();
	bytes[off + 100] ^= 0xff;
	fs::write(&disks[1], bytes).unwrap();

	// Disks 0 and 2 still agree, so reads return the clean data
	let fs = mount(&disks);
	assert_eq!(fs.read("/mv", 0, data.len()).unwrap(), data);
}

#[test]
fn mirror_mode_keeps_data_identical_across_disks() {
	let (_dir, disks) = setup("1", 3, 32, 64);

	{
		let mut fs = mount(&disks);
		fs.mkdir("/d", DIR_MODE).unwrap();
		fs.mknod("/d/f", FILE_MODE).unwrap();
		fs.write("/d/f", &vec![9u8; 3000], 0).unwrap();
		fs.unlink("/d/f").unwrap();
		fs.mknod("/d/g", FILE_MODE).unwrap();
		fs.write("/d/g", b"final", 0).unwrap();
	}

	let reference = fs::read(&disks[0]).unwrap();
	for disk in &disks[1..] {
		assert_eq!(fs::read(disk).unwrap(), reference);
	}
}
