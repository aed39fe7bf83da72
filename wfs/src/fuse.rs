//! The FUSE host glue.
//!
//! The kernel addresses files by inode number while the core operations
//! take paths, so the adapter keeps a table mapping the inode numbers it
//! has handed out back to the paths they were looked up under. FUSE inode
//! numbers are the on-disk inode numbers shifted by one, since the FUSE
//! root is 1 and the WFS root is 0.

use crate::fs::Wfs;
use crate::layout::Inode;
use crate::layout::BLOCK_SIZE;
use fuser::FileAttr;
use fuser::FileType;
use fuser::Filesystem;
use fuser::KernelConfig;
use fuser::ReplyAttr;
use fuser::ReplyData;
use fuser::ReplyDirectory;
use fuser::ReplyEmpty;
use fuser::ReplyEntry;
use fuser::ReplyWrite;
use fuser::Request;
use fuser::FUSE_ROOT_ID;
use libc::c_int;
use log::debug;
use log::error;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use utils::util::ceil_division;

/// How long the kernel may cache entries and attributes.
const TTL: Duration = Duration::from_secs(1);

/// The mounted volume as exposed to the FUSE host.
pub struct WfsFuse {
	/// The volume.
	fs: Wfs,
	/// Paths of the inodes handed out to the kernel.
	paths: HashMap<u64, String>,
}

impl WfsFuse {
	/// Creates the adapter for the given volume.
	pub fn new(fs: Wfs) -> Self {
		Self {
			fs,
			paths: HashMap::from([(FUSE_ROOT_ID, "/".to_owned())]),
		}
	}

	/// Builds the path of `name` inside the directory known as `parent`.
	fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
		let parent = self.paths.get(&parent)?;
		let name = name.to_str()?;
		if parent == "/" {
			Some(format!("/{name}"))
		} else {
			Some(format!("{parent}/{name}"))
		}
	}
}

/// Converts a timestamp field to a [`SystemTime`].
fn system_time(secs: i64) -> SystemTime {
	if secs >= 0 {
		UNIX_EPOCH + Duration::from_secs(secs as u64)
	} else {
		UNIX_EPOCH
	}
}

/// Builds the attribute reply for `inode`.
fn attr(inode: &Inode) -> FileAttr {
	let kind = if inode.is_dir() {
		FileType::Directory
	} else {
		FileType::RegularFile
	};

	FileAttr {
		ino: inode.num as u64 + 1,
		size: inode.size as u64,
		blocks: ceil_division(inode.size as u64, BLOCK_SIZE),
		atime: system_time(inode.atim),
		mtime: system_time(inode.mtim),
		ctime: system_time(inode.ctim),
		crtime: system_time(inode.ctim),
		kind,
		perm: (inode.mode & 0o7777) as u16,
		nlink: inode.nlinks as u32,
		uid: inode.uid,
		gid: inode.gid,
		rdev: 0,
		blksize: BLOCK_SIZE as u32,
		flags: 0,
	}
}

impl Filesystem for WfsFuse {
	fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
		self.fs.init_root().map_err(|err| {
			error!("cannot initialize root directory: {err}");
			err.errno()
		})
	}

	fn destroy(&mut self) {
		if let Err(err) = self.fs.sync() {
			error!("cannot flush disks: {err}");
		}
	}

	fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
		let Some(path) = self.child_path(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};

		match self.fs.getattr(&path) {
			Ok(inode) => {
				self.paths.insert(inode.num as u64 + 1, path);
				reply.entry(&TTL, &attr(&inode), 0);
			}
			Err(err) => reply.error(err.errno()),
		}
	}

	fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
		let Some(path) = self.paths.get(&ino) else {
			reply.error(libc::ENOENT);
			return;
		};

		match self.fs.getattr(path) {
			Ok(inode) => reply.attr(&TTL, &attr(&inode)),
			Err(err) => reply.error(err.errno()),
		}
	}

	fn mknod(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		_rdev: u32,
		reply: ReplyEntry,
	) {
		let Some(path) = self.child_path(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};

		debug!("mknod `{path}` mode={mode:o}");
		match self.fs.mknod(&path, mode) {
			Ok(inode) => {
				self.paths.insert(inode.num as u64 + 1, path);
				reply.entry(&TTL, &attr(&inode), 0);
			}
			Err(err) => reply.error(err.errno()),
		}
	}

	fn mkdir(
		&mut self,
		_req: &Request<'_>,
		parent: u64,
		name: &OsStr,
		mode: u32,
		_umask: u32,
		reply: ReplyEntry,
	) {
		let Some(path) = self.child_path(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};

		debug!("mkdir `{path}` mode={mode:o}");
		match self.fs.mkdir(&path, mode) {
			Ok(inode) => {
				self.paths.insert(inode.num as u64 + 1, path);
				reply.entry(&TTL, &attr(&inode), 0);
			}
			Err(err) => reply.error(err.errno()),
		}
	}

	fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(path) = self.child_path(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};

		debug!("unlink `{path}`");
		match self.fs.unlink(&path) {
			Ok(num) => {
				self.paths.remove(&(num + 1));
				reply.ok();
			}
			Err(err) => reply.error(err.errno()),
		}
	}

	fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
		let Some(path) = self.child_path(parent, name) else {
			reply.error(libc::ENOENT);
			return;
		};

		debug!("rmdir `{path}`");
		match self.fs.rmdir(&path) {
			Ok(num) => {
				self.paths.remove(&(num + 1));
				reply.ok();
			}
			Err(err) => reply.error(err.errno()),
		}
	}

	fn read(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		size: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyData,
	) {
		let Some(path) = self.paths.get(&ino) else {
			reply.error(libc::ENOENT);
			return;
		};

		match self.fs.read(path, offset.max(0) as u64, size as usize) {
			Ok(data) => reply.data(&data),
			Err(err) => reply.error(err.errno()),
		}
	}

	fn write(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		data: &[u8],
		_write_flags: u32,
		_flags: i32,
		_lock_owner: Option<u64>,
		reply: ReplyWrite,
	) {
		let Some(path) = self.paths.get(&ino) else {
			reply.error(libc::ENOENT);
			return;
		};

		match self.fs.write(path, data, offset.max(0) as u64) {
			Ok(written) => reply.written(written as u32),
			Err(err) => reply.error(err.errno()),
		}
	}

	fn readdir(
		&mut self,
		_req: &Request<'_>,
		ino: u64,
		_fh: u64,
		offset: i64,
		mut reply: ReplyDirectory,
	) {
		let Some(path) = self.paths.get(&ino) else {
			reply.error(libc::ENOENT);
			return;
		};

		match self.fs.readdir(path) {
			Ok(entries) => {
				for (i, entry) in entries.iter().enumerate().skip(offset.max(0) as usize) {
					let kind = if entry.mode & libc::S_IFDIR != 0 {
						FileType::Directory
					} else {
						FileType::RegularFile
					};
					if reply.add(entry.num + 1, (i + 1) as i64, kind, &entry.name) {
						break;
					}
				}
				reply.ok();
			}
			Err(err) => reply.error(err.errno()),
		}
	}
}
