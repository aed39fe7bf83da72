//! WFS is a user-space filesystem that stripes or mirrors a small
//! inode-based filesystem across several backing disk images.
//!
//! The volume is formatted by [`format::format_disks`] and mounted through
//! [`fs::Wfs`], which maps the images, checks that they belong together and
//! services the usual file operations. Every data-block access goes through
//! the RAID layer; metadata (bitmaps and the inode table) is mirrored on
//! all disks in every mode.

pub mod bitmap;
pub mod dir;
pub mod disk;
pub mod error;
pub mod format;
pub mod fs;
pub mod fuse;
pub mod indirect;
pub mod inode;
pub mod layout;
pub mod ops;
pub mod path;
pub mod raid;

pub use error::FsError;
pub use error::FsResult;
pub use fs::Wfs;
pub use raid::RaidMode;
