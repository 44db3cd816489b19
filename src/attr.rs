//! Attribute operations: chmod, chown, utime, stat, statfs.
//!
//! Grounded on `original_source/fs_op_chmodfile.c`, `fs_op_chownfile.c`,
//! `fs_op_utimefile.c`, `fs_op_statfile.c`, and `fs_op_statfs.c`.

use crate::error::FsResult;
use crate::layout::{FS_BLOCK_SIZE, FS_FILENAME_SIZE, S_IPERM};
use crate::volume::Volume;

/// POSIX-style `stat` result for a single inode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
	pub ino: u32,
	pub mode: u16,
	pub nlink: u16,
	pub uid: u16,
	pub gid: u16,
	pub size: u32,
	/// 512-byte units, rounded up to whole blocks.
	pub blocks: u32,
	pub blksize: u32,
	pub atime: u32,
	pub ctime: u32,
}

/// POSIX-style `statfs` result for the whole volume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatFs {
	pub bsize: u32,
	pub blocks: u32,
	pub bfree: u32,
	pub bavail: u32,
	pub files: u32,
	pub ffree: u32,
	pub favail: u32,
	pub namemax: u32,
}

impl<'d> Volume<'d> {
	/// Replaces the permission bits (`rwx` for user/group/other) on `ino`,
	/// leaving the file-type bits untouched.
	pub fn chmod(&mut self, ino: u32, perms: u16) -> FsResult<()> {
		let inode = self.inode_mut(ino);
		inode.mode = (inode.mode & !S_IPERM) | (perms & S_IPERM);
		self.mark_inode(ino);
		self.sync_metadata()
	}

	/// Sets `ino`'s owner and group.
	pub fn chown(&mut self, ino: u32, uid: u16, gid: u16) -> FsResult<()> {
		let inode = self.inode_mut(ino);
		inode.uid = uid;
		inode.gid = gid;
		self.mark_inode(ino);
		self.sync_metadata()
	}

	/// Sets `ino`'s modification time to `mtime` (epoch seconds).
	pub fn utime(&mut self, ino: u32, mtime: u32) -> FsResult<()> {
		self.inode_mut(ino).mtime = mtime;
		self.mark_inode(ino);
		self.sync_metadata()
	}

	/// Reports `ino`'s attributes. There is no separate access time; `atime`
	/// mirrors `mtime`.
	pub fn stat(&self, ino: u32) -> Stat {
		let inode = self.inode(ino);
		let whole_blocks = crate::layout::ceil_div(inode.size as usize, FS_BLOCK_SIZE);
		Stat {
			ino,
			mode: inode.mode,
			nlink: inode.nlink,
			uid: inode.uid,
			gid: inode.gid,
			size: inode.size,
			blocks: (whole_blocks * FS_BLOCK_SIZE / 512) as u32,
			blksize: FS_BLOCK_SIZE as u32,
			atime: inode.mtime,
			ctime: inode.ctime,
		}
	}

	/// Reports volume-wide capacity statistics.
	pub fn statfs(&self) -> StatFs {
		let bfree = (0..self.n_blocks()).filter(|&b| !self.block_bit(b as u32)).count() as u32;
		let ffree = (0..self.n_inodes()).filter(|&i| !self.inode_bit(i as u32)).count() as u32;
		StatFs {
			bsize: FS_BLOCK_SIZE as u32,
			blocks: self.n_blocks() as u32,
			bfree,
			bavail: bfree,
			files: self.n_inodes() as u32,
			ffree,
			favail: ffree,
			namemax: (FS_FILENAME_SIZE - 1) as u32,
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemBlockDevice;
	use crate::format::format;

	#[test]
	fn chmod_preserves_type_bits() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let f = vol.mkfile(root, b"file1", 0o644).unwrap();
		vol.chmod(f, 0o600).unwrap();
		let st = vol.stat(f);
		assert_eq!(st.mode & 0o777, 0o600);
		assert!(st.mode & crate::layout::S_IFMT == crate::layout::S_IFREG);
	}

	#[test]
	fn chown_round_trips() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let f = vol.mkfile(root, b"file1", 0o644).unwrap();
		vol.chown(f, 42, 7).unwrap();
		let st = vol.stat(f);
		assert_eq!((st.uid, st.gid), (42, 7));
	}

	#[test]
	fn statfs_reflects_allocation() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let before = vol.statfs();
		let root = vol.root_inode();
		vol.mkfile(root, b"file1", 0o644).unwrap();
		let after = vol.statfs();
		assert_eq!(after.bfree, before.bfree - 1);
		assert_eq!(after.ffree, before.ffree - 1);
		assert_eq!(after.namemax, crate::layout::FS_FILENAME_SIZE as u32 - 1);
	}
}
