//! Directory operations: lookup, creation, and removal.
//!
//! Grounded on `original_source/fs_op_mkfile.c` (`mkentry`,
//! `get_free_entry_in_block`) and `fs_op_unlinkfile.c` (`do_unlink`).

use crate::error::{FsError, FsResult};
use crate::layout::{
	as_bytes, as_bytes_mut, DirEntry, DIRENTS_PER_BLK, FS_BLOCK_SIZE, FS_FILENAME_SIZE, S_IFDIR,
	S_IFMT,
};
use crate::volume::{now_secs, Volume};

/// `(block number, block bytes, matching slot, first free slot)`.
type ScanResult = (u32, Vec<u8>, Option<usize>, Option<usize>);

/// What kind of entry [`Volume::mkentry`] is creating.
#[derive(Clone, Copy)]
enum EntryKind {
	NewReg(u16),
	NewDir(u16),
	Link(u32),
}

impl<'d> Volume<'d> {
	fn names_eq(&self, stored: &[u8], query: &[u8]) -> bool {
		if self.ignore_case() {
			stored.eq_ignore_ascii_case(query)
		} else {
			stored == query
		}
	}

	/// Reads a directory's data block, after checking `dir_ino` is a
	/// directory with an allocated block. `no_block_err` is the error
	/// returned for an unallocated block — callers disagree on this: per
	/// spec.md §4.4, creation reports `ENOSPC` (there is nowhere to put the
	/// new entry) while unlink reports `ENOENT` (nothing to find).
	fn read_dir_block(&mut self, dir_ino: u32, no_block_err: FsError) -> FsResult<(u32, Vec<u8>)> {
		let inode = *self.inode(dir_ino);
		if !inode.is_dir() {
			return Err(FsError::NotADirectory);
		}
		let blkno = inode.direct[0];
		if blkno == 0 {
			return Err(no_block_err);
		}
		let mut block = vec![0u8; FS_BLOCK_SIZE];
		self.dev.read(blkno as usize, 1, &mut block).map_err(FsError::from)?;
		Ok((blkno, block))
	}

	fn dirent_at(block: &[u8], slot: usize) -> DirEntry {
		let sz = std::mem::size_of::<DirEntry>();
		let mut de = DirEntry::empty();
		as_bytes_mut(&mut de).copy_from_slice(&block[slot * sz..(slot + 1) * sz]);
		de
	}

	fn put_dirent_at(block: &mut [u8], slot: usize, de: &DirEntry) {
		let sz = std::mem::size_of::<DirEntry>();
		block[slot * sz..(slot + 1) * sz].copy_from_slice(as_bytes(de));
	}

	/// Scans a directory's block for `name`, and separately for the first
	/// free slot (mirrors `get_free_entry_in_block`'s single-pass scan).
	///
	/// Returns `(block number, block bytes, matching slot, first free slot)`.
	fn scan(&mut self, dir_ino: u32, name: &[u8], no_block_err: FsError) -> FsResult<ScanResult> {
		let (blkno, block) = self.read_dir_block(dir_ino, no_block_err)?;
		let mut found = None;
		let mut free = None;
		for slot in 0..DIRENTS_PER_BLK {
			let de = Self::dirent_at(&block, slot);
			if de.valid == 0 {
				if free.is_none() {
					free = Some(slot);
				}
				continue;
			}
			if self.names_eq(de.name_bytes(), name) {
				found = Some(slot);
			}
		}
		Ok((blkno, block, found, free))
	}

	/// Looks up `name` within `dir_ino`, returning the referenced inode.
	pub fn lookup(&mut self, dir_ino: u32, name: &[u8]) -> FsResult<u32> {
		let (_, block, found, _) = self.scan(dir_ino, name, FsError::NoSuchEntry)?;
		match found {
			Some(slot) => Ok(Self::dirent_at(&block, slot).inode),
			None => Err(FsError::NoSuchEntry),
		}
	}

	fn mkentry(&mut self, dir_ino: u32, name: &[u8], kind: EntryKind) -> FsResult<u32> {
		if name.len() >= FS_FILENAME_SIZE {
			return Err(FsError::NameTooLong);
		}
		let (blkno, mut block, found, free) = self.scan(dir_ino, name, FsError::NoSpace)?;
		if found.is_some() {
			return Err(FsError::EntryExists);
		}
		let slot = free.ok_or(FsError::NoSpace)?;

		let is_dir_entry;
		let file_ino;
		match kind {
			EntryKind::Link(target) => {
				if target as usize >= self.n_inodes {
					return Err(FsError::InvalidArgument);
				}
				if self.inode(target).is_dir() {
					return Err(FsError::IsADirectory);
				}
				is_dir_entry = false;
				file_ino = target;
			}
			EntryKind::NewReg(mode) | EntryKind::NewDir(mode) => {
				let type_bits = if matches!(kind, EntryKind::NewDir(_)) { S_IFDIR } else { crate::layout::S_IFREG };
				let file_blkno = self.alloc_block()?;
				let ino = match self.alloc_inode() {
					Ok(ino) => ino,
					Err(e) => {
						// undo the block allocation so a failed create leaves
						// the free-list as it found it.
						self.clear_block_bit(file_blkno);
						return Err(e);
					}
				};
				let t = now_secs();
				let gid = self.inode(dir_ino).gid;
				*self.inode_mut(ino) = crate::layout::InodeRecord::new(
					1001,
					gid,
					type_bits | (mode & crate::layout::S_IPERM),
					0,
					t,
					t,
					0,
					[file_blkno, 0, 0, 0, 0, 0],
				);
				is_dir_entry = matches!(kind, EntryKind::NewDir(_));
				file_ino = ino;
			}
		}

		let mut new_name = [0u8; FS_FILENAME_SIZE];
		new_name[..name.len()].copy_from_slice(name);
		if self.fold_case() {
			new_name.make_ascii_uppercase();
		}
		let mut de = DirEntry::empty();
		de.valid = 1;
		de.is_dir = is_dir_entry as u8;
		de.inode = file_ino;
		de.set_name(&new_name[..name.len()]);
		Self::put_dirent_at(&mut block, slot, &de);
		self.dev.write(blkno as usize, 1, &block).map_err(FsError::from)?;

		let t = now_secs();
		let dirent_sz = std::mem::size_of::<DirEntry>() as u32;
		{
			let d = self.inode_mut(dir_ino);
			d.size += dirent_sz;
			d.mtime = t;
		}
		self.mark_inode(dir_ino);

		self.inode_mut(file_ino).nlink += 1;
		self.mark_inode(file_ino);

		if let EntryKind::NewDir(_) = kind {
			let file_blkno = self.inode(file_ino).direct[0];
			let mut child_block = vec![0u8; FS_BLOCK_SIZE];
			let mut dot = DirEntry::empty();
			dot.valid = 1;
			dot.is_dir = 1;
			dot.inode = file_ino;
			dot.set_name(b".");
			Self::put_dirent_at(&mut child_block, 0, &dot);
			let mut dotdot = DirEntry::empty();
			dotdot.valid = 1;
			dotdot.is_dir = 1;
			dotdot.inode = dir_ino;
			dotdot.set_name(b"..");
			Self::put_dirent_at(&mut child_block, 1, &dotdot);
			self.dev.write(file_blkno as usize, 1, &child_block).map_err(FsError::from)?;

			let f = self.inode_mut(file_ino);
			f.size += 2 * dirent_sz;
			f.nlink += 1;
			self.mark_inode(file_ino);
			self.inode_mut(dir_ino).nlink += 1;
			self.mark_inode(dir_ino);
		}

		self.sync_metadata()?;
		Ok(file_ino)
	}

	/// Creates a new regular file named `name` in `dir_ino`. `mode` supplies
	/// the permission bits; the type bits are fixed to "regular".
	pub fn mkfile(&mut self, dir_ino: u32, name: &[u8], mode: u16) -> FsResult<u32> {
		self.mkentry(dir_ino, name, EntryKind::NewReg(mode))
	}

	/// Creates a new subdirectory named `name` in `dir_ino`.
	pub fn mkdir(&mut self, dir_ino: u32, name: &[u8], mode: u16) -> FsResult<u32> {
		self.mkentry(dir_ino, name, EntryKind::NewDir(mode))
	}

	/// Creates a hard link named `name` in `dir_ino`, pointing at the
	/// existing non-directory inode `target_ino`.
	pub fn mklink(&mut self, dir_ino: u32, name: &[u8], target_ino: u32) -> FsResult<u32> {
		self.mkentry(dir_ino, name, EntryKind::Link(target_ino))
	}

	fn do_unlink(&mut self, dir_ino: u32, name: &[u8], typemask: u16, invalid_err: FsError) -> FsResult<()> {
		let (blkno, mut block, found, _) = self.scan(dir_ino, name, FsError::NoSuchEntry)?;
		let slot = found.ok_or(FsError::NoSuchEntry)?;

		if name == b"." || name == b".." {
			return Err(FsError::NotPermitted);
		}

		let mut de = Self::dirent_at(&block, slot);
		let file_ino = de.inode;
		let file_mode = self.inode(file_ino).mode;
		if file_mode & typemask == 0 {
			return Err(invalid_err);
		}

		let removed_dir = file_mode & S_IFMT == S_IFDIR;
		if removed_dir {
			let dirent_sz = std::mem::size_of::<DirEntry>() as u32;
			if self.inode(file_ino).size != 2 * dirent_sz {
				return Err(FsError::DirectoryNotEmpty);
			}
		}

		de.valid = 0;
		Self::put_dirent_at(&mut block, slot, &de);
		self.dev.write(blkno as usize, 1, &block).map_err(FsError::from)?;
		self.mark_blk(blkno);

		let t = now_secs();
		let dirent_sz = std::mem::size_of::<DirEntry>() as u32;
		{
			let d = self.inode_mut(dir_ino);
			d.size -= dirent_sz;
			d.mtime = t;
		}
		self.mark_inode(dir_ino);

		if removed_dir {
			self.inode_mut(dir_ino).nlink -= 1;
			self.inode_mut(file_ino).nlink -= 1;
			self.mark_inode(dir_ino);
		}

		self.inode_mut(file_ino).nlink -= 1;
		self.mark_inode(file_ino);

		if self.inode(file_ino).nlink == 0 {
			let data_blk = self.inode(file_ino).direct[0];
			self.clear_block_bit(data_blk);
			self.mark_blk(data_blk);
			self.inode_mut(file_ino).direct[0] = 0;
			self.clear_inode_bit(file_ino);
			self.mark_inode(file_ino);
		}

		self.sync_metadata()
	}

	/// Removes a regular-file entry. `EISDIR`-equivalent if `name` refers
	/// to a directory.
	pub fn unlinkfile(&mut self, dir_ino: u32, name: &[u8]) -> FsResult<()> {
		self.do_unlink(dir_ino, name, S_IFMT & !S_IFDIR, FsError::IsADirectory)
	}

	/// Removes an empty-subdirectory entry. `ENOTDIR`-equivalent if `name`
	/// refers to a non-directory.
	pub fn rmdir(&mut self, dir_ino: u32, name: &[u8]) -> FsResult<()> {
		self.do_unlink(dir_ino, name, S_IFDIR, FsError::NotADirectory)
	}

	/// Removes whichever kind of entry `name` refers to.
	pub fn unlinkat(&mut self, dir_ino: u32, name: &[u8]) -> FsResult<()> {
		self.do_unlink(dir_ino, name, S_IFMT, FsError::InvalidArgument)
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemBlockDevice;
	use crate::format::format;

	fn mounted(nblks: usize) -> (MemBlockDevice, bool) {
		let mut dev = MemBlockDevice::new(nblks);
		format(&mut dev, false, false).unwrap();
		(dev, false)
	}

	#[test]
	fn create_file_and_duplicate() {
		let (mut dev, _) = mounted(100);
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let f1 = vol.mkfile(root, b"file1", 0o644).unwrap();
		assert_eq!(vol.inode(f1).nlink, 1);
		assert_eq!(vol.inode(f1).size, 0);
		let dirent_sz = std::mem::size_of::<DirEntry>() as u32;
		assert_eq!(vol.inode(root).size, 3 * dirent_sz);
		vol.mkfile(root, b"File1", 0o644).unwrap();
		assert_eq!(vol.mkfile(root, b"File1", 0o644).unwrap_err(), FsError::EntryExists);
	}

	#[test]
	fn ignore_case_lookup_and_unlink() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, true, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		vol.mkfile(root, b"file1", 0o644).unwrap();
		assert_eq!(vol.mkfile(root, b"File1", 0o644).unwrap_err(), FsError::EntryExists);
		vol.unlinkfile(root, b"FILE1").unwrap();
		assert_eq!(vol.lookup(root, b"file1").unwrap_err(), FsError::NoSuchEntry);
	}

	#[test]
	fn mkdir_nested_and_rmdir_not_empty() {
		let (mut dev, _) = mounted(100);
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let dir1 = vol.mkdir(root, b"dir1", 0o755).unwrap();
		let dirent_sz = std::mem::size_of::<DirEntry>() as u32;
		assert_eq!(vol.inode(dir1).size, 2 * dirent_sz);
		assert_eq!(vol.inode(dir1).nlink, 2);
		assert_eq!(vol.inode(root).nlink, 3);

		let dir2 = vol.mkdir(root, b"dir2", 0o755).unwrap();
		vol.mkfile(dir2, b"file1", 0o644).unwrap();
		assert_eq!(vol.rmdir(root, b"dir2").unwrap_err(), FsError::DirectoryNotEmpty);
		vol.unlinkfile(dir2, b"file1").unwrap();
		vol.rmdir(root, b"dir2").unwrap();
		assert_eq!(vol.inode(root).nlink, 3);
	}

	#[test]
	fn hardlink_and_unlink_accounting() {
		let (mut dev, _) = mounted(100);
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let f1 = vol.mkfile(root, b"file1", 0o644).unwrap();
		let linked = vol.mklink(root, b"file2", f1).unwrap();
		assert_eq!(linked, f1);
		assert_eq!(vol.inode(f1).nlink, 2);

		vol.unlinkfile(root, b"file2").unwrap();
		assert_eq!(vol.inode(f1).nlink, 1);
		assert!(vol.inode_bit(f1));

		vol.unlinkfile(root, b"file1").unwrap();
		assert!(!vol.inode_bit(f1));
	}

	#[test]
	fn unlink_on_directory_with_no_block_is_no_such_entry() {
		let (mut dev, _) = mounted(100);
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let dir1 = vol.mkdir(root, b"dir1", 0o755).unwrap();
		vol.inode_mut(dir1).direct[0] = 0;
		assert_eq!(vol.unlinkat(dir1, b"whatever").unwrap_err(), FsError::NoSuchEntry);
	}

	#[test]
	fn unlink_rejects_dot_and_dotdot() {
		let (mut dev, _) = mounted(100);
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		assert_eq!(vol.unlinkat(root, b".").unwrap_err(), FsError::NotPermitted);
		assert_eq!(vol.unlinkat(root, b"..").unwrap_err(), FsError::NotPermitted);
	}
}
