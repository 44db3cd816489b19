//! Readdir stream: an in-memory cursor over a directory's data block.
//!
//! Grounded on `original_source/fs_op_readdir.c`. The stream is a snapshot
//! taken at `opendir` time; it does not observe later modifications to the
//! directory (spec.md §4.7).

use crate::error::{FsError, FsResult};
use crate::layout::{as_bytes_mut, DirEntry, DIRENTS_PER_BLK, FS_BLOCK_SIZE};
use crate::volume::Volume;

/// An open cursor over one directory's entries, as of the moment it was
/// opened.
#[derive(Debug)]
pub struct DirStream {
	block: Vec<u8>,
	cursor: usize,
}

impl DirStream {
	fn dirent_at(&self, slot: usize) -> DirEntry {
		let sz = std::mem::size_of::<DirEntry>();
		let mut de = DirEntry::empty();
		as_bytes_mut(&mut de).copy_from_slice(&self.block[slot * sz..(slot + 1) * sz]);
		de
	}

	/// Returns the next valid entry, advancing the cursor past it, or
	/// `None` once every slot has been visited.
	pub fn next_entry(&mut self) -> Option<DirEntry> {
		while self.cursor < DIRENTS_PER_BLK {
			let slot = self.cursor;
			self.cursor += 1;
			let de = self.dirent_at(slot);
			if de.valid != 0 {
				return Some(de);
			}
		}
		None
	}
}

impl<'d> Volume<'d> {
	/// Opens a directory stream over `dir_ino`'s data block.
	pub fn opendir(&mut self, dir_ino: u32) -> FsResult<DirStream> {
		let inode = *self.inode(dir_ino);
		if !inode.is_dir() {
			return Err(FsError::NotADirectory);
		}
		let mut block = vec![0u8; FS_BLOCK_SIZE];
		self.dev.read(inode.direct[0] as usize, 1, &mut block).map_err(FsError::from)?;
		Ok(DirStream { block, cursor: 0 })
	}
}

/// Releases the stream's block buffer. Provided for symmetry with
/// `opendir`/`readdir`; dropping a [`DirStream`] has the same effect.
pub fn closedir(_stream: DirStream) {}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemBlockDevice;
	use crate::format::format;

	#[test]
	fn readdir_yields_dot_dotdot_then_children_in_order() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		vol.mkfile(root, b"file1", 0o644).unwrap();
		vol.mkfile(root, b"file2", 0o644).unwrap();
		vol.mkdir(root, b"dir1", 0o755).unwrap();

		let mut stream = vol.opendir(root).unwrap();
		let names: Vec<(Vec<u8>, bool)> = std::iter::from_fn(|| stream.next_entry())
			.map(|de| (de.name_bytes().to_vec(), de.is_dir != 0))
			.collect();
		assert_eq!(
			names,
			vec![
				(b".".to_vec(), true),
				(b"..".to_vec(), true),
				(b"file1".to_vec(), false),
				(b"file2".to_vec(), false),
				(b"dir1".to_vec(), true),
			]
		);
		closedir(stream);
	}

	#[test]
	fn opendir_rejects_non_directory() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();
		let mut vol = Volume::mount(&mut dev).unwrap();
		let root = vol.root_inode();
		let f = vol.mkfile(root, b"file1", 0o644).unwrap();
		assert_eq!(vol.opendir(f).unwrap_err(), FsError::NotADirectory);
	}
}
