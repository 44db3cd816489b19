//! On-disk layout: constants, struct layouts, and bitmap helpers.
//!
//! Struct layouts are grounded on `mkfs/src/ext2.rs`'s `#[repr(C, packed)]`
//! on-disk structs (`Superblock`, `BlockGroupDescriptor`, `INode`) and on
//! `original_source/fsx600.h`'s `fs_super`/`fs_inode`/`fs_dirent` field sets
//! (inferred from their use across `fs_util_format.c`, `fs_op_mkfile.c`,
//! `fs_op_unlinkfile.c`, etc. — the header itself was not retained in the
//! source pack). Unlike the teacher's 4096-byte, multi-block-group ext2,
//! this engine is single-block-group and single-block-per-file, so the
//! block-group descriptor table has no counterpart here.

use std::mem::size_of;

/// Fixed block size in bytes. The engine assumes this divides all
/// structure sizes below evenly.
pub const FS_BLOCK_SIZE: usize = 1024;

/// Format-time magic number identifying a microfs volume.
pub const FS_MAGIC: u32 = 0x4D_49_43_52; // "MICR"

/// Bits covered by one bitmap block.
pub const BITS_PER_BLK: usize = FS_BLOCK_SIZE * 8;

/// Maximum stored name length, including the terminating `NUL`.
///
/// spec.md lists 28 as "typical" and explicitly allows adjusting it so the
/// directory entry divides the block evenly; 24 is the value that does,
/// once the entry also carries the 4-byte-aligned `valid`/`is_dir`/`inode`
/// header (see [`DirEntry`]) — decision recorded in DESIGN.md.
pub const FS_FILENAME_SIZE: usize = 24;

/// A directory entry: a validity flag, a directory-type flag, the
/// referenced inode index, and a fixed-length name.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DirEntry {
	/// Non-zero if this slot holds a live entry.
	pub valid: u8,
	/// Non-zero if the referenced inode is a directory.
	pub is_dir: u8,
	_pad: [u8; 2],
	/// The inode this entry names.
	pub inode: u32,
	/// `NUL`-terminated name, zero-padded.
	pub name: [u8; FS_FILENAME_SIZE],
}

/// Number of directory entries per block.
pub const DIRENTS_PER_BLK: usize = FS_BLOCK_SIZE / size_of::<DirEntry>();

impl DirEntry {
	/// An all-zero, invalid entry.
	pub const fn empty() -> Self {
		Self {
			valid: 0,
			is_dir: 0,
			_pad: [0; 2],
			inode: 0,
			name: [0; FS_FILENAME_SIZE],
		}
	}

	/// Sets this entry's name from a byte slice, zero-padding the rest.
	///
	/// The caller must have already checked `name.len() < FS_FILENAME_SIZE`.
	pub fn set_name(&mut self, name: &[u8]) {
		self.name = [0; FS_FILENAME_SIZE];
		self.name[..name.len()].copy_from_slice(name);
	}

	/// Returns the name up to (but not including) the terminating `NUL`.
	pub fn name_bytes(&self) -> &[u8] {
		let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
		&self.name[..len]
	}
}

/// Number of direct block pointers in an inode.
pub const DIRECT_PTRS: usize = 6;

/// File-type bits within `mode` (the high nibble, POSIX `S_IFMT`-style).
pub const S_IFMT: u16 = 0o170000;
/// Regular-file type bit.
pub const S_IFREG: u16 = 0o100000;
/// Directory type bit.
pub const S_IFDIR: u16 = 0o040000;
/// Permission-bits mask (`rwx` for user/group/other).
pub const S_IPERM: u16 = 0o777;

/// An inode record: ownership, mode, timestamps, size, link count, and
/// block pointers.
///
/// `indirect1`/`indirect2` are reserved per spec.md's Non-goals (this
/// engine supports at most one data block per file) but are kept in the
/// layout so a future multi-block engine could grow into this record
/// without a format change.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct InodeRecord {
	pub uid: u16,
	pub gid: u16,
	pub mode: u16,
	pub nlink: u16,
	pub ctime: u32,
	pub mtime: u32,
	pub size: u32,
	pub direct: [u32; DIRECT_PTRS],
	pub indirect1: u32,
	pub indirect2: u32,
	_reserved: [u8; 12],
}

/// Number of inode records per block.
pub const INODES_PER_BLK: usize = FS_BLOCK_SIZE / size_of::<InodeRecord>();

impl InodeRecord {
	/// An all-zero inode, as stored for unused slots.
	pub const fn empty() -> Self {
		Self {
			uid: 0,
			gid: 0,
			mode: 0,
			nlink: 0,
			ctime: 0,
			mtime: 0,
			size: 0,
			direct: [0; DIRECT_PTRS],
			indirect1: 0,
			indirect2: 0,
			_reserved: [0; 12],
		}
	}

	/// Builds an inode record with the reserved trailer zeroed.
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		uid: u16,
		gid: u16,
		mode: u16,
		nlink: u16,
		ctime: u32,
		mtime: u32,
		size: u32,
		direct: [u32; DIRECT_PTRS],
	) -> Self {
		Self {
			uid,
			gid,
			mode,
			nlink,
			ctime,
			mtime,
			size,
			direct,
			indirect1: 0,
			indirect2: 0,
			_reserved: [0; 12],
		}
	}

	/// Whether this inode's type bits mark it as a directory.
	pub fn is_dir(&self) -> bool {
		self.mode & S_IFMT == S_IFDIR
	}

	/// Whether this inode's type bits mark it as a regular file.
	pub fn is_reg(&self) -> bool {
		self.mode & S_IFMT == S_IFREG
	}
}

/// The on-disk superblock, stored at block 0.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct Superblock {
	pub magic: u32,
	/// Size in blocks of the inode bitmap.
	pub inode_map_sz: u32,
	/// Size in blocks of the block bitmap.
	pub block_map_sz: u32,
	/// Size in blocks of the inode table.
	pub inode_region_sz: u32,
	/// Total number of blocks on the volume.
	pub num_blocks: u32,
	/// Stored names are upper-cased at create time.
	pub fold_case: u32,
	/// Lookup compares names case-insensitively.
	pub ignore_case: u32,
	/// Inode index of the root directory.
	pub root_inode: u32,
}

impl Superblock {
	pub const fn empty() -> Self {
		Self {
			magic: 0,
			inode_map_sz: 0,
			block_map_sz: 0,
			inode_region_sz: 0,
			num_blocks: 0,
			fold_case: 0,
			ignore_case: 0,
			root_inode: 0,
		}
	}
}

/// Divides `n` by `m`, rounding up.
pub const fn ceil_div(n: usize, m: usize) -> usize {
	n.div_ceil(m)
}

/// Reinterprets a `&T` as a byte slice, for writing fixed-layout structs to
/// a block device. Grounded on `mkfs/src/ext2.rs`'s use of `slice::from_raw_parts`
/// over `#[repr(C, packed)]` structs to serialize them directly.
pub fn as_bytes<T>(value: &T) -> &[u8] {
	unsafe { std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }
}

/// Reinterprets a `&mut T` as a mutable byte slice, for reading fixed-layout
/// structs from a block device.
pub fn as_bytes_mut<T>(value: &mut T) -> &mut [u8] {
	unsafe { std::slice::from_raw_parts_mut(value as *mut T as *mut u8, size_of::<T>()) }
}

/// Bit operations over a flat bitmap stored as consecutive bytes.
pub mod bitmap {
	/// Tests whether bit `i` is set.
	pub fn is_set(map: &[u8], i: usize) -> bool {
		map[i / 8] & (1 << (i % 8)) != 0
	}

	/// Sets bit `i`.
	pub fn set(map: &mut [u8], i: usize) {
		map[i / 8] |= 1 << (i % 8);
	}

	/// Clears bit `i`.
	pub fn clear(map: &mut [u8], i: usize) {
		map[i / 8] &= !(1 << (i % 8));
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn dirent_size_divides_block() {
		assert_eq!(FS_BLOCK_SIZE % size_of::<DirEntry>(), 0);
		assert_ne!(DIRENTS_PER_BLK, 0);
	}

	#[test]
	fn inode_size_divides_block() {
		assert_eq!(FS_BLOCK_SIZE % size_of::<InodeRecord>(), 0);
		assert_ne!(INODES_PER_BLK, 0);
	}

	#[test]
	fn dirent_name_round_trip() {
		let mut de = DirEntry::empty();
		de.set_name(b"hello");
		assert_eq!(de.name_bytes(), b"hello");
	}

	#[test]
	fn bitmap_set_clear() {
		let mut map = vec![0u8; 2];
		bitmap::set(&mut map, 9);
		assert!(bitmap::is_set(&map, 9));
		assert!(!bitmap::is_set(&map, 8));
		bitmap::clear(&mut map, 9);
		assert!(!bitmap::is_set(&map, 9));
	}

	#[test]
	fn ceil_div_rounds_up() {
		assert_eq!(ceil_div(10, 3), 4);
		assert_eq!(ceil_div(9, 3), 3);
	}
}
