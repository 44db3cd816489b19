//! Formats a blank block device into a fresh microfs volume.
//!
//! Grounded on `original_source/fs_util_format.c::fs_format_volume` and
//! `mkfs/src/ext2.rs::Ext2Factory::create` (superblock/inode serialization
//! idiom).

use crate::error::{FsError, FsResult};
use crate::layout::{
	ceil_div, as_bytes, bitmap, BITS_PER_BLK, DirEntry, FS_BLOCK_SIZE, FS_MAGIC, INODES_PER_BLK,
	InodeRecord, S_IFDIR, Superblock,
};
use crate::device::BlockDevice;
use crate::volume::now_secs;

/// Inode index of the root directory, fixed by convention.
pub const ROOT_INODE: u32 = 1;

/// Reports whether `dev` already carries a microfs volume, by checking
/// block 0's magic number.
///
/// Grounded on `mkfs/src/main.rs`'s `FSFactory::is_present`, reduced to a
/// single probe since this crate implements exactly one format.
pub fn is_formatted(dev: &mut dyn BlockDevice) -> FsResult<bool> {
	let mut block = vec![0u8; FS_BLOCK_SIZE];
	dev.read(0, 1, &mut block).map_err(FsError::from)?;
	let magic = u32::from_ne_bytes(block[..4].try_into().unwrap());
	Ok(magic == FS_MAGIC)
}

/// Writes a complete, valid volume image to `dev`, covering its entire
/// block range.
///
/// `ignore_case` selects case-insensitive directory lookup; `fold_case`
/// additionally upper-cases stored names (and implies `ignore_case`, per
/// the superblock invariant).
pub fn format(dev: &mut dyn BlockDevice, ignore_case: bool, fold_case: bool) -> FsResult<()> {
	let n_blks = dev.num_blocks();

	let n_inodes = ceil_div(n_blks, 4);
	let n_ino_map_blks = ceil_div(n_inodes, BITS_PER_BLK);
	let n_ino_blks = ceil_div(n_inodes, INODES_PER_BLK);
	let n_map_blks = ceil_div(n_blks, BITS_PER_BLK);
	let n_meta = 1 + n_ino_map_blks + n_map_blks + n_ino_blks;
	let rootdir_blkno = n_meta;

	let mut meta = vec![0u8; n_meta * FS_BLOCK_SIZE];

	let ignore_case = ignore_case || fold_case;
	let superblock = Superblock {
		magic: FS_MAGIC,
		inode_map_sz: n_ino_map_blks as u32,
		block_map_sz: n_map_blks as u32,
		inode_region_sz: n_ino_blks as u32,
		num_blocks: n_blks as u32,
		fold_case: fold_case as u32,
		ignore_case: ignore_case as u32,
		root_inode: ROOT_INODE,
	};
	meta[..std::mem::size_of::<Superblock>()].copy_from_slice(as_bytes(&superblock));

	let inode_map_base = 1;
	let inode_map_off = inode_map_base * FS_BLOCK_SIZE;
	let inode_map = &mut meta[inode_map_off..inode_map_off + n_ino_map_blks * FS_BLOCK_SIZE];
	bitmap::set(inode_map, 0); // inode 0 permanently reserved
	bitmap::set(inode_map, ROOT_INODE as usize);

	let block_map_base = inode_map_base + n_ino_map_blks;
	let block_map_off = block_map_base * FS_BLOCK_SIZE;
	let block_map = &mut meta[block_map_off..block_map_off + n_map_blks * FS_BLOCK_SIZE];
	for b in 0..=rootdir_blkno {
		bitmap::set(block_map, b);
	}

	let inode_base = block_map_base + n_map_blks;
	let t = now_secs();
	let root = InodeRecord::new(
		1001,
		125,
		S_IFDIR | 0o755,
		2,
		t,
		t,
		(2 * std::mem::size_of::<DirEntry>()) as u32,
		[rootdir_blkno as u32, 0, 0, 0, 0, 0],
	);
	let root_off = inode_base * FS_BLOCK_SIZE + ROOT_INODE as usize * std::mem::size_of::<InodeRecord>();
	meta[root_off..root_off + std::mem::size_of::<InodeRecord>()].copy_from_slice(as_bytes(&root));

	let mut root_block = vec![0u8; FS_BLOCK_SIZE];
	let dirent_sz = std::mem::size_of::<DirEntry>();
	let mut dot = DirEntry::empty();
	dot.valid = 1;
	dot.is_dir = 1;
	dot.inode = ROOT_INODE;
	dot.set_name(b".");
	root_block[0..dirent_sz].copy_from_slice(as_bytes(&dot));
	let mut dotdot = DirEntry::empty();
	dotdot.valid = 1;
	dotdot.is_dir = 1;
	dotdot.inode = ROOT_INODE;
	dotdot.set_name(b"..");
	root_block[dirent_sz..2 * dirent_sz].copy_from_slice(as_bytes(&dotdot));

	dev.write(rootdir_blkno, 1, &root_block).map_err(FsError::from)?;
	dev.write(0, n_meta, &meta).map_err(FsError::from)?;

	Ok(())
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::device::MemBlockDevice;

	#[test]
	fn formats_root_directory() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, false).unwrap();

		let mut sb_buf = vec![0u8; FS_BLOCK_SIZE];
		dev.read(0, 1, &mut sb_buf).unwrap();
		let sb: &Superblock = unsafe { &*(sb_buf.as_ptr() as *const Superblock) };
		assert_eq!(sb.magic, FS_MAGIC);
		assert_eq!(sb.root_inode, ROOT_INODE);
		assert_eq!(sb.ignore_case, 0);
	}

	#[test]
	fn fold_case_forces_ignore_case() {
		let mut dev = MemBlockDevice::new(100);
		format(&mut dev, false, true).unwrap();
		let mut sb_buf = vec![0u8; FS_BLOCK_SIZE];
		dev.read(0, 1, &mut sb_buf).unwrap();
		let sb: &Superblock = unsafe { &*(sb_buf.as_ptr() as *const Superblock) };
		assert_eq!(sb.fold_case, 1);
		assert_eq!(sb.ignore_case, 1);
	}

	#[test]
	fn is_formatted_detects_existing_volume() {
		let mut dev = MemBlockDevice::new(100);
		assert!(!is_formatted(&mut dev).unwrap());
		format(&mut dev, false, false).unwrap();
		assert!(is_formatted(&mut dev).unwrap());
	}
}
