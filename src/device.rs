//! Block device abstraction.
//!
//! The engine treats the device as an opaque source of fixed-size block
//! I/O. It never reasons about sectors, partitions, or real hardware; the
//! two implementations here (`MemBlockDevice`, `FileBlockDevice`) are
//! plausible collaborators, not the abstraction boundary itself.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use crate::layout::FS_BLOCK_SIZE;

/// Error returned by a [`BlockDevice`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
	/// `offset < 0 || offset + count > num_blocks()`.
	Size,
	/// The device has been failed or closed.
	Unavailable,
}

impl std::fmt::Display for DeviceError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Size => write!(f, "out-of-range block access"),
			Self::Unavailable => write!(f, "device unavailable"),
		}
	}
}

impl std::error::Error for DeviceError {}

/// Fixed-size block I/O, consumed but not owned by the engine.
pub trait BlockDevice {
	/// Total number of `FS_BLOCK_SIZE`-byte blocks on the device.
	fn num_blocks(&self) -> usize;

	/// Reads `count` blocks starting at `first_blk` into `buf`.
	///
	/// `buf` must be at least `count * FS_BLOCK_SIZE` bytes.
	fn read(&mut self, first_blk: usize, count: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

	/// Writes `count` blocks starting at `first_blk` from `buf`.
	fn write(&mut self, first_blk: usize, count: usize, buf: &[u8]) -> Result<(), DeviceError>;

	/// Flushes `count` blocks starting at `first_blk` to stable storage.
	fn flush(&mut self, first_blk: usize, count: usize) -> Result<(), DeviceError>;

	/// Releases the device. Further use of the device handle is undefined.
	fn close(self: Box<Self>);
}

/// An in-memory block device, principally for tests.
///
/// Mirrors `original_source/fs_dev_memorydev.c`'s `memory_blkdev_create`: a
/// flat buffer of zeroed blocks that can be forced into a failed state.
pub struct MemBlockDevice {
	blocks: Option<Vec<u8>>,
	nblks: usize,
}

impl MemBlockDevice {
	/// Creates a new zero-filled device of `nblks` blocks.
	pub fn new(nblks: usize) -> Self {
		Self {
			blocks: Some(vec![0u8; nblks * FS_BLOCK_SIZE]),
			nblks,
		}
	}

	/// Forces the device into a failed state. After this, every read/write
	/// returns [`DeviceError::Unavailable`].
	pub fn fail(&mut self) {
		self.blocks = None;
	}
}

impl BlockDevice for MemBlockDevice {
	fn num_blocks(&self) -> usize {
		self.nblks
	}

	fn read(&mut self, first_blk: usize, count: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
		let blocks = self.blocks.as_ref().ok_or(DeviceError::Unavailable)?;
		if first_blk + count > self.nblks {
			return Err(DeviceError::Size);
		}
		let off = first_blk * FS_BLOCK_SIZE;
		let len = count * FS_BLOCK_SIZE;
		buf[..len].copy_from_slice(&blocks[off..off + len]);
		Ok(())
	}

	fn write(&mut self, first_blk: usize, count: usize, buf: &[u8]) -> Result<(), DeviceError> {
		if first_blk + count > self.nblks {
			return Err(DeviceError::Size);
		}
		let blocks = self.blocks.as_mut().ok_or(DeviceError::Unavailable)?;
		let off = first_blk * FS_BLOCK_SIZE;
		let len = count * FS_BLOCK_SIZE;
		blocks[off..off + len].copy_from_slice(&buf[..len]);
		Ok(())
	}

	fn flush(&mut self, _first_blk: usize, _count: usize) -> Result<(), DeviceError> {
		if self.blocks.is_none() {
			return Err(DeviceError::Unavailable);
		}
		Ok(())
	}

	fn close(self: Box<Self>) {}
}

/// A block device backed by a regular file or a real block/char device node.
///
/// Grounded on `mkfs/src/ext2.rs`'s direct `seek`/`read_exact`/`write_all`
/// use over a `std::fs::File`, and `utils/src/disk.rs::get_disk_size` for
/// sizing against a real device node.
pub struct FileBlockDevice {
	file: Option<File>,
	nblks: usize,
}

impl FileBlockDevice {
	/// Opens `path` read/write and sizes the device in `FS_BLOCK_SIZE` blocks.
	///
	/// For a block or char device node, the size is queried with the
	/// `BLKGETSIZE64` ioctl; for a regular file, the file's length is used.
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().read(true).write(true).open(path)?;
		let nblks = (disk_size_bytes(path, &file)? / FS_BLOCK_SIZE as u64) as usize;
		Ok(Self {
			file: Some(file),
			nblks,
		})
	}

	/// Creates (or truncates) a plain file of exactly `nblks` blocks and
	/// opens it as a device. Used by tests and by the `mkfs` CLI against an
	/// image file instead of a real block device.
	pub fn create(path: &Path, nblks: usize) -> io::Result<Self> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.create(true)
			.truncate(true)
			.open(path)?;
		file.set_len((nblks * FS_BLOCK_SIZE) as u64)?;
		Ok(Self {
			file: Some(file),
			nblks,
		})
	}
}

fn disk_size_bytes(path: &Path, file: &File) -> io::Result<u64> {
	let metadata = std::fs::metadata(path)?;
	let file_type = metadata.file_type();
	if file_type.is_block_device() || file_type.is_char_device() {
		block_device_size(file)
	} else {
		Ok(metadata.len())
	}
}

#[cfg(target_os = "linux")]
fn block_device_size(file: &File) -> io::Result<u64> {
	use std::os::fd::AsRawFd;

	macro_rules! ior {
		($nr:expr, $ty:ty) => {
			(2u64 << 30) | (0x12u64 << 8) | ($nr) | ((std::mem::size_of::<$ty>() as u64) << 16)
		};
	}
	const BLKGETSIZE64: u64 = ior!(114, u64);

	let mut size: u64 = 0;
	let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
	if ret < 0 {
		return Err(io::Error::last_os_error());
	}
	Ok(size)
}

#[cfg(not(target_os = "linux"))]
fn block_device_size(file: &File) -> io::Result<u64> {
	file.metadata().map(|m| m.len())
}

impl BlockDevice for FileBlockDevice {
	fn num_blocks(&self) -> usize {
		self.nblks
	}

	fn read(&mut self, first_blk: usize, count: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
		if first_blk + count > self.nblks {
			return Err(DeviceError::Size);
		}
		let file = self.file.as_mut().ok_or(DeviceError::Unavailable)?;
		let len = count * FS_BLOCK_SIZE;
		file.seek(SeekFrom::Start((first_blk * FS_BLOCK_SIZE) as u64))
			.map_err(|_| DeviceError::Unavailable)?;
		file.read_exact(&mut buf[..len])
			.map_err(|_| DeviceError::Unavailable)?;
		Ok(())
	}

	fn write(&mut self, first_blk: usize, count: usize, buf: &[u8]) -> Result<(), DeviceError> {
		if first_blk + count > self.nblks {
			return Err(DeviceError::Size);
		}
		let file = self.file.as_mut().ok_or(DeviceError::Unavailable)?;
		let len = count * FS_BLOCK_SIZE;
		file.seek(SeekFrom::Start((first_blk * FS_BLOCK_SIZE) as u64))
			.map_err(|_| DeviceError::Unavailable)?;
		file.write_all(&buf[..len])
			.map_err(|_| DeviceError::Unavailable)?;
		Ok(())
	}

	fn flush(&mut self, _first_blk: usize, _count: usize) -> Result<(), DeviceError> {
		let file = self.file.as_mut().ok_or(DeviceError::Unavailable)?;
		file.flush().map_err(|_| DeviceError::Unavailable)
	}

	fn close(mut self: Box<Self>) {
		self.file.take();
	}
}

/// Wraps a [`MemBlockDevice`], letting the first `allow` writes through and
/// failing every write after that. Reads and `flush` always forward
/// normally, so a volume can mount and populate its in-memory state before
/// any write trips the failure.
#[cfg(test)]
pub(crate) struct FailAfterWrites {
	inner: MemBlockDevice,
	allow: usize,
}

#[cfg(test)]
impl FailAfterWrites {
	pub(crate) fn new(inner: MemBlockDevice, allow: usize) -> Self {
		Self { inner, allow }
	}
}

#[cfg(test)]
impl BlockDevice for FailAfterWrites {
	fn num_blocks(&self) -> usize {
		self.inner.num_blocks()
	}

	fn read(&mut self, first_blk: usize, count: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
		self.inner.read(first_blk, count, buf)
	}

	fn write(&mut self, first_blk: usize, count: usize, buf: &[u8]) -> Result<(), DeviceError> {
		if self.allow == 0 {
			return Err(DeviceError::Unavailable);
		}
		self.allow -= 1;
		self.inner.write(first_blk, count, buf)
	}

	fn flush(&mut self, first_blk: usize, count: usize) -> Result<(), DeviceError> {
		self.inner.flush(first_blk, count)
	}

	fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn mem_device_round_trip() {
		let mut dev = MemBlockDevice::new(4);
		let block = vec![0xab; FS_BLOCK_SIZE];
		dev.write(1, 1, &block).unwrap();
		let mut out = vec![0u8; FS_BLOCK_SIZE];
		dev.read(1, 1, &mut out).unwrap();
		assert_eq!(out, block);
	}

	#[test]
	fn mem_device_rejects_out_of_range() {
		let mut dev = MemBlockDevice::new(4);
		let mut out = vec![0u8; FS_BLOCK_SIZE];
		assert_eq!(dev.read(3, 2, &mut out), Err(DeviceError::Size));
	}

	#[test]
	fn mem_device_fails_after_fail() {
		let mut dev = MemBlockDevice::new(4);
		dev.fail();
		let mut out = vec![0u8; FS_BLOCK_SIZE];
		assert_eq!(dev.read(0, 1, &mut out), Err(DeviceError::Unavailable));
		assert_eq!(dev.flush(0, 4), Err(DeviceError::Unavailable));
	}

	#[test]
	fn file_device_round_trip() {
		let path = std::env::temp_dir().join(format!("microfs-test-{}.img", std::process::id()));
		let mut dev = FileBlockDevice::create(&path, 4).unwrap();
		let block = vec![0x42; FS_BLOCK_SIZE];
		dev.write(2, 1, &block).unwrap();
		let mut out = vec![0u8; FS_BLOCK_SIZE];
		dev.read(2, 1, &mut out).unwrap();
		assert_eq!(out, block);
		std::fs::remove_file(&path).unwrap();
	}
}
