//! microfs: an ext2-inspired, single-block-per-file filesystem engine over
//! an opaque fixed-size block device.
//!
//! The engine formats a device ([`format::format`]), mounts it into an
//! in-memory handle ([`volume::Volume`]), and services directory and file
//! operations against persistent metadata and data blocks. It is
//! single-threaded and performs no access-control enforcement — callers
//! are trusted, matching the POSIX syscalls this engine's API mirrors.

pub mod attr;
pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod format;
pub mod layout;
pub mod readdir;
pub mod volume;

pub use attr::{Stat, StatFs};
pub use device::{BlockDevice, DeviceError, FileBlockDevice, MemBlockDevice};
pub use error::{FsError, FsResult};
pub use format::{format, is_formatted};
pub use readdir::{closedir, DirStream};
pub use volume::Volume;
