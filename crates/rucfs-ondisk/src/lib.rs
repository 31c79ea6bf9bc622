#![forbid(unsafe_code)]
//! On-disk format parsing for rucfs images.
//!
//! Pure parsing crate: no I/O, no allocation of the tree. Decodes the
//! superblock and individual inode records straight out of a borrowed image
//! and walks contiguous sibling runs by record size.

pub mod inode;
pub mod reader;
pub mod superblock;

pub use inode::{DirRecord, FileRecord, InodeBody, InodeRecord, InodeType, SymlinkRecord};
pub use reader::{RucfsImageReader, SiblingIter};
pub use superblock::RucfsSuperblock;
