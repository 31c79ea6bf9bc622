#![forbid(unsafe_code)]
//! Read-side engine for rucfs images.
//!
//! A [`RucfsImage`] is a validated, borrowed view of one image. Every query
//! (resolution, open, enumeration) works directly on the borrowed bytes and
//! never materializes the tree; results borrow from the image and cannot
//! outlive it.
//!
//! ```text
//! load(bytes) ──► RucfsImage ──► resolve / exists / open / stat
//!                           └──► count_children / list_children / read_dir
//! ```

pub mod path;
mod readdir;
mod resolve;
#[cfg(test)]
mod test_image;

pub use readdir::{DirEntry, ReadDir};
pub use rucfs_error::{Result, RucfsError};
pub use rucfs_ondisk::{InodeRecord, InodeType, RucfsSuperblock};
pub use rucfs_types::{ByteOrder, DataOffset, InodeOffset, StringOffset};

use rucfs_ondisk::{FileRecord, RucfsImageReader};
use rucfs_types::{ParseError, ROOT_NAME};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tracing::debug;

// ── Options ─────────────────────────────────────────────────────────────────

/// Options controlling how an image is loaded.
///
/// Magic and major version are always checked. Root-directory validation is
/// on by default; disable it only to inspect a damaged image.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Skip the root-directory checks (kind, name, empty sentinel).
    pub skip_validation: bool,
}

#[allow(clippy::derivable_impls)]
impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            skip_validation: false,
        }
    }
}

// ── Loaded image ────────────────────────────────────────────────────────────

/// A loaded image: the borrowed bytes, the parsed superblock, and the root.
///
/// `Copy` and `Sync`: any number of threads may resolve against the same
/// image at once, since nothing here is ever mutated after `load`.
#[derive(Debug, Clone, Copy)]
pub struct RucfsImage<'a> {
    image: &'a [u8],
    reader: RucfsImageReader,
    root: InodeRecord,
}

/// Load `image` with default options.
pub fn load(image: &[u8]) -> Result<RucfsImage<'_>> {
    RucfsImage::load(image)
}

impl<'a> RucfsImage<'a> {
    /// Validate `image` and build a read context over it.
    ///
    /// # Errors
    ///
    /// - `Corruption`: bad magic, truncated header, or a root directory that
    ///   breaks its invariants.
    /// - `Unsupported`: major version other than 1.
    pub fn load(image: &'a [u8]) -> Result<Self> {
        Self::load_with_options(image, &LoadOptions::default())
    }

    /// Like [`RucfsImage::load`], with explicit [`LoadOptions`].
    ///
    /// Magic and major version are always checked. With
    /// `skip_validation` the root record is accepted even if it is not a
    /// directory, is not named `"/"`, or is an empty directory without the
    /// no-children sentinel.
    ///
    /// # Errors
    ///
    /// - `Corruption`: bad magic, truncated header, a root record that cannot
    ///   be decoded, or (unless skipped) a root that breaks its invariants.
    /// - `Unsupported`: major version other than 1.
    pub fn load_with_options(image: &'a [u8], options: &LoadOptions) -> Result<Self> {
        let reader = RucfsImageReader::new(image).map_err(|e| parse_to_rucfs_error(&e, 0))?;
        let root = reader
            .read_root(image)
            .map_err(|e| parse_to_rucfs_error(&e, u64::from(reader.sb.inode_table)))?;

        let loaded = Self {
            image,
            reader,
            root,
        };
        if options.skip_validation {
            debug!(inode_table = reader.sb.inode_table, "rucfs_load_unvalidated");
        } else {
            loaded.validate_root()?;
        }

        debug!(
            byte_order = %reader.sb.byte_order,
            version_major = reader.sb.version_major,
            version_minor = reader.sb.version_minor,
            inode_table = reader.sb.inode_table,
            data_table = reader.sb.data_table,
            string_table = reader.sb.string_table,
            root_children = root.as_dir().map_or(0, |d| d.item_count),
            "rucfs_loaded"
        );
        Ok(loaded)
    }

    fn validate_root(&self) -> Result<()> {
        let at = self.record_position(InodeOffset::ROOT);
        let Some(dir) = self.root.as_dir() else {
            return Err(RucfsError::Corruption {
                offset: at,
                detail: format!("root inode is a {}, not a directory", self.root.kind()),
            });
        };
        let name = self.name_of(&self.root)?;
        if name != ROOT_NAME {
            return Err(RucfsError::Corruption {
                offset: at,
                detail: format!(
                    "root inode is named {:?}, expected \"/\"",
                    String::from_utf8_lossy(name)
                ),
            });
        }
        if !dir.sentinel_consistent() {
            return Err(RucfsError::Corruption {
                offset: at,
                detail: format!(
                    "empty root directory has ref_offset {:#x} instead of the no-children sentinel",
                    dir.ref_offset
                ),
            });
        }
        Ok(())
    }

    /// The whole backing image.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.image
    }

    #[must_use]
    pub fn superblock(&self) -> &RucfsSuperblock {
        &self.reader.sb
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.reader.sb.byte_order
    }

    /// The root record. With `skip_validation` this may not be a directory.
    #[must_use]
    pub fn root(&self) -> &InodeRecord {
        &self.root
    }

    /// Like [`RucfsImage::resolve`], but a missing path is `Ok(false)`.
    pub fn exists(&self, path: impl AsRef<[u8]>) -> Result<bool> {
        match self.resolve_bytes(path.as_ref()) {
            Ok(_) => Ok(true),
            Err(RucfsError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Open the file at `path`, following a final one-hop symlink.
    ///
    /// Directories are `NotFound`: only files can be opened.
    pub fn open(&self, path: impl AsRef<[u8]>) -> Result<FileHandle<'a>> {
        let path = path.as_ref();
        let inode = self.resolve_bytes(path)?;
        let Some(file) = inode.record.as_file() else {
            return Err(resolve::not_found(path, "not a file"));
        };
        let data = self.file_data(&inode.record, file)?;
        Ok(FileHandle {
            name: inode.name,
            data,
            data_offset: file.data_offset,
        })
    }

    /// Owned attributes of whatever `path` resolves to.
    pub fn stat(&self, path: impl AsRef<[u8]>) -> Result<EntryAttr> {
        Ok(self.resolve_bytes(path.as_ref())?.attr())
    }

    /// The record at `offset` within the inode table, without any path
    /// lookup. Offsets come from [`Inode::offset`] or [`DirEntry::offset`].
    pub fn inode_at(&self, offset: InodeOffset) -> Result<Inode<'a>> {
        let record = self.record_at(offset)?;
        self.inode(record)
    }

    // ── Bounds-checked record access ────────────────────────────────────────

    /// Absolute image offset of an inode record, for error reports.
    fn record_position(&self, offset: InodeOffset) -> u64 {
        u64::from(self.reader.sb.inode_table) + u64::from(offset.0)
    }

    fn record_at(&self, offset: InodeOffset) -> Result<InodeRecord> {
        self.reader
            .read_inode(self.image, offset)
            .map_err(|e| parse_to_rucfs_error(&e, self.record_position(offset)))
    }

    fn name_of(&self, record: &InodeRecord) -> Result<&'a [u8]> {
        self.reader
            .read_name(self.image, record.name_offset)
            .map_err(|e| {
                parse_to_rucfs_error(
                    &e,
                    u64::from(self.reader.sb.string_table) + u64::from(record.name_offset.0),
                )
            })
    }

    fn file_data(&self, record: &InodeRecord, file: &FileRecord) -> Result<&'a [u8]> {
        self.reader
            .read_file_data(self.image, file)
            .map_err(|e| parse_to_rucfs_error(&e, self.record_position(record.offset)))
    }

    fn inode(&self, record: InodeRecord) -> Result<Inode<'a>> {
        Ok(Inode {
            offset: record.offset,
            name: self.name_of(&record)?,
            record,
        })
    }
}

// ── Resolution results ──────────────────────────────────────────────────────

/// A resolved inode: its offset, decoded record, and borrowed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode<'a> {
    pub offset: InodeOffset,
    pub record: InodeRecord,
    pub name: &'a [u8],
}

impl Inode<'_> {
    #[must_use]
    pub fn kind(&self) -> InodeType {
        self.record.kind()
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind() == InodeType::Directory
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind() == InodeType::File
    }

    #[must_use]
    pub fn name_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name)
    }

    /// Owned attributes of this inode.
    #[must_use]
    pub fn attr(&self) -> EntryAttr {
        let (size, children) = match self.record.body {
            rucfs_ondisk::InodeBody::Directory(dir) => (0, Some(dir.item_count)),
            rucfs_ondisk::InodeBody::File(file) => (u64::from(file.data_length), None),
            rucfs_ondisk::InodeBody::Symlink(_) => (0, None),
        };
        EntryAttr {
            name: self.name_str().into_owned(),
            kind: self.kind(),
            offset: self.offset.0,
            size,
            children,
        }
    }
}

/// Borrowed view of one file's content.
///
/// Nothing is copied: the name and data are slices of the image. Dropping
/// the handle releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle<'a> {
    name: &'a [u8],
    data: &'a [u8],
    data_offset: DataOffset,
}

impl<'a> FileHandle<'a> {
    #[must_use]
    pub fn name(&self) -> &'a [u8] {
        self.name
    }

    #[must_use]
    pub fn name_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name)
    }

    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Start of the content, relative to the data table.
    #[must_use]
    pub fn data_offset(&self) -> DataOffset {
        self.data_offset
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for FileHandle<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data
    }
}

/// Owned attributes of one entry, as reported by [`RucfsImage::stat`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAttr {
    pub name: String,
    pub kind: InodeType,
    /// Inode-table offset of the record.
    pub offset: u32,
    /// Content length for files, zero otherwise.
    pub size: u64,
    /// Child count for directories.
    pub children: Option<u32>,
}

// ── Error mapping ───────────────────────────────────────────────────────────

/// Convert a decoding failure into the caller-facing taxonomy.
///
/// `offset` is the absolute position being decoded; `InsufficientData`
/// carries its own, more precise offset.
fn parse_to_rucfs_error(e: &ParseError, offset: u64) -> RucfsError {
    match e {
        ParseError::UnsupportedVersion { .. } => RucfsError::Unsupported(e.to_string()),
        ParseError::InsufficientData { offset: at, .. } => RucfsError::Corruption {
            offset: u64::try_from(*at).unwrap_or(u64::MAX),
            detail: e.to_string(),
        },
        ParseError::InvalidMagic { .. }
        | ParseError::InvalidField { .. }
        | ParseError::IntegerConversion { .. } => RucfsError::Corruption {
            offset,
            detail: e.to_string(),
        },
    }
}
