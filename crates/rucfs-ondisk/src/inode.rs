#![forbid(unsafe_code)]

use rucfs_types::{
    ByteOrder, DataOffset, INODE_COMMON_SIZE, INODE_DIRECTORY_SIZE, INODE_FILE_SIZE,
    INODE_SYMLINK_SIZE, INODE_TAG_DIRECTORY, INODE_TAG_FILE, INODE_TAG_SYMLINK, InodeOffset,
    NO_CHILDREN, ParseError, StringOffset, ensure_slice, read_u8,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inode kind, decoded from the leading tag byte of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InodeType {
    Directory,
    File,
    Symlink,
}

impl InodeType {
    #[must_use]
    pub fn from_raw(tag: u8) -> Option<Self> {
        match tag {
            INODE_TAG_DIRECTORY => Some(Self::Directory),
            INODE_TAG_FILE => Some(Self::File),
            INODE_TAG_SYMLINK => Some(Self::Symlink),
            _ => None,
        }
    }

    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Directory => INODE_TAG_DIRECTORY,
            Self::File => INODE_TAG_FILE,
            Self::Symlink => INODE_TAG_SYMLINK,
        }
    }

    /// Encoded size of a record of this kind, header included.
    #[must_use]
    pub const fn record_size(self) -> usize {
        match self {
            Self::Directory => INODE_DIRECTORY_SIZE,
            Self::File => INODE_FILE_SIZE,
            Self::Symlink => INODE_SYMLINK_SIZE,
        }
    }
}

impl fmt::Display for InodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Symlink => "symlink",
        })
    }
}

/// Directory payload: a count and the start of a contiguous sibling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirRecord {
    pub item_count: u32,
    /// Raw `ref_offset`. Holds `NO_CHILDREN` when the directory is empty.
    pub ref_offset: u32,
}

impl DirRecord {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Offset of the first child, or `None` for an empty directory.
    #[must_use]
    pub fn first_child(&self) -> Option<InodeOffset> {
        if self.is_empty() {
            None
        } else {
            Some(InodeOffset(self.ref_offset))
        }
    }

    /// An empty directory must carry the `NO_CHILDREN` sentinel.
    #[must_use]
    pub fn sentinel_consistent(&self) -> bool {
        self.item_count != 0 || self.ref_offset == NO_CHILDREN
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub data_offset: DataOffset,
    pub data_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkRecord {
    pub target: InodeOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InodeBody {
    Directory(DirRecord),
    File(FileRecord),
    Symlink(SymlinkRecord),
}

/// A decoded inode record together with its own inode-table offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InodeRecord {
    pub offset: InodeOffset,
    pub name_offset: StringOffset,
    pub body: InodeBody,
}

impl InodeRecord {
    /// Decode the record whose first byte sits at absolute image index `at`.
    ///
    /// `offset` is the same position expressed relative to the inode table;
    /// it is only carried along so later steps can compute the next sibling.
    pub fn parse_at(
        image: &[u8],
        at: usize,
        offset: InodeOffset,
        order: ByteOrder,
    ) -> Result<Self, ParseError> {
        let tag = read_u8(image, at)?;
        let kind = InodeType::from_raw(tag).ok_or(ParseError::InvalidField {
            field: "inode_type",
            reason: "unknown inode type tag",
        })?;

        // Claim the whole record up front so a truncated tail is reported once.
        ensure_slice(image, at, kind.record_size())?;

        let name_offset = StringOffset(order.read_u32(image, at + 1)?);
        let payload = at + INODE_COMMON_SIZE;
        let body = match kind {
            InodeType::Directory => InodeBody::Directory(DirRecord {
                item_count: order.read_u32(image, payload)?,
                ref_offset: order.read_u32(image, payload + 4)?,
            }),
            InodeType::File => InodeBody::File(FileRecord {
                data_offset: DataOffset(order.read_u32(image, payload)?),
                data_length: order.read_u32(image, payload + 4)?,
            }),
            InodeType::Symlink => InodeBody::Symlink(SymlinkRecord {
                target: InodeOffset(order.read_u32(image, payload)?),
            }),
        };

        Ok(Self {
            offset,
            name_offset,
            body,
        })
    }

    /// Encode this record in `order`, the inverse of [`InodeRecord::parse_at`].
    #[must_use]
    pub fn to_bytes(&self, order: ByteOrder) -> Vec<u8> {
        let kind = self.kind();
        let mut out = Vec::with_capacity(kind.record_size());
        out.push(kind.tag());
        out.extend_from_slice(&order.u32_bytes(self.name_offset.0));
        match self.body {
            InodeBody::Directory(dir) => {
                out.extend_from_slice(&order.u32_bytes(dir.item_count));
                out.extend_from_slice(&order.u32_bytes(dir.ref_offset));
            }
            InodeBody::File(file) => {
                out.extend_from_slice(&order.u32_bytes(file.data_offset.0));
                out.extend_from_slice(&order.u32_bytes(file.data_length));
            }
            InodeBody::Symlink(link) => {
                out.extend_from_slice(&order.u32_bytes(link.target.0));
            }
        }
        out
    }

    #[must_use]
    pub fn kind(&self) -> InodeType {
        match self.body {
            InodeBody::Directory(_) => InodeType::Directory,
            InodeBody::File(_) => InodeType::File,
            InodeBody::Symlink(_) => InodeType::Symlink,
        }
    }

    #[must_use]
    pub fn record_size(&self) -> usize {
        self.kind().record_size()
    }

    /// Offset of the record immediately after this one, `None` on overflow.
    #[must_use]
    pub fn next_offset(&self) -> Option<InodeOffset> {
        self.offset.checked_add(self.record_size())
    }

    #[must_use]
    pub fn as_dir(&self) -> Option<&DirRecord> {
        match &self.body {
            InodeBody::Directory(dir) => Some(dir),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&FileRecord> {
        match &self.body {
            InodeBody::File(file) => Some(file),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_symlink(&self) -> Option<&SymlinkRecord> {
        match &self.body {
            InodeBody::Symlink(link) => Some(link),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_follow_kind() {
        assert_eq!(InodeType::Directory.record_size(), 13);
        assert_eq!(InodeType::File.record_size(), 13);
        assert_eq!(InodeType::Symlink.record_size(), 9);
        for kind in [InodeType::Directory, InodeType::File, InodeType::Symlink] {
            assert_eq!(InodeType::from_raw(kind.tag()), Some(kind));
        }
        assert_eq!(InodeType::from_raw(0), None);
        assert_eq!(InodeType::from_raw(4), None);
    }

    #[test]
    fn parse_directory_record_le() {
        let bytes = [1_u8, 0x05, 0, 0, 0, 2, 0, 0, 0, 0x0D, 0, 0, 0];
        let rec = InodeRecord::parse_at(&bytes, 0, InodeOffset(0), ByteOrder::Little)
            .expect("parse dir");
        assert_eq!(rec.kind(), InodeType::Directory);
        assert_eq!(rec.name_offset, StringOffset(5));
        let dir = rec.as_dir().expect("dir payload");
        assert_eq!(dir.item_count, 2);
        assert_eq!(dir.first_child(), Some(InodeOffset(13)));
        assert_eq!(rec.next_offset(), Some(InodeOffset(13)));
    }

    #[test]
    fn parse_file_record_be() {
        let bytes = [0xAA_u8, 2, 0, 0, 0, 7, 0, 0, 0, 0x10, 0, 0, 0, 0x20];
        let rec = InodeRecord::parse_at(&bytes, 1, InodeOffset(40), ByteOrder::Big)
            .expect("parse file");
        let file = rec.as_file().expect("file payload");
        assert_eq!(rec.name_offset, StringOffset(7));
        assert_eq!(file.data_offset, DataOffset(0x10));
        assert_eq!(file.data_length, 0x20);
        assert_eq!(rec.next_offset(), Some(InodeOffset(53)));
        assert!(rec.as_dir().is_none());
    }

    #[test]
    fn parse_symlink_record() {
        let bytes = [3_u8, 9, 0, 0, 0, 0x1A, 0, 0, 0];
        let rec = InodeRecord::parse_at(&bytes, 0, InodeOffset(26), ByteOrder::Little)
            .expect("parse symlink");
        assert_eq!(
            rec.as_symlink().expect("symlink payload").target,
            InodeOffset(0x1A)
        );
        assert_eq!(rec.next_offset(), Some(InodeOffset(35)));
    }

    #[test]
    fn unknown_tag_is_invalid_field() {
        let bytes = [7_u8; 13];
        assert!(matches!(
            InodeRecord::parse_at(&bytes, 0, InodeOffset(0), ByteOrder::Little),
            Err(ParseError::InvalidField {
                field: "inode_type",
                ..
            })
        ));
    }

    #[test]
    fn truncated_record_is_insufficient_data() {
        let bytes = [1_u8, 0, 0, 0, 0, 1, 0, 0];
        assert!(matches!(
            InodeRecord::parse_at(&bytes, 0, InodeOffset(0), ByteOrder::Little),
            Err(ParseError::InsufficientData { needed: 13, .. })
        ));
    }

    #[test]
    fn empty_directory_sentinel() {
        let empty = DirRecord {
            item_count: 0,
            ref_offset: NO_CHILDREN,
        };
        assert!(empty.is_empty());
        assert!(empty.sentinel_consistent());
        assert_eq!(empty.first_child(), None);

        let broken = DirRecord {
            item_count: 0,
            ref_offset: 13,
        };
        assert!(!broken.sentinel_consistent());
    }

    #[test]
    fn encode_matches_decoder() {
        let rec = InodeRecord {
            offset: InodeOffset(13),
            name_offset: StringOffset(2),
            body: InodeBody::File(FileRecord {
                data_offset: DataOffset(0),
                data_length: 2,
            }),
        };
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = rec.to_bytes(order);
            assert_eq!(bytes.len(), INODE_FILE_SIZE);
            let back = InodeRecord::parse_at(&bytes, 0, InodeOffset(13), order).expect("parse");
            assert_eq!(back, rec);
        }
    }

    #[test]
    fn next_offset_overflow_is_none() {
        let rec = InodeRecord {
            offset: InodeOffset(u32::MAX - 4),
            name_offset: StringOffset(0),
            body: InodeBody::Symlink(SymlinkRecord {
                target: InodeOffset(0),
            }),
        };
        assert_eq!(rec.next_offset(), None);
    }
}
