#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Superblock layout ───────────────────────────────────────────────────────

/// Magic tag at byte 0 of every image, terminating NUL included.
pub const RUCFS_MAGIC: [u8; 6] = *b"rucfs\0";
/// The only major format version this crate understands.
pub const RUCFS_VERSION_MAJOR: u8 = 1;
/// Minor version written by the image builder.
pub const RUCFS_VERSION_MINOR: u8 = 0;
/// Size of the fixed superblock header.
pub const RUCFS_SUPERBLOCK_SIZE: usize = 32;

pub const SB_MAGIC: usize = 0x00;
pub const SB_VERSION_MAJOR: usize = 0x06;
pub const SB_VERSION_MINOR: usize = 0x07;
pub const SB_MODDED_TIME: usize = 0x08;
pub const SB_FLAGS: usize = 0x0C;
pub const SB_INODE_TABLE: usize = 0x10;
pub const SB_DATA_TABLE: usize = 0x14;
pub const SB_STRING_TABLE: usize = 0x18;
pub const SB_RESERVED: usize = 0x1C;

/// Superblock flag: multi-byte fields are stored big-endian.
pub const RUCFS_FLAG_ENDIAN_BE: u32 = 0x0000_0001;

// ── Inode records ───────────────────────────────────────────────────────────

/// Common inode header: type tag (1 byte) + name offset (4 bytes).
pub const INODE_COMMON_SIZE: usize = 5;
/// Directory record: header + item_count + ref_offset.
pub const INODE_DIRECTORY_SIZE: usize = INODE_COMMON_SIZE + 8;
/// File record: header + data_offset + data_length.
pub const INODE_FILE_SIZE: usize = INODE_COMMON_SIZE + 8;
/// Symlink record: header + ref_offset.
pub const INODE_SYMLINK_SIZE: usize = INODE_COMMON_SIZE + 4;

pub const INODE_TAG_DIRECTORY: u8 = 1;
pub const INODE_TAG_FILE: u8 = 2;
pub const INODE_TAG_SYMLINK: u8 = 3;

/// `ref_offset` sentinel of a directory that has no children.
pub const NO_CHILDREN: u32 = 0xFFFF_FFFF;

/// Path component separator.
pub const PATH_SEPARATOR: u8 = b'/';
/// Name the root directory carries in the string table.
pub const ROOT_NAME: &[u8] = b"/";

// ── Offset newtypes ─────────────────────────────────────────────────────────

/// Byte offset of an inode record, relative to the inode table base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeOffset(pub u32);

impl InodeOffset {
    /// The root directory is always the first record of the inode table.
    pub const ROOT: Self = Self(0);

    /// Step past a record of `len` bytes, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, len: usize) -> Option<Self> {
        let len = u32::try_from(len).ok()?;
        self.0.checked_add(len).map(Self)
    }
}

/// Byte offset of a NUL-terminated name, relative to the string table base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringOffset(pub u32);

/// Byte offset of file content, relative to the data table base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DataOffset(pub u32);

impl fmt::Display for InodeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for StringOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for DataOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:02x?}, got {actual:02x?}")]
    InvalidMagic { expected: [u8; 6], actual: [u8; 6] },
    #[error("unsupported format version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

// ── Byte order ──────────────────────────────────────────────────────────────

/// Encoding of every multi-byte integer in an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Detect the byte order from the raw superblock flags word.
    ///
    /// A big-endian image stores the flag in the last byte of the word. A
    /// little-endian word that claims big-endian encoding contradicts itself
    /// and is rejected.
    pub fn from_flags_bytes(raw: [u8; 4]) -> Result<Self, ParseError> {
        if u32::from_be_bytes(raw) & RUCFS_FLAG_ENDIAN_BE != 0 {
            return Ok(Self::Big);
        }
        if u32::from_le_bytes(raw) & RUCFS_FLAG_ENDIAN_BE != 0 {
            return Err(ParseError::InvalidField {
                field: "flags",
                reason: "little-endian flags word marks the image big-endian",
            });
        }
        Ok(Self::Little)
    }

    /// Read a `u32` at `offset` in this byte order.
    #[inline]
    pub fn read_u32(self, data: &[u8], offset: usize) -> Result<u32, ParseError> {
        match self {
            Self::Little => read_le_u32(data, offset),
            Self::Big => read_be_u32(data, offset),
        }
    }

    /// Encode a `u32` in this byte order.
    #[must_use]
    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => f.write_str("little-endian"),
            Self::Big => f.write_str("big-endian"),
        }
    }
}

// ── Bounds-checked readers ──────────────────────────────────────────────────

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, ParseError> {
    Ok(ensure_slice(data, offset, 1)?[0])
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_be_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

/// Borrow the NUL-terminated byte string starting at `offset` (terminator excluded).
pub fn read_cstr(data: &[u8], offset: usize) -> Result<&[u8], ParseError> {
    let tail = data.get(offset..).ok_or(ParseError::InsufficientData {
        needed: 1,
        offset,
        actual: 0,
    })?;
    let end = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or(ParseError::InvalidField {
            field: "name",
            reason: "string table entry is not NUL-terminated",
        })?;
    Ok(&tail[..end])
}

/// Resolve a table-relative offset against its table base, as an absolute image index.
pub fn table_index(base: u32, relative: u32, field: &'static str) -> Result<usize, ParseError> {
    let absolute = u64::from(base) + u64::from(relative);
    usize::try_from(absolute).map_err(|_| ParseError::IntegerConversion { field })
}

/// Narrow a `u32` to `usize` with an explicit error path.
pub fn u32_to_usize(value: u32, field: &'static str) -> Result<usize, ParseError> {
    usize::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_helpers() {
        let bytes = [0x34_u8, 0x12, 0x78, 0x56, 0xEF, 0xCD, 0xAB, 0x90];
        assert_eq!(read_u8(&bytes, 1).expect("u8"), 0x12);
        assert_eq!(read_le_u32(&bytes, 0).expect("u32"), 0x5678_1234);
        assert_eq!(read_be_u32(&bytes, 0).expect("u32"), 0x3412_7856);
        assert_eq!(read_fixed::<2>(&bytes, 6).expect("fixed"), [0xAB, 0x90]);
    }

    #[test]
    fn test_read_past_end_reports_insufficient_data() {
        let bytes = [0_u8; 6];
        assert_eq!(
            read_le_u32(&bytes, 4),
            Err(ParseError::InsufficientData {
                needed: 4,
                offset: 4,
                actual: 2,
            })
        );
        assert_eq!(
            ensure_slice(&bytes, usize::MAX, 2),
            Err(ParseError::InvalidField {
                field: "offset",
                reason: "overflow",
            })
        );
    }

    #[test]
    fn test_read_cstr() {
        let strtab = b"/\0hello.txt\0docs\0";
        assert_eq!(read_cstr(strtab, 0).expect("root"), b"/");
        assert_eq!(read_cstr(strtab, 2).expect("file"), b"hello.txt");
        assert_eq!(read_cstr(strtab, 12).expect("dir"), b"docs");
        // Offset pointing at a terminator yields the empty name.
        assert_eq!(read_cstr(strtab, 1).expect("empty"), b"");
    }

    #[test]
    fn test_read_cstr_rejects_unterminated_and_out_of_range() {
        assert!(matches!(
            read_cstr(b"abc", 0),
            Err(ParseError::InvalidField { field: "name", .. })
        ));
        assert!(matches!(
            read_cstr(b"abc\0", 9),
            Err(ParseError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_byte_order_detection() {
        assert_eq!(
            ByteOrder::from_flags_bytes([0, 0, 0, 0]),
            Ok(ByteOrder::Little)
        );
        assert_eq!(
            ByteOrder::from_flags_bytes([0, 0, 0, 1]),
            Ok(ByteOrder::Big)
        );
        // Unrelated flag bits do not change the decision.
        assert_eq!(
            ByteOrder::from_flags_bytes([0x02, 0, 0, 0]),
            Ok(ByteOrder::Little)
        );
        assert!(ByteOrder::from_flags_bytes([1, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_byte_order_read_write_agree() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let bytes = order.u32_bytes(0xDEAD_BEEF);
            assert_eq!(order.read_u32(&bytes, 0), Ok(0xDEAD_BEEF));
        }
        assert_eq!(ByteOrder::Big.u32_bytes(1), [0, 0, 0, 1]);
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(INODE_DIRECTORY_SIZE, 13);
        assert_eq!(INODE_FILE_SIZE, 13);
        assert_eq!(INODE_SYMLINK_SIZE, 9);
        assert_eq!(SB_RESERVED + 4, RUCFS_SUPERBLOCK_SIZE);
    }

    #[test]
    fn test_inode_offset_checked_add() {
        assert_eq!(
            InodeOffset::ROOT.checked_add(INODE_DIRECTORY_SIZE),
            Some(InodeOffset(13))
        );
        assert_eq!(InodeOffset(u32::MAX).checked_add(1), None);
    }

    #[test]
    fn test_table_index() {
        assert_eq!(table_index(0x20, 13, "ref_offset"), Ok(0x2D));
        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            table_index(u32::MAX, u32::MAX, "ref_offset"),
            Ok(2 * (u32::MAX as usize))
        );
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(InodeOffset(0x2D).to_string(), "0x2d");
        assert_eq!(StringOffset(2).to_string(), "0x2");
        assert_eq!(DataOffset(0).to_string(), "0x0");
        assert_eq!(ByteOrder::Big.to_string(), "big-endian");
    }
}
