#![forbid(unsafe_code)]

use rucfs_types::{
    ByteOrder, ParseError, RUCFS_MAGIC, RUCFS_SUPERBLOCK_SIZE, RUCFS_VERSION_MAJOR, SB_DATA_TABLE,
    SB_FLAGS, SB_INODE_TABLE, SB_MAGIC, SB_MODDED_TIME, SB_RESERVED, SB_STRING_TABLE,
    SB_VERSION_MAJOR, SB_VERSION_MINOR, read_fixed, read_u8,
};
use serde::{Deserialize, Serialize};

/// The fixed 32-byte header at offset 0 of an image.
///
/// The three table offsets are absolute image offsets. They are not checked
/// against the image length here; every later read is bounds-checked instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RucfsSuperblock {
    pub version_major: u8,
    pub version_minor: u8,
    /// Opaque build timestamp, never interpreted.
    pub modded_time: u32,
    pub flags: u32,
    pub byte_order: ByteOrder,
    pub inode_table: u32,
    pub data_table: u32,
    pub string_table: u32,
    pub reserved: u32,
}

impl RucfsSuperblock {
    /// Parse and validate the superblock at the start of `image`.
    ///
    /// Checks, in order: the 6-byte magic (terminator included), the major
    /// version, and the byte-order flag.
    pub fn parse_from_image(image: &[u8]) -> Result<Self, ParseError> {
        let magic: [u8; 6] = read_fixed(image, SB_MAGIC)?;
        if magic != RUCFS_MAGIC {
            return Err(ParseError::InvalidMagic {
                expected: RUCFS_MAGIC,
                actual: magic,
            });
        }

        let version_major = read_u8(image, SB_VERSION_MAJOR)?;
        let version_minor = read_u8(image, SB_VERSION_MINOR)?;
        if version_major != RUCFS_VERSION_MAJOR {
            return Err(ParseError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }

        let byte_order = ByteOrder::from_flags_bytes(read_fixed(image, SB_FLAGS)?)?;

        Ok(Self {
            version_major,
            version_minor,
            modded_time: byte_order.read_u32(image, SB_MODDED_TIME)?,
            flags: byte_order.read_u32(image, SB_FLAGS)?,
            byte_order,
            inode_table: byte_order.read_u32(image, SB_INODE_TABLE)?,
            data_table: byte_order.read_u32(image, SB_DATA_TABLE)?,
            string_table: byte_order.read_u32(image, SB_STRING_TABLE)?,
            reserved: byte_order.read_u32(image, SB_RESERVED)?,
        })
    }

    /// Encode this superblock in its own byte order.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; RUCFS_SUPERBLOCK_SIZE] {
        let order = self.byte_order;
        let mut out = [0_u8; RUCFS_SUPERBLOCK_SIZE];
        out[SB_MAGIC..SB_MAGIC + 6].copy_from_slice(&RUCFS_MAGIC);
        out[SB_VERSION_MAJOR] = self.version_major;
        out[SB_VERSION_MINOR] = self.version_minor;
        out[SB_MODDED_TIME..SB_MODDED_TIME + 4].copy_from_slice(&order.u32_bytes(self.modded_time));
        out[SB_FLAGS..SB_FLAGS + 4].copy_from_slice(&order.u32_bytes(self.flags));
        out[SB_INODE_TABLE..SB_INODE_TABLE + 4].copy_from_slice(&order.u32_bytes(self.inode_table));
        out[SB_DATA_TABLE..SB_DATA_TABLE + 4].copy_from_slice(&order.u32_bytes(self.data_table));
        out[SB_STRING_TABLE..SB_STRING_TABLE + 4]
            .copy_from_slice(&order.u32_bytes(self.string_table));
        out[SB_RESERVED..SB_RESERVED + 4].copy_from_slice(&order.u32_bytes(self.reserved));
        out
    }

    #[must_use]
    pub fn is_big_endian(&self) -> bool {
        self.byte_order == ByteOrder::Big
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rucfs_types::RUCFS_FLAG_ENDIAN_BE;

    fn sample(byte_order: ByteOrder) -> RucfsSuperblock {
        RucfsSuperblock {
            version_major: 1,
            version_minor: 0,
            modded_time: 1_700_000_000,
            flags: if byte_order == ByteOrder::Big {
                RUCFS_FLAG_ENDIAN_BE
            } else {
                0
            },
            byte_order,
            inode_table: 0x20,
            data_table: 0x2D,
            string_table: 0x2F,
            reserved: 0,
        }
    }

    #[test]
    fn parse_little_endian_superblock() {
        let sb = sample(ByteOrder::Little);
        let bytes = sb.to_bytes();
        assert_eq!(&bytes[..6], b"rucfs\0");
        assert_eq!(bytes[6], 1);
        assert_eq!(&bytes[0x10..0x14], &[0x20, 0, 0, 0]);

        let parsed = RucfsSuperblock::parse_from_image(&bytes).expect("parse");
        assert_eq!(parsed, sb);
        assert!(!parsed.is_big_endian());
    }

    #[test]
    fn parse_big_endian_superblock() {
        let sb = sample(ByteOrder::Big);
        let bytes = sb.to_bytes();
        assert_eq!(&bytes[0x0C..0x10], &[0, 0, 0, 1]);
        assert_eq!(&bytes[0x10..0x14], &[0, 0, 0, 0x20]);

        let parsed = RucfsSuperblock::parse_from_image(&bytes).expect("parse");
        assert_eq!(parsed.inode_table, 0x20);
        assert_eq!(parsed.data_table, 0x2D);
        assert!(parsed.is_big_endian());
    }

    #[test]
    fn magic_must_include_terminator() {
        let mut bytes = sample(ByteOrder::Little).to_bytes();
        bytes[5] = b'!';
        assert!(matches!(
            RucfsSuperblock::parse_from_image(&bytes),
            Err(ParseError::InvalidMagic { .. })
        ));

        bytes[..6].copy_from_slice(b"squash");
        assert!(matches!(
            RucfsSuperblock::parse_from_image(&bytes),
            Err(ParseError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn wrong_major_version_is_unsupported() {
        let mut bytes = sample(ByteOrder::Little).to_bytes();
        bytes[SB_VERSION_MAJOR] = 2;
        bytes[SB_VERSION_MINOR] = 3;
        assert_eq!(
            RucfsSuperblock::parse_from_image(&bytes),
            Err(ParseError::UnsupportedVersion { major: 2, minor: 3 })
        );
    }

    #[test]
    fn minor_version_is_not_checked() {
        let mut bytes = sample(ByteOrder::Little).to_bytes();
        bytes[SB_VERSION_MINOR] = 9;
        let parsed = RucfsSuperblock::parse_from_image(&bytes).expect("parse");
        assert_eq!(parsed.version_minor, 9);
    }

    #[test]
    fn truncated_header_reports_insufficient_data() {
        let bytes = sample(ByteOrder::Little).to_bytes();
        assert!(matches!(
            RucfsSuperblock::parse_from_image(&bytes[..3]),
            Err(ParseError::InsufficientData { .. })
        ));
        assert!(matches!(
            RucfsSuperblock::parse_from_image(&bytes[..20]),
            Err(ParseError::InsufficientData { .. })
        ));
    }

    #[test]
    fn contradictory_endian_flag_is_rejected() {
        let mut bytes = sample(ByteOrder::Little).to_bytes();
        bytes[SB_FLAGS] = 0x01;
        assert!(matches!(
            RucfsSuperblock::parse_from_image(&bytes),
            Err(ParseError::InvalidField { field: "flags", .. })
        ));
    }
}
