#![forbid(unsafe_code)]

use crate::inode::{DirRecord, FileRecord, InodeRecord};
use crate::superblock::RucfsSuperblock;
use rucfs_types::{
    ByteOrder, InodeOffset, ParseError, StringOffset, ensure_slice, read_cstr, table_index,
    u32_to_usize,
};
use std::iter::FusedIterator;

/// Table-aware reader over a borrowed image.
///
/// Holds only the parsed superblock; every method takes the image slice so
/// the reader itself stays `Copy` and carries no lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RucfsImageReader {
    pub sb: RucfsSuperblock,
}

impl RucfsImageReader {
    /// Parse the superblock and build a reader.
    pub fn new(image: &[u8]) -> Result<Self, ParseError> {
        Ok(Self {
            sb: RucfsSuperblock::parse_from_image(image)?,
        })
    }

    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.sb.byte_order
    }

    /// Absolute image index of an inode-table-relative offset.
    pub fn inode_position(&self, offset: InodeOffset) -> Result<usize, ParseError> {
        table_index(self.sb.inode_table, offset.0, "inode_offset")
    }

    /// Decode the inode record at `offset` within the inode table.
    pub fn read_inode(&self, image: &[u8], offset: InodeOffset) -> Result<InodeRecord, ParseError> {
        let at = self.inode_position(offset)?;
        InodeRecord::parse_at(image, at, offset, self.sb.byte_order)
    }

    /// Decode the root directory record (inode-table offset 0).
    pub fn read_root(&self, image: &[u8]) -> Result<InodeRecord, ParseError> {
        self.read_inode(image, InodeOffset::ROOT)
    }

    /// Borrow a name from the string table, terminator excluded.
    pub fn read_name<'a>(
        &self,
        image: &'a [u8],
        name_offset: StringOffset,
    ) -> Result<&'a [u8], ParseError> {
        let at = table_index(self.sb.string_table, name_offset.0, "name_offset")?;
        read_cstr(image, at)
    }

    /// Borrow the content bytes of a file record.
    pub fn read_file_data<'a>(
        &self,
        image: &'a [u8],
        file: &FileRecord,
    ) -> Result<&'a [u8], ParseError> {
        let at = table_index(self.sb.data_table, file.data_offset.0, "data_offset")?;
        let len = u32_to_usize(file.data_length, "data_length")?;
        ensure_slice(image, at, len)
    }

    /// Iterate the contiguous sibling run owned by `dir`.
    #[must_use]
    pub fn children<'a>(&self, image: &'a [u8], dir: &DirRecord) -> SiblingIter<'a> {
        SiblingIter {
            image,
            reader: *self,
            cursor: dir.first_child(),
            remaining: dir.item_count,
            done: false,
        }
    }
}

/// Zero-allocation iterator over a run of `item_count` adjacent records.
///
/// Advances by the size of each record it decodes, never by a fixed stride.
/// Stops after the first error.
#[derive(Debug, Clone)]
pub struct SiblingIter<'a> {
    image: &'a [u8],
    reader: RucfsImageReader,
    cursor: Option<InodeOffset>,
    remaining: u32,
    done: bool,
}

impl SiblingIter<'_> {
    /// Offset of the next record to decode. After an error this is the
    /// offset that failed.
    #[must_use]
    pub fn cursor(&self) -> Option<InodeOffset> {
        self.cursor
    }

    /// Records still to be visited.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        if self.done { 0 } else { self.remaining }
    }
}

impl Iterator for SiblingIter<'_> {
    type Item = Result<InodeRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == 0 {
            return None;
        }

        let Some(offset) = self.cursor else {
            self.done = true;
            return Some(Err(ParseError::InvalidField {
                field: "ref_offset",
                reason: "sibling run overflows the inode offset range",
            }));
        };

        match self.reader.read_inode(self.image, offset) {
            Ok(record) => {
                self.remaining -= 1;
                self.cursor = record.next_offset();
                Some(Ok(record))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, usize::try_from(self.remaining()).ok())
    }
}

impl FusedIterator for SiblingIter<'_> {}
