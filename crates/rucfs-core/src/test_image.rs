//! Hand-laid sample image shared by the unit tests.
//!
//! ```text
//! /                 dir   @0    7 children @13
//! ├── hello.txt     file  @13   "hi"
//! ├── docs          dir   @26   2 children @92
//! │   ├── a.md      file  @92   "alpha"
//! │   └── empty     dir   @105  no children
//! ├── foo           file  @39   "x"
//! ├── foobar        file  @52   "yy"
//! ├── link_docs     link  @65   -> docs
//! ├── link_hello    link  @74   -> hello.txt
//! └── link_link     link  @83   -> link_hello
//! ```

use rucfs_ondisk::{
    DirRecord, FileRecord, InodeBody, InodeRecord, RucfsSuperblock, SymlinkRecord,
};
use rucfs_types::{
    ByteOrder, DataOffset, InodeOffset, NO_CHILDREN, RUCFS_FLAG_ENDIAN_BE, StringOffset,
};

pub const INODE_TABLE: usize = 32;
pub const STRING_TABLE: usize = INODE_TABLE + 118;
pub const DATA_TABLE: usize = STRING_TABLE + 70;

const DATA: &[u8] = b"hixyyalpha";

fn dir(item_count: u32, ref_offset: u32) -> InodeBody {
    InodeBody::Directory(DirRecord {
        item_count,
        ref_offset,
    })
}

fn file(data_offset: u32, data_length: u32) -> InodeBody {
    InodeBody::File(FileRecord {
        data_offset: DataOffset(data_offset),
        data_length,
    })
}

fn link(target: u32) -> InodeBody {
    InodeBody::Symlink(SymlinkRecord {
        target: InodeOffset(target),
    })
}

pub fn sample_image(order: ByteOrder) -> Vec<u8> {
    let entries: [(&str, InodeBody); 10] = [
        ("/", dir(7, 13)),
        ("hello.txt", file(0, 2)),
        ("docs", dir(2, 92)),
        ("foo", file(2, 1)),
        ("foobar", file(3, 2)),
        ("link_docs", link(26)),
        ("link_hello", link(13)),
        ("link_link", link(74)),
        ("a.md", file(5, 5)),
        ("empty", dir(0, NO_CHILDREN)),
    ];

    let mut inodes = Vec::new();
    let mut strings = Vec::new();
    for (name, body) in entries {
        let record = InodeRecord {
            offset: InodeOffset(u32::try_from(inodes.len()).expect("offset")),
            name_offset: StringOffset(u32::try_from(strings.len()).expect("offset")),
            body,
        };
        inodes.extend_from_slice(&record.to_bytes(order));
        strings.extend_from_slice(name.as_bytes());
        strings.push(0);
    }
    assert_eq!(INODE_TABLE + inodes.len(), STRING_TABLE);
    assert_eq!(STRING_TABLE + strings.len(), DATA_TABLE);

    let sb = RucfsSuperblock {
        version_major: 1,
        version_minor: 0,
        modded_time: 1_700_000_000,
        flags: if order == ByteOrder::Big {
            RUCFS_FLAG_ENDIAN_BE
        } else {
            0
        },
        byte_order: order,
        inode_table: u32::try_from(INODE_TABLE).expect("offset"),
        data_table: u32::try_from(DATA_TABLE).expect("offset"),
        string_table: u32::try_from(STRING_TABLE).expect("offset"),
        reserved: 0,
    };

    let mut image = sb.to_bytes().to_vec();
    image.extend_from_slice(&inodes);
    image.extend_from_slice(&strings);
    image.extend_from_slice(DATA);
    image
}

/// Build the sample image, then let `patch` damage it. The second argument
/// is the absolute offset of the inode table.
pub fn sample_image_with(order: ByteOrder, patch: impl FnOnce(&mut [u8], usize)) -> Vec<u8> {
    let mut image = sample_image(order);
    patch(&mut image, INODE_TABLE);
    image
}
