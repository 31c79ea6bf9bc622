#![forbid(unsafe_code)]

use crate::{Inode, RucfsImage};
use rucfs_error::{Result, RucfsError};
use rucfs_ondisk::{DirRecord, InodeType, SiblingIter};
use rucfs_types::{INODE_SYMLINK_SIZE, InodeOffset};
use std::borrow::Cow;
use std::iter::FusedIterator;
use tracing::trace;

/// One immediate child of a directory. The name borrows from the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry<'a> {
    pub name: &'a [u8],
    pub kind: InodeType,
    /// Inode-table offset of the child record.
    pub offset: InodeOffset,
}

impl<'a> DirEntry<'a> {
    /// Return the name as UTF-8 (lossy).
    #[must_use]
    pub fn name_str(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.name)
    }
}

impl<'a> RucfsImage<'a> {
    /// Resolve `path` and require a directory.
    fn resolve_dir(&self, path: &[u8]) -> Result<DirRecord> {
        let inode = self.resolve_bytes(path)?;
        inode
            .record
            .as_dir()
            .copied()
            .ok_or_else(|| crate::resolve::not_found(path, "not a directory"))
    }

    /// Number of immediate children of the directory at `path`.
    pub fn count_children(&self, path: impl AsRef<[u8]>) -> Result<u32> {
        Ok(self.resolve_dir(path.as_ref())?.item_count)
    }

    /// List the immediate children of the directory at `path`, in storage order.
    ///
    /// `capacity` is the most entries the caller is prepared to take; it must
    /// be at least the directory's child count. Either every child is
    /// returned or nothing is.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: `capacity` is smaller than the child count.
    /// - `NotFound`: `path` is missing or not a directory.
    /// - `OutOfMemory`: the result vector could not be reserved.
    /// - `Corruption`: a child record or name lies outside the image.
    pub fn list_children(
        &self,
        path: impl AsRef<[u8]>,
        capacity: usize,
    ) -> Result<Vec<DirEntry<'a>>> {
        let path = path.as_ref();
        let dir = self.resolve_dir(path)?;
        let count = rucfs_types::u32_to_usize(dir.item_count, "item_count")
            .map_err(|e| crate::parse_to_rucfs_error(&e, 0))?;
        if capacity < count {
            return Err(RucfsError::InvalidArgument(format!(
                "capacity {capacity} is smaller than the {count} children of {}",
                String::from_utf8_lossy(path)
            )));
        }

        // Every record is at least a symlink's size, which caps any real run.
        if count > self.image.len() / INODE_SYMLINK_SIZE {
            return Err(RucfsError::Corruption {
                offset: dir
                    .first_child()
                    .map_or(0, |first| self.record_position(first)),
                detail: format!("item_count {count} cannot fit in a {}-byte image", self.image.len()),
            });
        }

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(count)
            .map_err(|_| RucfsError::OutOfMemory)?;
        for entry in self.entries(&dir) {
            entries.push(entry?);
        }
        trace!(path = %String::from_utf8_lossy(path), count, "list_children");
        Ok(entries)
    }

    /// Lazily iterate the immediate children of the directory at `path`.
    pub fn read_dir(&self, path: impl AsRef<[u8]>) -> Result<ReadDir<'a>> {
        let dir = self.resolve_dir(path.as_ref())?;
        Ok(self.entries(&dir))
    }

    /// Iterate the children of an already resolved directory, without any
    /// path lookup.
    pub fn dir_entries(&self, dir: &Inode<'a>) -> Result<ReadDir<'a>> {
        let Some(run) = dir.record.as_dir() else {
            return Err(RucfsError::NotFound(format!(
                "{}: not a directory",
                dir.name_str()
            )));
        };
        Ok(self.entries(run))
    }

    fn entries(&self, dir: &DirRecord) -> ReadDir<'a> {
        ReadDir {
            fs: *self,
            siblings: self.reader.children(self.image, dir),
            done: false,
        }
    }
}

/// Iterator over a directory's children, returned by [`RucfsImage::read_dir`].
///
/// Yields at most `item_count` entries and stops after the first error,
/// whether the failing part is the record or its name.
#[derive(Debug, Clone)]
pub struct ReadDir<'a> {
    fs: RucfsImage<'a>,
    siblings: SiblingIter<'a>,
    done: bool,
}

impl<'a> Iterator for ReadDir<'a> {
    type Item = Result<DirEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let record = match self.siblings.next()? {
            Ok(record) => record,
            Err(e) => {
                self.done = true;
                let at = self
                    .siblings
                    .cursor()
                    .map_or(0, |c| self.fs.record_position(c));
                return Some(Err(crate::parse_to_rucfs_error(&e, at)));
            }
        };
        let entry = self.fs.name_of(&record).map(|name| DirEntry {
            name,
            kind: record.kind(),
            offset: record.offset,
        });
        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            (0, Some(0))
        } else {
            self.siblings.size_hint()
        }
    }
}

impl FusedIterator for ReadDir<'_> {}
