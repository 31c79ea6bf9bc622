#![forbid(unsafe_code)]
//! Path resolution over contiguous sibling runs.
//!
//! The resolver keeps three pieces of state: the directory whose run is being
//! scanned, the number of candidates left in that run, and the unmatched
//! suffix of the path. Each step splits one component off the suffix and
//! scans the run for a record whose name equals it byte for byte, advancing
//! by each record's own size. Nothing is allocated.
//!
//! # Symlinks
//!
//! A symlink is followed exactly one hop. As an intermediate component (or
//! with a trailing separator) it must point at a directory; as the final
//! component it must point at a file, and the file is returned in its place.

use crate::{Inode, RucfsImage};
use rucfs_error::{Result, RucfsError};
use rucfs_ondisk::{InodeBody, InodeRecord, InodeType};
use rucfs_types::PATH_SEPARATOR;
use tracing::trace;

impl<'a> RucfsImage<'a> {
    /// Map `path` to the inode it names.
    ///
    /// `path` must be absolute. `"/"` is the root. A trailing separator
    /// requires a directory. Names are compared as raw bytes, so any `&str`,
    /// `String`, or byte slice naming an entry reaches it.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: empty path.
    /// - `NotFound`: no such entry, descent through a non-directory, or a
    ///   symlink whose target is the wrong kind.
    /// - `Corruption`: a record or name on the way lies outside the image.
    pub fn resolve(&self, path: impl AsRef<[u8]>) -> Result<Inode<'a>> {
        self.resolve_bytes(path.as_ref())
    }

    pub(crate) fn resolve_bytes(&self, path: &[u8]) -> Result<Inode<'a>> {
        let Some((&first, mut cursor)) = path.split_first() else {
            return Err(RucfsError::InvalidArgument("empty path".into()));
        };
        // The root's own name is the leading separator.
        if first != PATH_SEPARATOR {
            return Err(not_found(path, "path is not absolute"));
        }
        if cursor.is_empty() {
            return self.inode(self.root);
        }

        let mut dir = self.root;
        loop {
            let (component, rest) = match cursor.iter().position(|b| *b == PATH_SEPARATOR) {
                Some(at) => (&cursor[..at], Some(&cursor[at + 1..])),
                None => (cursor, None),
            };

            let found = self.find_in_run(&dir, component, path)?;
            match rest {
                None => return self.finish(found, path),
                Some(rest) => {
                    let next = self.descend_target(found, path)?;
                    if rest.is_empty() {
                        return self.inode(next);
                    }
                    dir = next;
                    cursor = rest;
                }
            }
        }
    }

    /// Scan `dir`'s sibling run for an entry named `component`.
    fn find_in_run(&self, dir: &InodeRecord, component: &[u8], path: &[u8]) -> Result<InodeRecord> {
        let Some(run) = dir.as_dir() else {
            return Err(not_found(path, "not a directory"));
        };
        if run.is_empty() {
            return Err(not_found(path, "directory is empty"));
        }

        let mut siblings = self.reader.children(self.image, run);
        let mut budget = run.item_count;
        while let Some(next) = siblings.next() {
            let record = next.map_err(|e| {
                let at = siblings.cursor().map_or(0, |c| self.record_position(c));
                crate::parse_to_rucfs_error(&e, at)
            })?;
            let name = self.name_of(&record)?;
            trace!(
                offset = record.offset.0,
                budget,
                matched = name == component,
                "resolve_scan"
            );
            if name == component {
                return Ok(record);
            }
            budget -= 1;
        }
        Err(not_found(path, "no such entry"))
    }

    /// The directory to continue in after matching a non-final component.
    fn descend_target(&self, found: InodeRecord, path: &[u8]) -> Result<InodeRecord> {
        match found.body {
            InodeBody::Directory(_) => Ok(found),
            InodeBody::File(_) => Err(not_found(path, "cannot descend through a file")),
            InodeBody::Symlink(link) => {
                let target = self.record_at(link.target)?;
                trace!(
                    link = found.offset.0,
                    target = link.target.0,
                    kind = %target.kind(),
                    "resolve_follow_dir_link"
                );
                if target.kind() == InodeType::Directory {
                    Ok(target)
                } else {
                    Err(not_found(path, "symlink does not point at a directory"))
                }
            }
        }
    }

    /// Accept the record matched by the final component.
    fn finish(&self, found: InodeRecord, path: &[u8]) -> Result<Inode<'a>> {
        match found.body {
            InodeBody::Directory(_) | InodeBody::File(_) => self.inode(found),
            InodeBody::Symlink(link) => {
                let target = self.record_at(link.target)?;
                trace!(
                    link = found.offset.0,
                    target = link.target.0,
                    kind = %target.kind(),
                    "resolve_follow_file_link"
                );
                if target.kind() == InodeType::File {
                    self.inode(target)
                } else {
                    Err(not_found(path, "symlink does not point at a file"))
                }
            }
        }
    }
}

pub(crate) fn not_found(path: &[u8], why: &str) -> RucfsError {
    RucfsError::NotFound(format!("{}: {why}", String::from_utf8_lossy(path)))
}
