#![forbid(unsafe_code)]
//! Writer side of the format: assemble a well-formed image from a tree.
//!
//! Records are placed breadth-first. The root takes inode-table offset 0,
//! and every directory's children are written as one contiguous run when
//! that directory is dequeued, so a child directory's own run always lands
//! after the run containing it. Sections follow the superblock in the order
//! inode table, data table, string table.

use anyhow::{Context, Result, bail};
use rucfs_core::path::normalize;
use rucfs_ondisk::{
    DirRecord, FileRecord, InodeBody, InodeRecord, InodeType, RucfsSuperblock, SymlinkRecord,
};
use rucfs_types::{
    ByteOrder, DataOffset, InodeOffset, NO_CHILDREN, RUCFS_FLAG_ENDIAN_BE, RUCFS_SUPERBLOCK_SIZE,
    RUCFS_VERSION_MAJOR, RUCFS_VERSION_MINOR, StringOffset,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Dir(Vec<Node>),
    File(Vec<u8>),
    /// Absolute, normalized image path of the target.
    Symlink(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    name: String,
    kind: NodeKind,
}

impl Node {
    fn inode_type(&self) -> InodeType {
        match self.kind {
            NodeKind::Dir(_) => InodeType::Directory,
            NodeKind::File(_) => InodeType::File,
            NodeKind::Symlink(_) => InodeType::Symlink,
        }
    }
}

/// In-memory tree that serializes to an image.
///
/// Entries are kept in insertion order, which becomes storage order.
/// Missing parent directories are created on demand.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    byte_order: ByteOrder,
    modded_time: u32,
    root: Vec<Node>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrder::Little,
            modded_time: 0,
            root: Vec::new(),
        }
    }

    #[must_use]
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    #[must_use]
    pub fn modded_time(mut self, secs: u32) -> Self {
        self.modded_time = secs;
        self
    }

    /// Add a directory. Adding one that already exists is a no-op.
    pub fn dir(&mut self, path: &str) -> Result<&mut Self> {
        self.insert(path, NodeKind::Dir(Vec::new()))
    }

    pub fn file(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<&mut Self> {
        self.insert(path, NodeKind::File(data.into()))
    }

    /// Add a symlink to `target`, an absolute image path that must exist by
    /// the time [`ImageBuilder::build`] runs.
    pub fn symlink(&mut self, path: &str, target: &str) -> Result<&mut Self> {
        if !target.starts_with('/') {
            bail!("symlink target must be an absolute image path: {target}");
        }
        self.insert(path, NodeKind::Symlink(normalize(target, false)))
    }

    fn insert(&mut self, path: &str, kind: NodeKind) -> Result<&mut Self> {
        let normalized = normalize(path, false);
        let Some(rest) = normalized.strip_prefix('/') else {
            bail!("image path must be absolute: {path}");
        };
        if rest.is_empty() {
            if matches!(kind, NodeKind::Dir(_)) {
                return Ok(self);
            }
            bail!("cannot replace the root directory");
        }
        if rest.contains('\0') {
            bail!("image path contains a NUL byte: {path:?}");
        }

        let mut parts: Vec<&str> = rest.split('/').collect();
        let leaf = parts.pop().context("path has no final component")?;

        let mut siblings = &mut self.root;
        for part in parts {
            let idx = match siblings.iter().position(|n| n.name == part) {
                Some(idx) => idx,
                None => {
                    siblings.push(Node {
                        name: part.to_owned(),
                        kind: NodeKind::Dir(Vec::new()),
                    });
                    siblings.len() - 1
                }
            };
            siblings = match &mut siblings[idx].kind {
                NodeKind::Dir(children) => children,
                _ => bail!("{part} in {path} is not a directory"),
            };
        }

        if let Some(existing) = siblings.iter().find(|n| n.name == leaf) {
            if matches!((&existing.kind, &kind), (NodeKind::Dir(_), NodeKind::Dir(_))) {
                return Ok(self);
            }
            bail!("duplicate entry: {normalized}");
        }
        siblings.push(Node {
            name: leaf.to_owned(),
            kind,
        });
        Ok(self)
    }

    /// Mirror a host directory tree.
    ///
    /// Entries are added in name order. A host symlink whose target lies
    /// inside `root` becomes an image symlink; any other symlink is followed
    /// and its target copied in.
    pub fn from_host_dir(root: &Path) -> Result<Self> {
        let host_root = std::path::absolute(root)
            .with_context(|| format!("failed to resolve {}", root.display()))?;
        if !host_root.is_dir() {
            bail!("{} is not a directory", root.display());
        }
        let mut builder = Self::new();
        builder.add_host_children(&host_root, &host_root, "")?;
        Ok(builder)
    }

    fn add_host_children(&mut self, host_root: &Path, dir: &Path, image_dir: &str) -> Result<()> {
        let mut entries = fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("failed to list {}", dir.display()))?;
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let host_path = entry.path();
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                bail!("non UTF-8 file name under {}", dir.display());
            };
            let image_path = format!("{image_dir}/{name}");
            let meta = fs::symlink_metadata(&host_path)
                .with_context(|| format!("failed to stat {}", host_path.display()))?;

            if meta.file_type().is_symlink() {
                let target = fs::read_link(&host_path)
                    .with_context(|| format!("failed to read link {}", host_path.display()))?;
                if let Some(image_target) = image_link_target(host_root, &host_path, &target) {
                    self.symlink(&image_path, &image_target)?;
                    continue;
                }
            }

            let followed = fs::metadata(&host_path)
                .with_context(|| format!("failed to stat {}", host_path.display()))?;
            if followed.is_dir() {
                self.dir(&image_path)?;
                self.add_host_children(host_root, &host_path, &image_path)?;
            } else {
                let data = fs::read(&host_path)
                    .with_context(|| format!("failed to read {}", host_path.display()))?;
                self.file(&image_path, data)?;
            }
        }
        Ok(())
    }

    /// Serialize the tree.
    pub fn build(&self) -> Result<Vec<u8>> {
        let order = self.byte_order;
        let root = Node {
            name: "/".to_owned(),
            kind: NodeKind::Dir(self.root.clone()),
        };

        // Pass 1: place every record breadth-first.
        let mut placed: Vec<Placed<'_>> = vec![Placed {
            node: &root,
            path: "/".to_owned(),
            offset: 0,
            run: NO_CHILDREN,
        }];
        let mut cursor = to_u32(InodeType::Directory.record_size(), "inode table")?;
        let mut next = 0;
        while next < placed.len() {
            let node = placed[next].node;
            if let NodeKind::Dir(children) = &node.kind {
                if !children.is_empty() {
                    placed[next].run = cursor;
                }
                let parent = placed[next].path.clone();
                for child in children {
                    placed.push(Placed {
                        node: child,
                        path: join_image_path(&parent, &child.name),
                        offset: cursor,
                        run: NO_CHILDREN,
                    });
                    cursor = cursor
                        .checked_add(to_u32(child.inode_type().record_size(), "record")?)
                        .context("inode table exceeds the 32-bit offset range")?;
                }
            }
            next += 1;
        }
        let by_path: HashMap<&str, u32> = placed
            .iter()
            .map(|p| (p.path.as_str(), p.offset))
            .collect();

        // Pass 2: encode records, interning names and appending content.
        let mut inodes = Vec::new();
        let mut data = Vec::new();
        let mut strings = Vec::new();
        let mut interned: HashMap<&str, u32> = HashMap::new();
        for p in &placed {
            let name_offset = match interned.get(p.node.name.as_str()) {
                Some(&at) => at,
                None => {
                    let at = to_u32(strings.len(), "string table")?;
                    strings.extend_from_slice(p.node.name.as_bytes());
                    strings.push(0);
                    interned.insert(p.node.name.as_str(), at);
                    at
                }
            };
            let body = match &p.node.kind {
                NodeKind::Dir(children) => InodeBody::Directory(DirRecord {
                    item_count: to_u32(children.len(), "item_count")?,
                    ref_offset: p.run,
                }),
                NodeKind::File(content) => {
                    let data_offset = to_u32(data.len(), "data table")?;
                    data.extend_from_slice(content);
                    InodeBody::File(FileRecord {
                        data_offset: DataOffset(data_offset),
                        data_length: to_u32(content.len(), "data_length")?,
                    })
                }
                NodeKind::Symlink(target) => {
                    let Some(&target) = by_path.get(target.as_str()) else {
                        bail!("symlink {} points at missing {target}", p.path);
                    };
                    InodeBody::Symlink(SymlinkRecord {
                        target: InodeOffset(target),
                    })
                }
            };
            inodes.extend_from_slice(
                &InodeRecord {
                    offset: InodeOffset(p.offset),
                    name_offset: StringOffset(name_offset),
                    body,
                }
                .to_bytes(order),
            );
        }

        let inode_table = to_u32(RUCFS_SUPERBLOCK_SIZE, "inode table")?;
        let data_table = inode_table
            .checked_add(to_u32(inodes.len(), "inode table")?)
            .context("image exceeds the 32-bit offset range")?;
        let string_table = data_table
            .checked_add(to_u32(data.len(), "data table")?)
            .context("image exceeds the 32-bit offset range")?;

        let sb = RucfsSuperblock {
            version_major: RUCFS_VERSION_MAJOR,
            version_minor: RUCFS_VERSION_MINOR,
            modded_time: self.modded_time,
            flags: if order == ByteOrder::Big {
                RUCFS_FLAG_ENDIAN_BE
            } else {
                0
            },
            byte_order: order,
            inode_table,
            data_table,
            string_table,
            reserved: 0,
        };

        let mut image =
            Vec::with_capacity(RUCFS_SUPERBLOCK_SIZE + inodes.len() + data.len() + strings.len());
        image.extend_from_slice(&sb.to_bytes());
        image.extend_from_slice(&inodes);
        image.extend_from_slice(&data);
        image.extend_from_slice(&strings);

        debug!(
            records = placed.len(),
            inode_bytes = inodes.len(),
            data_bytes = data.len(),
            string_bytes = strings.len(),
            byte_order = %order,
            "image_built"
        );
        Ok(image)
    }
}

struct Placed<'n> {
    node: &'n Node,
    path: String,
    offset: u32,
    /// First child offset, or `NO_CHILDREN`.
    run: u32,
}

fn join_image_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("{what} exceeds the 32-bit offset range"))
}

/// Map a host symlink target to an absolute image path, if it stays inside
/// `host_root`. Resolution is lexical; nothing on disk is consulted.
fn image_link_target(host_root: &Path, link: &Path, target: &Path) -> Option<String> {
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        link.parent()?.join(target)
    };
    let resolved = lexical(&joined);
    let inside = resolved.strip_prefix(lexical(host_root)).ok()?;

    let mut out = String::new();
    for part in inside.components() {
        out.push('/');
        out.push_str(part.as_os_str().to_str()?);
    }
    if out.is_empty() {
        out.push('/');
    }
    Some(out)
}

fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
