#![forbid(unsafe_code)]

pub mod builder;

pub use builder::ImageBuilder;

use anyhow::{Context, Result, bail};
use rucfs_core::{RucfsImage, RucfsSuperblock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseFixture {
    pub size: usize,
    pub writes: Vec<FixtureWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureWrite {
    pub offset: usize,
    pub hex: String,
}

pub fn load_sparse_fixture(path: &Path) -> Result<Vec<u8>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    let fixture: SparseFixture = serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))?;
    fixture.materialize()
}

impl SparseFixture {
    /// Expand into a zero-filled buffer of `size` bytes with every write applied.
    pub fn materialize(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0_u8; self.size];
        for write in &self.writes {
            let payload = hex::decode(&write.hex)
                .with_context(|| format!("invalid hex at offset {}", write.offset))?;

            let end = write
                .offset
                .checked_add(payload.len())
                .context("fixture offset overflow")?;
            if end > bytes.len() {
                bail!(
                    "fixture write out of bounds: offset={} payload={} size={}",
                    write.offset,
                    payload.len(),
                    bytes.len()
                );
            }

            bytes[write.offset..end].copy_from_slice(&payload);
        }
        Ok(bytes)
    }

    /// Describe `image` as its non-zero spans. Zero runs shorter than
    /// `min_gap` stay inside a span.
    #[must_use]
    pub fn from_image(image: &[u8], min_gap: usize) -> Self {
        let mut writes = Vec::new();
        let mut i = 0;
        while i < image.len() {
            if image[i] == 0 {
                i += 1;
                continue;
            }
            let start = i;
            let mut end = i;
            let mut zeros = 0;
            while i < image.len() && zeros < min_gap.max(1) {
                if image[i] == 0 {
                    zeros += 1;
                } else {
                    zeros = 0;
                    end = i + 1;
                }
                i += 1;
            }
            writes.push(FixtureWrite {
                offset: start,
                hex: hex::encode(&image[start..end]),
            });
        }
        Self {
            size: image.len(),
            writes,
        }
    }
}

/// Load a fixture and check that it is a loadable image.
pub fn validate_image_fixture(path: &Path) -> Result<RucfsSuperblock> {
    let bytes = load_sparse_fixture(path)?;
    let fs = RucfsImage::load(&bytes)
        .with_context(|| format!("fixture {} is not a valid image", path.display()))?;
    Ok(*fs.superblock())
}
