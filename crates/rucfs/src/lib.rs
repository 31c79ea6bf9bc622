#![forbid(unsafe_code)]
//! rucfs public API facade.
//!
//! Re-exports the read-side engine from `rucfs-core`. The CLI and embedders
//! depend on this crate; `rucfs-harness` sits below it and links
//! `rucfs-core` directly alongside the on-disk crates.
//!
//! ```no_run
//! let bytes = std::fs::read("root.rucfs").expect("read image");
//! let fs = rucfs::load(&bytes).expect("load image");
//! for entry in fs.read_dir("/").expect("root") {
//!     let entry = entry.expect("entry");
//!     println!("{} {}", entry.kind, entry.name_str());
//! }
//! ```

pub use rucfs_core::*;
