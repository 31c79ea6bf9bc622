#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use rucfs::{ByteOrder, InodeOffset, InodeType, LoadOptions, RucfsImage, path::normalize};
use rucfs_harness::ImageBuilder;
use serde::Serialize;
use std::collections::VecDeque;
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Serialize)]
struct InspectOutput {
    version: String,
    byte_order: ByteOrder,
    modded_time: u32,
    flags: u32,
    inode_table: u32,
    data_table: u32,
    string_table: u32,
    image_len: usize,
    tree: TreeStats,
}

#[derive(Debug, Default, Serialize)]
struct TreeStats {
    directories: u64,
    files: u64,
    symlinks: u64,
    data_bytes: u64,
}

#[derive(Debug, Serialize)]
struct LsEntry {
    name: String,
    kind: InodeType,
    offset: u32,
}

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };
    let rest: Vec<String> = args.collect();
    let flags = Flags::parse(&rest);
    let positional = positional_args(&rest);

    match command.as_str() {
        "inspect" => {
            let Some(image) = positional.first() else {
                bail!("inspect requires an image path");
            };
            inspect(Path::new(image), &flags)
        }
        "ls" => {
            let Some(image) = positional.first() else {
                bail!("ls requires an image path");
            };
            let path = positional.get(1).copied().unwrap_or("/");
            ls(Path::new(image), path, &flags)
        }
        "cat" => {
            let (Some(image), Some(path)) = (positional.first(), positional.get(1)) else {
                bail!("cat requires <image-path> <path>");
            };
            cat(Path::new(image), path, &flags)
        }
        "stat" => {
            let (Some(image), Some(path)) = (positional.first(), positional.get(1)) else {
                bail!("stat requires <image-path> <path>");
            };
            stat(Path::new(image), path, &flags)
        }
        "mkfs" => {
            let (Some(source), Some(output)) = (positional.first(), positional.get(1)) else {
                bail!("mkfs requires <directory> <output>");
            };
            mkfs(Path::new(source), Path::new(output), &rest)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

#[derive(Debug, Default)]
struct Flags {
    json: bool,
    no_validate: bool,
}

impl Flags {
    fn parse(args: &[String]) -> Self {
        Self {
            json: args.iter().any(|a| a == "--json"),
            no_validate: args.iter().any(|a| a == "--no-validate"),
        }
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            skip_validation: self.no_validate,
        }
    }
}

/// Arguments that are neither flags nor the value of `--time`.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--time" {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn print_usage() {
    println!("rucfs-cli\n");
    println!("USAGE:");
    println!("  rucfs-cli inspect <image-path> [--json] [--no-validate]");
    println!("  rucfs-cli ls <image-path> [path] [--json] [--no-validate]");
    println!("  rucfs-cli cat <image-path> <path>");
    println!("  rucfs-cli stat <image-path> <path> [--json]");
    println!("  rucfs-cli mkfs <directory> <output> [--big-endian] [--time <secs>]");
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn open_image<'a>(bytes: &'a [u8], path: &Path, flags: &Flags) -> Result<RucfsImage<'a>> {
    RucfsImage::load_with_options(bytes, &flags.load_options())
        .with_context(|| format!("failed to load rucfs image {}", path.display()))
}

fn inspect(path: &Path, flags: &Flags) -> Result<()> {
    let bytes = read_image(path)?;
    let fs = open_image(&bytes, path, flags)?;
    let sb = fs.superblock();
    let output = InspectOutput {
        version: format!("{}.{}", sb.version_major, sb.version_minor),
        byte_order: sb.byte_order,
        modded_time: sb.modded_time,
        flags: sb.flags,
        inode_table: sb.inode_table,
        data_table: sb.data_table,
        string_table: sb.string_table,
        image_len: bytes.len(),
        tree: tree_stats(&fs)?,
    };

    if flags.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
    } else {
        println!("rucfs image {}", path.display());
        println!("version: {}", output.version);
        println!("byte_order: {}", output.byte_order);
        println!("modded_time: {}", output.modded_time);
        println!("flags: {:#010x}", output.flags);
        println!("inode_table: {:#x}", output.inode_table);
        println!("data_table: {:#x}", output.data_table);
        println!("string_table: {:#x}", output.string_table);
        println!("image_len: {}", output.image_len);
        println!(
            "tree: {} directories, {} files, {} symlinks, {} data bytes",
            output.tree.directories,
            output.tree.files,
            output.tree.symlinks,
            output.tree.data_bytes
        );
    }
    Ok(())
}

/// Walk the whole tree breadth-first by record offset, without following
/// symlinks. Names are never turned back into paths.
fn tree_stats(fs: &RucfsImage<'_>) -> Result<TreeStats> {
    let mut stats = TreeStats::default();
    if fs.root().kind() != InodeType::Directory {
        return Ok(stats);
    }
    // A well-formed image visits each record once; cap the walk for damaged ones.
    let budget = fs.bytes().len() / 9 + 1;
    let mut queue = VecDeque::from([fs.inode_at(InodeOffset::ROOT)?]);
    let mut visited = 0_usize;
    while let Some(dir) = queue.pop_front() {
        stats.directories += 1;
        for entry in fs.dir_entries(&dir)? {
            let entry = entry?;
            visited += 1;
            if visited > budget {
                bail!("directory tree does not terminate; the image is damaged");
            }
            match entry.kind {
                InodeType::Directory => queue.push_back(fs.inode_at(entry.offset)?),
                InodeType::File => {
                    stats.files += 1;
                    stats.data_bytes += fs.inode_at(entry.offset)?.attr().size;
                }
                InodeType::Symlink => stats.symlinks += 1,
            }
        }
    }
    Ok(stats)
}

fn ls(image: &Path, path: &str, flags: &Flags) -> Result<()> {
    let bytes = read_image(image)?;
    let fs = open_image(&bytes, image, flags)?;
    let path = normalize(path, false);
    let entries = fs
        .list_children(&path, usize::MAX)
        .with_context(|| format!("cannot list {path}"))?;

    if flags.json {
        let out: Vec<LsEntry> = entries
            .iter()
            .map(|e| LsEntry {
                name: e.name_str().into_owned(),
                kind: e.kind,
                offset: e.offset.0,
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("serialize output")?
        );
    } else {
        for entry in &entries {
            let marker = match entry.kind {
                InodeType::Directory => "/",
                InodeType::Symlink => "@",
                InodeType::File => "",
            };
            println!("{}{marker}", entry.name_str());
        }
    }
    Ok(())
}

fn cat(image: &Path, path: &str, flags: &Flags) -> Result<()> {
    let bytes = read_image(image)?;
    let fs = open_image(&bytes, image, flags)?;
    let handle = fs
        .open(&normalize(path, false))
        .with_context(|| format!("cannot open {path}"))?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(handle.data()).context("write to stdout")?;
    stdout.flush().context("flush stdout")?;
    Ok(())
}

fn stat(image: &Path, path: &str, flags: &Flags) -> Result<()> {
    let bytes = read_image(image)?;
    let fs = open_image(&bytes, image, flags)?;
    let attr = fs
        .stat(&normalize(path, false))
        .with_context(|| format!("cannot stat {path}"))?;

    if flags.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&attr).context("serialize output")?
        );
    } else {
        println!("name: {}", attr.name);
        println!("kind: {}", attr.kind);
        println!("offset: {:#x}", attr.offset);
        println!("size: {}", attr.size);
        if let Some(children) = attr.children {
            println!("children: {children}");
        }
    }
    Ok(())
}

fn mkfs(source: &Path, output: &Path, args: &[String]) -> Result<()> {
    let big_endian = args.iter().any(|a| a == "--big-endian");
    let time = match args.iter().position(|a| a == "--time") {
        Some(at) => args
            .get(at + 1)
            .context("--time requires a value")?
            .parse()
            .context("invalid --time value")?,
        None => now_secs(),
    };
    let order = if big_endian {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };

    let image = ImageBuilder::from_host_dir(source)?
        .byte_order(order)
        .modded_time(time)
        .build()
        .with_context(|| format!("failed to build image from {}", source.display()))?;
    fs::write(output, &image)
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(
        source = %source.display(),
        output = %output.display(),
        bytes = image.len(),
        byte_order = %order,
        "mkfs_complete"
    );
    println!("wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_position_independent() {
        let args: Vec<String> = ["img", "--json", "/x", "--no-validate"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let flags = Flags::parse(&args);
        assert!(flags.json);
        assert!(flags.no_validate);
        assert!(flags.load_options().skip_validation);
        assert!(!Flags::parse(&[]).json);
    }

    #[test]
    fn time_value_is_not_positional() {
        let args: Vec<String> = ["--time", "42", "src", "out.img", "--big-endian"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(positional_args(&args), ["src", "out.img"]);
    }

    #[test]
    fn tree_stats_counts_every_kind() {
        let mut b = ImageBuilder::new();
        b.file("/a/one", "1")
            .and_then(|b| b.file("/a/b/two", "22"))
            .and_then(|b| b.symlink("/l", "/a/one"))
            .and_then(|b| b.dir("/empty"))
            .expect("add");
        let image = b.build().expect("build");
        let fs = rucfs::load(&image).expect("load");
        let stats = tree_stats(&fs).expect("stats");
        assert_eq!(stats.directories, 4);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.symlinks, 1);
        assert_eq!(stats.data_bytes, 3);
    }

    #[test]
    fn tree_stats_walks_non_utf8_names() {
        let mut b = ImageBuilder::new();
        b.file("/zz/inner", "abc")
            .and_then(|b| b.file("/plain", "d"))
            .expect("add");
        let mut image = b.build().expect("build");
        let at = image
            .windows(3)
            .position(|w| w == b"zz\0")
            .expect("name in string table");
        image[at] = 0xFF;

        let fs = rucfs::load(&image).expect("load");
        let stats = tree_stats(&fs).expect("stats");
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.data_bytes, 4);
    }

    #[test]
    fn mkfs_writes_loadable_image() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("banana")).expect("mkdir");
        fs::write(src.join("banana/peel.txt"), b"yellow").expect("write");
        let out = tmp.path().join("root.rucfs");

        let args = vec!["--big-endian".to_owned(), "--time".to_owned(), "42".to_owned()];
        mkfs(&src, &out, &args).expect("mkfs");

        let bytes = fs::read(&out).expect("read");
        let image = rucfs::load(&bytes).expect("load");
        assert_eq!(image.byte_order(), ByteOrder::Big);
        assert_eq!(image.superblock().modded_time, 42);
        assert_eq!(image.open("/banana/peel.txt").expect("open").data(), b"yellow");
    }
}
