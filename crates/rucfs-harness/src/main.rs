#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use rucfs_harness::{SparseFixture, validate_image_fixture};
use std::env;
use std::fs;
use std::path::Path;

const FIXTURES: &[&str] = &[
    "conformance/fixtures/hello_image.json",
    "conformance/fixtures/nested_image_be.json",
];

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let cmd = args.first().map(String::as_str);

    match cmd {
        Some("check-fixtures") => {
            for fixture in FIXTURES {
                let sb = validate_image_fixture(Path::new(fixture))?;
                println!(
                    "{fixture}: v{}.{} {} inode_table={:#x} data_table={:#x} string_table={:#x}",
                    sb.version_major,
                    sb.version_minor,
                    sb.byte_order,
                    sb.inode_table,
                    sb.data_table,
                    sb.string_table
                );
            }
            Ok(())
        }
        Some("generate-fixture") => generate_fixture(&args[1..]),
        Some("--help" | "-h" | "help") | None => {
            print_usage();
            Ok(())
        }
        Some(other) => {
            print_usage();
            bail!("unknown command: {other}")
        }
    }
}

fn generate_fixture(args: &[String]) -> Result<()> {
    let Some(image_path) = args.first() else {
        bail!("usage: rucfs-harness generate-fixture <image> [--gap <bytes>]");
    };

    let mut gap = 8_usize;
    let mut index = 1_usize;
    while index < args.len() {
        match args[index].as_str() {
            "--gap" => {
                let raw = args.get(index + 1).context("--gap requires a value")?;
                gap = raw.parse().context("invalid --gap value")?;
                index += 2;
            }
            other => bail!("unknown generate-fixture option: {other}"),
        }
    }

    let image_path = Path::new(image_path);
    let image =
        fs::read(image_path).with_context(|| format!("failed to read {}", image_path.display()))?;
    rucfs_core::load(&image)
        .with_context(|| format!("{} is not a valid image", image_path.display()))?;

    let fixture = SparseFixture::from_image(&image, gap);
    println!("{}", serde_json::to_string_pretty(&fixture)?);
    Ok(())
}

fn print_usage() {
    println!("rucfs-harness <command>");
    println!();
    println!("Commands:");
    println!("  check-fixtures                              Validate checked-in image fixtures");
    println!("  generate-fixture <image> [--gap <bytes>]    Emit an image as sparse fixture JSON");
}
