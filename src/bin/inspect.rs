//! ZoneKV Inspect Binary
//!
//! Prints the footer state of every zone of a device file.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use zonekv::codec::{decode_zone_meta, ZoneFooter, FOOTER_SIZE};
use zonekv::config::align_to_page;
use zonekv::{FileDevice, IoBuf, ZoneDevice, PAGE_SIZE};

/// ZoneKV Inspect
#[derive(Parser, Debug)]
#[command(name = "zonekv-inspect")]
#[command(about = "Show the zones of a ZoneKV device")]
#[command(version)]
struct Args {
    /// Device file
    device: PathBuf,

    /// Zone capacity in MB
    #[arg(long, default_value = "64")]
    zone_capacity_mb: u64,

    /// Also list every (key, lba) of finished zones
    #[arg(long)]
    keys: bool,
}

fn inspect(args: &Args) -> zonekv::Result<()> {
    let capacity = std::fs::metadata(&args.device)?.len();
    let zone_capacity = args.zone_capacity_mb << 20;
    let capacity = capacity - capacity % zone_capacity;
    let device = FileDevice::open(&args.device, capacity, zone_capacity)?;

    println!(
        "{:>6} {:>14} {:>10} {:>10} {:>12} {:>10}",
        "zone", "offset", "state", "keys", "meta_bytes", "sequence"
    );

    let mut page = IoBuf::with_capacity(FOOTER_SIZE);
    for zone in device.zones() {
        device.read(zone.footer_offset(), &mut page)?;
        if !ZoneFooter::is_present(page.as_slice()) {
            device.read(zone.offset(), &mut page)?;
            let state = if page.as_slice().iter().all(|&b| b == 0) {
                "EMPTY"
            } else {
                "UNFINISHED"
            };
            println!("{:>6} {:>14} {:>10}", zone.id(), zone.offset(), state);
            continue;
        }

        let footer = match ZoneFooter::decode(page.as_slice()) {
            Ok(footer) => footer,
            Err(e) => {
                println!("{:>6} {:>14} {:>10} {}", zone.id(), zone.offset(), "CORRUPT", e);
                continue;
            }
        };
        println!(
            "{:>6} {:>14} {:>10} {:>10} {:>12} {:>10}",
            zone.id(),
            zone.offset(),
            "FULL",
            footer.key_count,
            footer.metadata_size,
            footer.sequence
        );

        if args.keys {
            let len = align_to_page(footer.metadata_size as u64).max(PAGE_SIZE as u64);
            let mut meta = IoBuf::try_with_capacity(len as usize)?;
            device.read(footer.metadata_offset, &mut meta)?;
            meta.shrink(0, footer.metadata_size as usize)?;
            if let Err(e) = footer.verify_metadata(meta.as_slice()) {
                println!("        {}", e);
                continue;
            }
            for entry in decode_zone_meta(meta.as_slice()) {
                let (key, lba) = entry?;
                println!("        {:<40} {}", String::from_utf8_lossy(key), lba);
            }
        }
    }
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();
    if let Err(e) = inspect(&args) {
        tracing::error!("Inspect failed: {}", e);
        std::process::exit(1);
    }
}
