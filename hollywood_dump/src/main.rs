// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{bail, Context, Result};
use clap::Parser;
use hollywood_io::bus::full_hw_access;
use hollywood_io::mirror::Mirror;
use hollywood_io::mmio::Mmio;
use hollywood_io::otp::Otp;
use hollywood_io::seeprom::Seeprom;
use hollywood_io::Region;
use hollywood_keys::collab::{detect_mode, ExecMode};
use hollywood_keys::export::{export_all, write_keys_listing};
use hollywood_keys::recover::{
    recover_firmware_keys, scan, ScanConfig, FIRMWARE_TARGETS, SD_KEY_TARGET,
};
use hollywood_keys::session::{run, BusRegions, Services};
use hollywood_keys::ancast;
use std::io::Write;
use std::path::{Path, PathBuf};

mod dirsvc;

#[derive(Debug, Parser)]
enum Command {
    /// Run a full extraction session against the hardware and export
    /// everything to a directory on removable storage
    Dump {
        /// output directory
        #[clap(short = 'o', long = "out")]
        out_dir: PathBuf,
        /// root of the mounted flash filesystem, for firmware-key recovery
        #[clap(long)]
        nand_root: Option<PathBuf>,
        /// TOML file overriding the OS-image scan window
        #[clap(long)]
        scan_config: Option<PathBuf>,
        /// skip scanning live memory for the storage key
        #[clap(long)]
        no_memory_scan: bool,
        /// force the alternate (secondary chip) execution mode
        #[clap(long)]
        vwii: bool,
    },
    /// Read a byte range from one secure region
    ReadRegion {
        region: Region,
        #[arg(value_parser = parse_int::parse::<u32>)]
        offset: u32,
        #[arg(value_parser = parse_int::parse::<u32>)]
        length: u32,
        /// Write to FILE, or stdout if omitted
        file: Option<PathBuf>,
        /// size the boot-ROM window for the alternate execution mode
        #[clap(long)]
        vwii: bool,
    },
    /// Pretty-print a raw fuse-array dump
    ParseOtp { file: PathBuf },
    /// Pretty-print a raw EEPROM dump
    ParseSeeprom { file: PathBuf },
    /// Scan a binary for the known key fingerprints
    Scan {
        file: PathBuf,
        /// unwrap an ancast container before scanning
        #[clap(long)]
        ancast: bool,
    },
    /// Offline firmware-key recovery from an extracted flash tree
    Recover {
        nand_root: PathBuf,
        /// treat boot content as alternate-mode ancast images
        #[clap(long)]
        vwii: bool,
    },
}

#[derive(Debug, Parser)]
#[clap(name = "hollywood_dump")]
struct Args {
    #[clap(short, long)]
    verbose: bool,
    #[clap(subcommand)]
    cmd: Command,
}

fn load_scan_config(path: Option<&Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading scan config {}", path.display()))?;
            Ok(toml::from_str(&text)?)
        }
        None => Ok(ScanConfig::default()),
    }
}

fn out_writer(file: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match file {
        Some(path) => Box::new(
            std::fs::OpenOptions::new()
                .write(true)
                .truncate(true)
                .create(true)
                .open(path)?,
        ) as Box<dyn Write>,
        None => Box::new(std::io::stdout()) as Box<dyn Write>,
    })
}

fn scan_targets() -> Vec<hollywood_keys::recover::KeyTarget> {
    let mut targets = vec![SD_KEY_TARGET];
    targets.extend_from_slice(&FIRMWARE_TARGETS);
    targets
}

fn cmd_dump(
    out_dir: &Path,
    nand_root: Option<&Path>,
    scan_config: Option<&Path>,
    no_memory_scan: bool,
    vwii: bool,
) -> Result<()> {
    let cfg = load_scan_config(scan_config)?;

    // SAFETY: the fence check below is the best proof available that we
    // are running privileged on the console; a refused check aborts before
    // any register is touched again.
    let mut bus = unsafe { Mmio::new() };
    if !full_hw_access(&mut bus) {
        bail!(
            "the hardware fence (AHBPROT) is closed; run from a loader \
             that grants full hardware access"
        );
    }

    let mut store = dirsvc::DirTitleStore::new(nand_root.map(Path::to_path_buf));
    let mut fs = dirsvc::DirFlashFs::new(nand_root.map(Path::to_path_buf));
    let mut net = dirsvc::NoNet;

    let mode = if vwii {
        ExecMode::Alternate
    } else if nand_root.is_some() {
        detect_mode(&mut store)
    } else {
        ExecMode::Primary
    };
    log::info!("execution mode: {mode:?}");

    // SAFETY: sound only on target; the window is plain readable RAM there.
    let os_image: Option<&[u8]> = if no_memory_scan {
        None
    } else {
        Some(unsafe {
            std::slice::from_raw_parts(cfg.base as *const u8, cfg.len as usize)
        })
    };

    let mut regions = BusRegions::new(&mut bus, mode == ExecMode::Alternate);
    let mut services = Services {
        store: &mut store,
        fs: &mut fs,
        net: &mut net,
    };

    let mut bundle = run(&mut regions, &mut services, mode, os_image, &cfg)?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let written = export_all(out_dir, &bundle);
    println!("{written} file(s) written to {}", out_dir.display());

    write_keys_listing(&mut std::io::stdout(), &bundle)?;
    bundle.clear();

    Ok(())
}

fn cmd_read_region(
    region: Region,
    offset: u32,
    length: u32,
    file: Option<&Path>,
    vwii: bool,
) -> Result<()> {
    let mut bus = unsafe { Mmio::new() };
    if !full_hw_access(&mut bus) {
        bail!("the hardware fence (AHBPROT) is closed");
    }

    let mut data = vec![0u8; length as usize];
    let n = match region {
        Region::Otp => Otp::new(&mut bus).read(offset as usize, &mut data),
        Region::Seeprom => Seeprom::new(&mut bus).read(offset as usize, &mut data),
        Region::Boot0 => Mirror::boot0(&mut bus, vwii).read(offset as usize, &mut data),
        Region::SramOtp => Mirror::sram_otp(&mut bus).read(offset as usize, &mut data),
    };
    if n != data.len() {
        bail!(
            "short read: {n}/{} bytes (region is {} bytes)",
            data.len(),
            region.total_size(vwii)
        );
    }

    let mut out = out_writer(file)?;
    out.write_all(&data)?;
    Ok(())
}

fn cmd_parse_otp(file: &Path) -> Result<()> {
    let raw = std::fs::read(file)?;
    let raw: &[u8; hollywood_areas::OTP_SIZE] = raw
        .as_slice()
        .try_into()
        .with_context(|| format!("{} is not a {}-byte fuse dump", file.display(), hollywood_areas::OTP_SIZE))?;

    let otp = hollywood_areas::OtpArea::from_bytes(raw);
    if !otp.looks_programmed() {
        log::warn!("sanity tag is zero; this dump looks unprogrammed or truncated");
    }

    let bundle = hollywood_keys::export::ExportBundle {
        mode: ExecMode::Primary,
        otp,
        otp_raw: *raw,
        seeprom: None,
        seeprom_raw: None,
        sram_otp: None,
        sram_otp_raw: None,
        boot0: None,
        device_cert: None,
        extra_keys: Vec::new(),
        mac: None,
    };
    write_keys_listing(&mut std::io::stdout(), &bundle)?;
    Ok(())
}

fn cmd_parse_seeprom(file: &Path) -> Result<()> {
    let raw = std::fs::read(file)?;
    let raw: &[u8; hollywood_areas::SEEPROM_SIZE] = raw.as_slice().try_into().with_context(|| {
        format!(
            "{} is not a {}-byte EEPROM dump",
            file.display(),
            hollywood_areas::SEEPROM_SIZE
        )
    })?;

    let eep = hollywood_areas::SeepromArea::from_bytes(raw)?;
    if !eep.looks_programmed() {
        log::warn!("NG key id is zero; this dump looks unprogrammed or truncated");
    }

    println!("MS key id    : {:#010x}", eep.ms_key_id);
    println!("CA key id    : {:#010x}", eep.ca_key_id);
    println!("NG key id    : {}", hex::encode_upper(eep.ng_key_id));
    println!("NG signature : {}", hex::encode_upper(eep.ng_sig));
    println!("Korean key   : {}", hex::encode_upper(eep.korean_key));
    for (i, counter) in eep.counters.iter().enumerate() {
        println!(
            "counter[{i}]   : boot2 v{}, tag {:#010x}, checksum {:#06x}",
            counter.boot2_version, counter.update_tag, counter.checksum
        );
    }
    Ok(())
}

fn cmd_scan(file: &Path, unwrap_ancast: bool) -> Result<()> {
    let mut data = std::fs::read(file)?;

    let hits = if unwrap_ancast {
        let body = ancast::verify_and_decrypt(&mut data)?;
        scan(&data[body], &scan_targets())?
    } else {
        scan(&data, &scan_targets())?
    };

    if hits.is_empty() {
        println!("no known keys in {}", file.display());
        return Ok(());
    }
    for hit in hits {
        println!(
            "{:<13} @ {:#010x} : {}",
            hit.label,
            hit.offset,
            hex::encode_upper(hit.value)
        );
    }
    Ok(())
}

fn cmd_recover(nand_root: &Path, vwii: bool) -> Result<()> {
    let mut store = dirsvc::DirTitleStore::new(Some(nand_root.to_path_buf()));
    let mut fs = dirsvc::DirFlashFs::new(Some(nand_root.to_path_buf()));

    let mode = if vwii {
        ExecMode::Alternate
    } else {
        detect_mode(&mut store)
    };

    let hits = recover_firmware_keys(&mut store, &mut fs, mode)?;
    if hits.is_empty() {
        println!("boot content located, but none of the known keys matched");
        return Ok(());
    }
    for hit in hits {
        println!("{:<13}: {}", hit.label, hex::encode_upper(hit.value));
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    match args.cmd {
        Command::Dump {
            out_dir,
            nand_root,
            scan_config,
            no_memory_scan,
            vwii,
        } => cmd_dump(
            &out_dir,
            nand_root.as_deref(),
            scan_config.as_deref(),
            no_memory_scan,
            vwii,
        ),
        Command::ReadRegion {
            region,
            offset,
            length,
            file,
            vwii,
        } => cmd_read_region(region, offset, length, file.as_deref(), vwii),
        Command::ParseOtp { file } => cmd_parse_otp(&file),
        Command::ParseSeeprom { file } => cmd_parse_seeprom(&file),
        Command::Scan { file, ancast } => cmd_scan(&file, ancast),
        Command::Recover { nand_root, vwii } => cmd_recover(&nand_root, vwii),
    }
}
