//! `program` command
//!
//! Plays the debugger host: every step goes through the [`FlashHost`]
//! entry points, exactly as a host framework would call the loader.

use std::fs;
use std::path::PathBuf;

use crc::{Crc, CRC_16_XMODEM};
use indicatif::{ProgressBar, ProgressStyle};
use sfdprog_core::config::LoaderConfig;
use sfdprog_core::flash::{FlashLoader, SfdpFlashLoader};
use sfdprog_core::host::{FlashHost, InitFlags, ERASE_CHIP_OPTION};
use sfdprog_dummy::{config_from_sfdp_dump, DummyConfig, DummyFlash, SfdpImage};

use super::{format_size, read_file};
use crate::error::{jedec_bytes, CliError};

/// Checksum used to compare the flash with the image
const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Read-back size during verification
const VERIFY_CHUNK: usize = 4096;

/// Emulated chip size when no SFDP dump is given
const DEFAULT_CAPACITY: u64 = 16 * 1024 * 1024;

/// Options of the `program` command
pub struct ProgramArgs {
    pub image: PathBuf,
    pub sfdp: Option<PathBuf>,
    pub jedec_id: u32,
    pub address: Option<u32>,
    pub erase_chip: bool,
    pub verify: bool,
    pub output: Option<PathBuf>,
}

/// Create a standard progress bar style
fn create_progress_bar_style() -> Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_bar()
        .template("{spinner:.green} {msg:8} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
        .progress_chars("#>-"))
}

pub fn run(config: &LoaderConfig, args: &ProgramArgs) -> Result<(), Box<dyn std::error::Error>> {
    let jedec = jedec_bytes(args.jedec_id)?;
    let image = read_file(&args.image)?;

    let address = args.address.unwrap_or(config.base_address);
    let offset = address
        .checked_sub(config.base_address)
        .ok_or(CliError::BelowBase {
            address,
            base: config.base_address,
        })?;

    let chip = match &args.sfdp {
        Some(path) => {
            let dump = read_file(path)?;
            config_from_sfdp_dump(jedec, dump).map_err(CliError::from)?.1
        }
        None => {
            let needed = (offset as u64 + image.len() as u64).next_power_of_two();
            let capacity = needed.max(DEFAULT_CAPACITY);
            DummyConfig::from_image(jedec, &SfdpImage::new(capacity))
        }
    };
    println!("Emulated flash: {}", format_size(chip.size as u64));

    let mut host = FlashHost::new(SfdpFlashLoader::new(DummyFlash::new(chip), *config));

    let pb = ProgressBar::new(image.len() as u64);
    pb.set_style(create_progress_bar_style()?);
    let plan = Plan {
        base: config.base_address,
        address,
        erase_chip: args.erase_chip,
        verify: args.verify,
    };
    program(&mut host, &plan, &image, &pb)?;
    pb.finish_and_clear();

    println!(
        "Programmed {} bytes at 0x{:08X}{}",
        image.len(),
        address,
        if args.verify { ", verified" } else { "" }
    );

    if let Some(output) = &args.output {
        let flash = host.into_loader().into_bus();
        fs::write(output, flash.data())?;
        println!("Wrote {} bytes to {:?}", flash.data().len(), output);
    }
    Ok(())
}

/// Where and how to program an image
#[derive(Debug, Clone, Copy)]
pub struct Plan {
    /// Host address of flash offset 0
    pub base: u32,
    /// Host address of the first image byte
    pub address: u32,
    /// Erase the whole chip during init
    pub erase_chip: bool,
    /// Read back and compare after writing
    pub verify: bool,
}

/// Init, erase, write, verify and sign off `image`
///
/// Signoff runs even if a step in between failed.
pub fn program<L: FlashLoader>(
    host: &mut FlashHost<L>,
    plan: &Plan,
    image: &[u8],
    pb: &ProgressBar,
) -> Result<(), CliError> {
    let args: &[&str] = if plan.erase_chip {
        &[ERASE_CHIP_OPTION]
    } else {
        &[]
    };
    if !host
        .flash_init(plan.base, image.len() as u32, 0, InitFlags::empty(), args)
        .is_ok()
    {
        return Err(CliError::Host("FlashInit"));
    }

    let result = program_steps(host, plan, image, pb);

    if !host.flash_signoff().is_ok() {
        return result.and(Err(CliError::Host("FlashSignoff")));
    }
    result
}

fn program_steps<L: FlashLoader>(
    host: &mut FlashHost<L>,
    plan: &Plan,
    image: &[u8],
    pb: &ProgressBar,
) -> Result<(), CliError> {
    let address = plan.address;
    let (sector, capacity) = match host.loader().descriptor() {
        Some(desc) => (
            desc.smallest_eraser().map(|e| e.size).unwrap_or(4096),
            desc.capacity,
        ),
        None => (4096, 0),
    };

    let offset = address
        .checked_sub(plan.base)
        .ok_or(CliError::BelowBase {
            address,
            base: plan.base,
        })?;
    if capacity != 0 && offset as u64 + image.len() as u64 > capacity as u64 {
        return Err(CliError::ImageTooLarge {
            len: image.len(),
            capacity,
            offset,
        });
    }
    if image.is_empty() {
        return Ok(());
    }

    let end = address as u64 + image.len() as u64;
    let first_block = address - address % sector;

    if !plan.erase_chip {
        pb.set_message("Erasing");
        let mut block = first_block as u64;
        while block < end {
            if !host.flash_erase(block as u32, sector).is_ok() {
                return Err(CliError::Host("FlashErase"));
            }
            block += sector as u64;
        }
    }

    pb.set_message("Writing");
    pb.set_position(0);
    let mut pos = 0usize;
    while pos < image.len() {
        let at = address + pos as u32;
        let block_start = at - at % sector;
        let offset_into_block = at - block_start;
        let len = ((sector - offset_into_block) as usize).min(image.len() - pos);
        if !host
            .flash_write(block_start, offset_into_block, &image[pos..pos + len])
            .is_ok()
        {
            return Err(CliError::Host("FlashWrite"));
        }
        pos += len;
        pb.inc(len as u64);
    }

    if plan.verify {
        pb.set_message("Verifying");
        pb.set_position(0);
        verify_image(host, address, image, pb)?;
    }
    Ok(())
}

fn verify_image<L: FlashLoader>(
    host: &mut FlashHost<L>,
    address: u32,
    image: &[u8],
    pb: &ProgressBar,
) -> Result<(), CliError> {
    let mut buf = vec![0u8; VERIFY_CHUNK];
    for (i, expected) in image.chunks(VERIFY_CHUNK).enumerate() {
        let at = address + (i * VERIFY_CHUNK) as u32;
        let got = &mut buf[..expected.len()];
        if let Err(e) = host.loader_mut().read(at, got) {
            log::error!("Read-back at 0x{:08X} failed: {}", at, e);
            return Err(CliError::Host("FlashRead"));
        }
        if let Some(n) = got.iter().zip(expected).position(|(a, b)| a != b) {
            return Err(CliError::VerifyFailed {
                address: at + n as u32,
            });
        }
        pb.inc(expected.len() as u64);
    }

    let expected = CHECKSUM.checksum(image);
    match host.flash_checksum(address, image.len() as u32) {
        Some(crc) if crc == expected => {
            log::info!("Checksum 0x{:04X} matches", crc);
            Ok(())
        }
        Some(crc) => {
            log::error!("Checksum 0x{:04X}, expected 0x{:04X}", crc, expected);
            Err(CliError::VerifyFailed { address })
        }
        None => Err(CliError::Host("FlashChecksum")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sfdprog_dummy::RamLoader;

    const BASE: u32 = 0x6000_0000;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 13 + 1) as u8).collect()
    }

    fn plan(address: u32) -> Plan {
        Plan {
            base: BASE,
            address,
            erase_chip: false,
            verify: true,
        }
    }

    #[test]
    fn test_program_emulated_chip() {
        let mut flash = DummyFlash::new_default();
        flash.data_mut()[..0x4000].fill(0x00);
        let loader = SfdpFlashLoader::new(flash, LoaderConfig::default());
        let mut host = FlashHost::new(loader);

        let image = pattern(0x1234);
        program(&mut host, &plan(BASE + 0x0F80), &image, &ProgressBar::hidden()).unwrap();

        let flash = host.into_loader().into_bus();
        assert_eq!(&flash.data()[0x0F80..0x0F80 + image.len()], image.as_slice());
        // Erased granules around the image, untouched beyond them
        assert!(flash.data()[..0x0F80].iter().all(|&b| b == 0xFF));
        assert!(flash.data()[0x21B4..0x3000].iter().all(|&b| b == 0xFF));
        assert!(flash.data()[0x3000..0x4000].iter().all(|&b| b == 0x00));
        assert_eq!(flash.open_close_count(), (1, 1));
        assert!(!flash.in_4byte_mode());
    }

    #[test]
    fn test_program_with_chip_erase() {
        let mut host = FlashHost::new(SfdpFlashLoader::new(
            DummyFlash::new_default(),
            LoaderConfig::default(),
        ));
        let plan = Plan {
            erase_chip: true,
            ..plan(BASE)
        };
        program(&mut host, &plan, &pattern(600), &ProgressBar::hidden()).unwrap();

        let flash = host.into_loader().into_bus();
        let ops = flash.ops();
        assert!(ops.contains(&sfdprog_core::spi::opcodes::CE_C7));
        assert!(!ops.contains(&0x20));
    }

    #[test]
    fn test_program_ram_loader() {
        let mut host = FlashHost::new(RamLoader::new(BASE, 0x8000, 0x1000));
        let image = pattern(5000);
        program(&mut host, &plan(BASE + 0x10), &image, &ProgressBar::hidden()).unwrap();
        assert_eq!(&host.loader().data()[0x10..0x10 + 5000], image.as_slice());
    }

    #[test]
    fn test_image_too_large() {
        let mut host = FlashHost::new(RamLoader::new(BASE, 0x2000, 0x1000));
        let err = program(&mut host, &plan(BASE + 0x1000), &pattern(0x1001), &ProgressBar::hidden())
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::ImageTooLarge {
                len: 0x1001,
                capacity: 0x2000,
                offset: 0x1000
            }
        ));
    }

    #[test]
    fn test_below_base() {
        let mut host = FlashHost::new(RamLoader::new(BASE, 0x2000, 0x1000));
        let err = program(&mut host, &plan(0x1000), &[1], &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, CliError::BelowBase { address: 0x1000, .. }));
    }

    #[test]
    fn test_init_failure_reported() {
        let mut config = DummyConfig::default();
        config.jedec = [0x00; 3];
        let mut host = FlashHost::new(SfdpFlashLoader::new(
            DummyFlash::new(config),
            LoaderConfig::default(),
        ));
        let err = program(&mut host, &plan(BASE), &[1], &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, CliError::Host("FlashInit")));
    }
}
