use clap::Parser;
use log::{error, info, trace};
use silt_core::hart::Config;
use silt_core::registers::Specifier;
use silt_core::{Hart, SystemBus};
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

/// ABI names of the x registers, used by the per-cycle state dump.
const REG_NAMES: [&str; 32] = [
    "z", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4", "a5",
    "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4", "t5",
    "t6",
];

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Flat executable image, loaded at the page offset.
    executable: PathBuf,
    /// RAM size in bytes.
    #[arg(short, long, default_value_t = 64 * 1024 * 1024)]
    memory_size: usize,
    /// Device tree blob, placed at the end of RAM and passed to the kernel in a1.
    #[arg(short, long)]
    dtb: Option<PathBuf>,
    /// Guest physical address where RAM begins.
    #[arg(short = 'o', long, default_value_t = 0x8000_0000)]
    page_offset: u32,
    /// Dump the hart state once per cycle.
    #[arg(short = 'e', long)]
    debug: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.debug {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let image = match fs::read(&args.executable) {
        Ok(image) => image,
        Err(err) => {
            error!("cannot read {}: {err}", args.executable.display());
            return ExitCode::FAILURE;
        }
    };

    let Some(mut bus) = SystemBus::new(args.memory_size, args.page_offset) else {
        error!(
            "invalid memory configuration: {} bytes at {:#010x}",
            args.memory_size, args.page_offset
        );
        return ExitCode::FAILURE;
    };

    if let Err(err) = bus.load(args.page_offset, &image) {
        error!("executable does not fit in RAM: {err}");
        return ExitCode::FAILURE;
    }
    info!(
        "loaded {} bytes at {:#010x}",
        image.len(),
        args.page_offset
    );

    // The DTB goes at the very end of RAM; its guest physical address is handed to the kernel in
    // a1 (a0 carries the hart id, zero).
    let mut dtb_address = 0;
    if let Some(path) = &args.dtb {
        let dtb = match fs::read(path) {
            Ok(dtb) => dtb,
            Err(err) => {
                error!("cannot read {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        };
        if dtb.len() > args.memory_size {
            error!("DTB does not fit in RAM");
            return ExitCode::FAILURE;
        }
        let offset = (args.memory_size - dtb.len()) as u32 & !3;
        dtb_address = args.page_offset + offset;
        if let Err(err) = bus.load(dtb_address, &dtb) {
            error!("DTB does not fit in RAM: {err}");
            return ExitCode::FAILURE;
        }
        info!("loaded DTB ({} bytes) at {dtb_address:#010x}", dtb.len());
    }

    let mut hart = Hart::new(
        bus,
        Config {
            hart_id: 0,
            reset_vector: args.page_offset,
        },
    );
    hart.registers_mut().set_x(Specifier::A0, 0);
    hart.registers_mut().set_x(Specifier::A1, dtb_address);

    loop {
        if args.debug {
            trace!("{}", dump_state(&hart));
        }
        if let Err(fatal) = hart.step() {
            error!("{fatal}");
            error!("{}", dump_state(&hart));
            return ExitCode::from(fatal.exit_code());
        }
        if let Some(event) = hart.bus().power_event() {
            info!("guest requested {event:?}; shutting down");
            return ExitCode::SUCCESS;
        }
    }
}

/// One-line dump of pc and all x registers, in ABI order.
fn dump_state(hart: &Hart) -> String {
    let registers = hart.registers();
    let mut line = format!("pc={:08x}", registers.pc());
    for (specifier, name) in Specifier::iter_all().zip(REG_NAMES) {
        let _ = write!(line, " {name}={:08x}", registers.x(specifier));
    }
    line
}
