use clap::Parser;
use goblin::elf::program_header::PT_LOAD;
use log::{debug, error, info};
use serde::Deserialize;
use silt_core::hart::Config;
use silt_core::registers::Specifier;
use silt_core::{Hart, SystemBus};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const PAGE_OFFSET: u32 = 0x8000_0000;

/// The riscv-tests pass/fail sentinel word. The test writes 1 on success and `(n << 1) | 1` when
/// test case `n` fails.
const SENTINEL_ADDR: u32 = 0x8000_1000;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// rv32ui-p-* ELF binary, run until it reports through the sentinel word.
    #[arg(required_unless_present = "vectors", conflicts_with = "vectors")]
    elf: Option<PathBuf>,
    /// JSON file with single-instruction test vectors.
    #[arg(short, long)]
    vectors: Option<PathBuf>,
    /// Cycle budget before declaring the test hung.
    #[arg(long, default_value_t = 50_000_000)]
    max_cycles: u64,
    /// RAM size in bytes for the test machine.
    #[arg(short, long, default_value_t = 16 * 1024 * 1024)]
    memory_size: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    match (&args.vectors, &args.elf) {
        (Some(vectors), _) => run_vectors(vectors, args.memory_size),
        (None, Some(elf)) => run_elf(elf, &args),
        (None, None) => unreachable!("clap enforces one of elf/vectors"),
    }
}

fn run_elf(path: &Path, args: &Args) -> ExitCode {
    let image = match fs::read(path) {
        Ok(image) => image,
        Err(err) => {
            error!("cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let elf = match goblin::elf::Elf::parse(&image) {
        Ok(elf) => elf,
        Err(err) => {
            error!("failed to parse ELF file: {err}");
            return ExitCode::FAILURE;
        }
    };

    let Some(mut bus) = SystemBus::new(args.memory_size, PAGE_OFFSET) else {
        error!("invalid memory size: {}", args.memory_size);
        return ExitCode::FAILURE;
    };

    for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
        debug!(
            "loading segment: file range [{:#010x}..{:#010x}] to [{:#010x}..{:#010x}]",
            header.p_offset,
            header.p_offset + header.p_filesz,
            header.p_paddr,
            header.p_paddr + header.p_memsz,
        );
        if let Err(err) = bus.load(header.p_paddr as u32, &image[header.file_range()]) {
            error!("segment does not fit in guest RAM: {err}");
            return ExitCode::FAILURE;
        }
    }

    let mut hart = Hart::new(
        bus,
        Config {
            hart_id: 0,
            reset_vector: PAGE_OFFSET,
        },
    );

    for cycle in 0..args.max_cycles {
        if let Err(fatal) = hart.step() {
            error!("machine stopped after {cycle} cycles: {fatal}");
            return ExitCode::from(fatal.exit_code());
        }
        let mut word = [0u8; 4];
        if hart.bus().inspect(&mut word, SENTINEL_ADDR).is_err() {
            error!("sentinel word at {SENTINEL_ADDR:#010x} is outside guest RAM");
            return ExitCode::FAILURE;
        }
        match u32::from_le_bytes(word) {
            0 => {}
            1 => {
                info!("PASS ({cycle} cycles)");
                return ExitCode::SUCCESS;
            }
            value => {
                error!("FAIL: test {} (sentinel {value:#x})", value >> 1);
                return ExitCode::FAILURE;
            }
        }
    }
    error!("test hung: no sentinel update within {} cycles", args.max_cycles);
    ExitCode::FAILURE
}

/// A single-instruction test vector: apply `in`, execute `code`, compare against `out`.
///
/// Register indices and memory addresses arrive as JSON object keys, so they are strings; both
/// decimal and `0x`-prefixed hex are accepted.
#[derive(Debug, Deserialize)]
struct Vector {
    name: String,
    /// The 32-bit instruction word under test.
    code: u32,
    #[serde(rename = "in", default)]
    input: VectorState,
    #[serde(default)]
    out: VectorState,
}

#[derive(Debug, Default, Deserialize)]
struct VectorState {
    pc: Option<u32>,
    /// x registers by index.
    #[serde(default)]
    x: BTreeMap<String, u32>,
    /// Individual memory bytes by guest physical address.
    #[serde(default)]
    mem: BTreeMap<String, u8>,
}

fn run_vectors(path: &Path, memory_size: usize) -> ExitCode {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            error!("cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let vectors: Vec<Vector> = match serde_json::from_str(&text) {
        Ok(vectors) => vectors,
        Err(err) => {
            error!("failed to parse test vectors: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut failures = 0usize;
    for vector in &vectors {
        match run_vector(vector, memory_size) {
            Ok(()) => debug!("vector {}: ok", vector.name),
            Err(message) => {
                failures += 1;
                error!("vector {}: {message}", vector.name);
            }
        }
    }

    if failures == 0 {
        info!("all {} vectors passed", vectors.len());
        ExitCode::SUCCESS
    } else {
        error!("{failures} of {} vectors failed", vectors.len());
        ExitCode::FAILURE
    }
}

fn run_vector(vector: &Vector, memory_size: usize) -> Result<(), String> {
    let bus = SystemBus::new(memory_size, PAGE_OFFSET)
        .ok_or_else(|| "invalid memory size".to_string())?;
    let mut hart = Hart::new(
        bus,
        Config {
            hart_id: 0,
            reset_vector: PAGE_OFFSET,
        },
    );

    // Apply the pre-state.
    if let Some(pc) = vector.input.pc {
        *hart.registers_mut().pc_mut() = pc;
    }
    for (index, value) in &vector.input.x {
        let specifier = parse_register(index)?;
        hart.registers_mut().set_x(specifier, *value);
    }
    for (address, value) in &vector.input.mem {
        let address = parse_u32(address)?;
        hart.bus_mut()
            .write8(address, *value)
            .map_err(|err| format!("pre-state memory write failed: {err}"))?;
    }

    hart.execute_raw_instruction(vector.code)
        .map_err(|err| format!("execution failed: {err}"))?;

    // Compare the post-state.
    if let Some(pc) = vector.out.pc {
        let actual = hart.registers().pc();
        if actual != pc {
            return Err(format!("pc is {actual:#010x}, expected {pc:#010x}"));
        }
    }
    for (index, value) in &vector.out.x {
        let specifier = parse_register(index)?;
        let actual = hart.registers().x(specifier);
        if actual != *value {
            return Err(format!(
                "{specifier} is {actual:#010x}, expected {value:#010x}"
            ));
        }
    }
    for (address, value) in &vector.out.mem {
        let address = parse_u32(address)?;
        let actual = hart
            .bus()
            .read8(address)
            .map_err(|err| format!("post-state memory read failed: {err}"))?;
        if actual != *value {
            return Err(format!(
                "byte at {address:#010x} is {actual:#04x}, expected {value:#04x}"
            ));
        }
    }
    Ok(())
}

fn parse_register(text: &str) -> Result<Specifier, String> {
    let index = parse_u32(text)?;
    Specifier::new(index).ok_or_else(|| format!("invalid register index {text:?}"))
}

fn parse_u32(text: &str) -> Result<u32, String> {
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| format!("invalid number {text:?}"))
}
