//! Console UART, modeled after the transmit path of a 16550.
//!
//! Only the pieces the guest actually touches during an earlycon boot are implemented: byte
//! writes to the transmit holding register go straight to the host's stdout, and the line status
//! register always reports the transmitter as idle and empty. The receive path reads as zero.

use std::io::{Stdout, Write};

/// Register offsets relative to the UART's base address.
pub const DATA_OFFSET: u32 = 0;
/// Line Status Register.
pub const LSR_OFFSET: u32 = 5;

/// Transmitter Holding Register Empty and Transmitter Empty, i.e. always ready to send.
const LSR_IDLE: u8 = 0x60;

#[derive(Debug)]
pub struct Uart {
    stdout: Stdout,
}

impl Default for Uart {
    fn default() -> Self {
        Self::new()
    }
}

impl Uart {
    pub fn new() -> Self {
        Self {
            stdout: std::io::stdout(),
        }
    }

    /// Reads the 8-bit register at `offset`.
    pub fn read8(&self, offset: u32) -> u8 {
        match offset {
            // No receive path: the data register reads as "nothing available".
            DATA_OFFSET => 0,
            LSR_OFFSET => LSR_IDLE,
            _ => 0,
        }
    }

    /// Writes the 8-bit register at `offset`.
    pub fn write8(&mut self, offset: u32, value: u8) {
        if offset == DATA_OFFSET {
            // Host I/O errors are not observable by the guest.
            let _ = self.stdout.write_all(&[value]);
            let _ = self.stdout.flush();
        }
    }
}
