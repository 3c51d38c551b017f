//! System controller providing guest-initiated poweroff and reboot.

use log::info;

/// Magic value a guest stores to request poweroff.
pub const POWEROFF_MAGIC: u32 = 0x5555;
/// Magic value a guest stores to request reboot.
pub const REBOOT_MAGIC: u32 = 0x7777;

/// A power-state transition requested by the guest.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PowerEvent {
    Poweroff,
    Reboot,
}

#[derive(Debug, Default)]
pub struct Syscon {
    event: Option<PowerEvent>,
}

impl Syscon {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent power event, if the guest has requested one.
    ///
    /// The event latches: it stays observable until the host tears the machine down.
    pub fn event(&self) -> Option<PowerEvent> {
        self.event
    }

    /// Handles a 32-bit store to the syscon register. Unknown values are ignored.
    pub fn write32(&mut self, value: u32) {
        let event = match value {
            POWEROFF_MAGIC => PowerEvent::Poweroff,
            REBOOT_MAGIC => PowerEvent::Reboot,
            _ => return,
        };
        info!("syscon: guest requested {event:?}");
        self.event = Some(event);
    }
}
