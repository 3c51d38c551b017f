/// The mcycle/minstret counter pair, each split in RV32 halves.
///
/// The cycle counter advances by one per completed cycle with carry into the high half. This
/// interpreter retires exactly one instruction per cycle, so the instret pair simply mirrors the
/// cycle pair. CSR reads observe the live values; instruction-initiated writes are ignored.
#[derive(Debug, Clone)]
pub(super) struct Counters {
    mcycle: u32,
    mcycleh: u32,
    minstret: u32,
    minstreth: u32,
}

impl Counters {
    pub fn new() -> Self {
        Self {
            mcycle: 0,
            mcycleh: 0,
            minstret: 0,
            minstreth: 0,
        }
    }

    /// Advances the counters by one cycle.
    pub fn increment_cycle(&mut self) {
        self.mcycle = self.mcycle.wrapping_add(1);
        if self.mcycle == 0 {
            self.mcycleh = self.mcycleh.wrapping_add(1);
        }
        self.minstret = self.mcycle;
        self.minstreth = self.mcycleh;
    }

    pub fn mcycle(&self) -> u32 {
        self.mcycle
    }

    pub fn mcycleh(&self) -> u32 {
        self.mcycleh
    }

    pub fn minstret(&self) -> u32 {
        self.minstret
    }

    pub fn minstreth(&self) -> u32 {
        self.minstreth
    }
}
