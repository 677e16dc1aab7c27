//! Interrupt source bit sets.
use bitflags::bitflags;

bitflags! {
    /// The interrupt sources of a core's main interrupt bank.
    ///
    /// Only the sources used by the messaging core have a built-in handler.
    /// The rest exist so that cothreads can block on them with
    /// `yield_until`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IrqFlags: u32 {
        const VBLANK = 1 << 0;
        const HBLANK = 1 << 1;
        const VCOUNT = 1 << 2;
        const TIMER0 = 1 << 3;
        const TIMER1 = 1 << 4;
        const TIMER2 = 1 << 5;
        const TIMER3 = 1 << 6;
        /// The peer wrote the sync register.
        const IPC_SYNC = 1 << 16;
        /// The hardware transmit FIFO has room (level-triggered while the
        /// send interrupt is enabled).
        const FIFO_SEND = 1 << 17;
        /// The hardware receive FIFO is not empty (level-triggered while the
        /// receive interrupt is enabled).
        const FIFO_RECV = 1 << 18;
    }
}

bitflags! {
    /// The second interrupt bank, which only exists on core B.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AuxIrqFlags: u32 {
        const HEADPHONE = 1 << 5;
        const I2C = 1 << 6;
        const DEBUG_RECV = 1 << 8;
        const DEBUG_SEND = 1 << 9;
        const WIFI = 1 << 24;
    }
}

/// What a cothread is waiting for. A cothread is runnable only when both
/// masks are empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IrqWait {
    pub main: IrqFlags,
    pub aux: AuxIrqFlags,
}

impl IrqWait {
    pub const NONE: Self = Self {
        main: IrqFlags::empty(),
        aux: AuxIrqFlags::empty(),
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.aux.is_empty()
    }

    /// Cross off the sources that have fired.
    #[inline]
    pub fn consume(&mut self, fired: IrqWait) {
        self.main.remove(fired.main);
        self.aux.remove(fired.aux);
    }
}
