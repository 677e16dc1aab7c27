//! Build-time protocol constants and per-core configuration.

/// The number of logical channels multiplexed over the FIFO link.
pub const NUM_CHANNELS: usize = 16;

/// The largest byte block that can be sent in one data message.
pub const MAX_DATA_BYTES: usize = 128;

/// The depth of each direction of the hardware FIFO, in words.
pub const HW_FIFO_DEPTH: usize = 16;

/// The base of the shared-RAM window that address messages can point into.
pub const SHARED_RAM_BASE: u32 = 0x0200_0000;

/// The size of the shared-RAM window that address messages can point into.
pub const SHARED_RAM_SIZE: u32 = 0x0100_0000;

/// The default number of slots in a core's buffer pool.
pub const DEFAULT_POOL_SLOTS: usize = 256;

/// The default stack size of a cothread, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// The smallest stack a cothread can be given, in bytes.
pub const MIN_STACK_SIZE: usize = 256;

/// Per-core configuration.
///
/// The fields are only reachable through the setters, which check them.
///
/// ```
/// use duet_kernel::cfg::CoreConfig;
/// const CFG: CoreConfig = CoreConfig::DEFAULT.with_pool_slots(64);
/// assert_eq!(CFG.pool_slots(), 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    pool_slots: usize,
    default_stack_size: usize,
}

impl CoreConfig {
    pub const DEFAULT: Self = Self {
        pool_slots: DEFAULT_POOL_SLOTS,
        default_stack_size: DEFAULT_STACK_SIZE,
    };

    /// Set the number of buffer slots.
    ///
    /// # Panics
    ///
    /// A pool must be able to hold at least the largest single message
    /// (a data header plus its payload words), and slot indices are 16 bits
    /// wide.
    pub const fn with_pool_slots(self, pool_slots: usize) -> Self {
        assert!(
            pool_slots >= 1 + MAX_DATA_BYTES / 4,
            "the pool must be able to hold the largest message"
        );
        assert!(pool_slots < u16::MAX as usize, "too many slots");
        Self { pool_slots, ..self }
    }

    /// Set the stack size given to cothreads spawned without an explicit
    /// stack.
    pub const fn with_default_stack_size(self, default_stack_size: usize) -> Self {
        assert!(default_stack_size >= MIN_STACK_SIZE, "stack too small");
        Self {
            default_stack_size,
            ..self
        }
    }

    /// The total number of buffer slots. The pool never grows, so this bounds
    /// the number of words that can be in flight or queued on this core.
    #[inline]
    pub const fn pool_slots(&self) -> usize {
        self.pool_slots
    }

    #[inline]
    pub const fn default_stack_size(&self) -> usize {
        self.default_stack_size
    }
}

impl Default for CoreConfig {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}
