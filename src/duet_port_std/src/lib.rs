//! Simulation environment for running both Duet cores on a hosted
//! environment.
//!
//! A [`Platform`] owns the simulated IPC link and the two [`Core`]s attached
//! to it. Each core runs its scheduling loop on whatever host thread calls
//! [`Core::run`]; its cothreads are backed by host threads of their own that
//! take turns with the loop, so a core never runs more than one cothread at
//! a time.
//!
//! ```no_run
//! use duet_port_std::{Channel, CoreId, Platform, PlatformConfig};
//!
//! let platform = Platform::new(PlatformConfig::DEFAULT);
//! let b = platform.spawn_core(CoreId::B, {
//!     let core = platform.core(CoreId::B);
//!     move || {
//!         let fifo = core.fifo();
//!         let v = fifo.wait_value32(Channel::USER_FIRST).unwrap();
//!         fifo.send_value32(Channel::USER_FIRST, v + 1).unwrap();
//!         0
//!     }
//! });
//! let core = platform.core(CoreId::A);
//! let exit = core.clone().run(move || {
//!     let fifo = core.fifo();
//!     fifo.send_value32(Channel::USER_FIRST, 41).unwrap();
//!     fifo.wait_value32(Channel::USER_FIRST).unwrap() as i32
//! });
//! assert_eq!(exit, duet_port_std::CoreExit::Exited(42));
//! b.join().unwrap();
//! ```
//!
//! # Interrupts
//!
//! Each core has an interrupt master enable (*IME*). Interrupt lines are
//! sampled whenever the core's CPU Lock is released on one of the core's own
//! threads and on every iteration of the scheduling loop. The FIFO lines are
//! level-triggered and derived from the simulated registers; other lines can
//! be pended with [`Core::pend_interrupt`] from any thread.
#![deny(unsafe_op_in_unsafe_fn)]
use std::{fmt, sync::Arc, thread};

mod comutex;
mod fifo;
mod hw;
mod reset;
mod sched;
mod threading;


pub use duet_kernel::{
    self as kernel,
    cfg::{CoreConfig, MAX_DATA_BYTES, NUM_CHANNELS},
    error::{
        DeleteTaskError, GetExitCodeError, JoinTaskError, RecvError, ResetError, SendError,
        SpawnError, WaitError,
    },
    fifo::PoolStats,
    sched::TaskId,
    AuxIrqFlags, Channel, CoreId, IrqFlags, ResultCode,
};

pub use self::{
    comutex::{Comutex, ComutexGuard},
    fifo::{AddressHandler, DataHandler, Fifo, Value32Handler},
    sched::{current_task, yield_now, yield_until, yield_until_aux, SpawnOptions, Stack},
};

/// How a core's scheduling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreExit {
    /// The main task returned this exit code.
    Exited(i32),
    /// Core A accepted a reset request from core B. On hardware, this is
    /// where the whole device soft-resets.
    SoftReset,
    /// Core B accepted a reset request from core A and should restart at
    /// `entry`, as published by core A (`None` if it didn't publish one).
    Reboot { entry: Option<u32> },
}

/// Configuration of both cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    pub core_a: CoreConfig,
    pub core_b: CoreConfig,
}

impl PlatformConfig {
    pub const DEFAULT: Self = Self {
        core_a: CoreConfig::DEFAULT,
        core_b: CoreConfig::DEFAULT,
    };

    pub const fn core_a(self, core_a: CoreConfig) -> Self {
        Self { core_a, ..self }
    }

    pub const fn core_b(self, core_b: CoreConfig) -> Self {
        Self { core_b, ..self }
    }

    /// Apply the same configuration to both cores.
    pub const fn both(self, cfg: CoreConfig) -> Self {
        Self {
            core_a: cfg,
            core_b: cfg,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Two cores connected by a simulated IPC link.
pub struct Platform {
    cores: [Core; 2],
}

impl Platform {
    pub fn new(cfg: PlatformConfig) -> Self {
        let link = hw::Link::new();
        let a = sched::CoreShared::new(CoreId::A, cfg.core_a, Arc::clone(&link));
        let b = sched::CoreShared::new(CoreId::B, cfg.core_b, link);
        Self {
            cores: [Core { shared: a }, Core { shared: b }],
        }
    }

    /// Get a handle to one of the cores.
    pub fn core(&self, id: CoreId) -> Core {
        self.cores[id.index()].clone()
    }

    /// Run a core's scheduling loop on a new host thread.
    pub fn spawn_core(
        &self,
        id: CoreId,
        main: impl FnOnce() -> i32 + Send + 'static,
    ) -> thread::JoinHandle<CoreExit> {
        let core = self.core(id);
        thread::Builder::new()
            .name(format!("core {id:?}"))
            .spawn(move || core.run(main))
            .expect("failed to spawn a core thread")
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Platform")
            .field("a", &self.cores[0])
            .field("b", &self.cores[1])
            .finish()
    }
}

/// A handle to one core.
#[derive(Clone)]
pub struct Core {
    shared: Arc<sched::CoreShared>,
}

impl Core {
    #[inline]
    pub fn id(&self) -> CoreId {
        self.shared.id
    }

    #[inline]
    pub fn config(&self) -> &CoreConfig {
        &self.shared.cfg
    }

    /// Get the messaging interface of this core.
    pub fn fifo(&self) -> Fifo {
        Fifo::new(Arc::clone(&self.shared))
    }

    /// Get the core the calling cothread belongs to.
    pub fn current() -> Option<Self> {
        sched::current_core().map(|shared| Self { shared })
    }
}

impl fmt::Debug for Core {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Core").field(&self.shared.id).finish()
    }
}
