//! The platform-independent core of Duet: a cooperative task list, a
//! cooperative mutex, and the FIFO messaging engine shared by the two cores of
//! an asymmetric dual-core system.
//!
//! This crate contains no context-switching code and touches no hardware
//! directly. A *port* (e.g., `duet_port_std`) supplies the mechanism for
//! suspending and resuming cothreads and implements [`hw::FifoRegs`] and
//! [`hw::SyncReg`] on top of the real (or simulated) IPC registers. Every
//! method here that mutates shared state expects to be called with the
//! owning core's interrupts disabled (*CPU Lock*), which the port enforces by
//! handing out `&mut` access only from inside its critical section.
//!
//! # Message flow
//!
//! ```text
//!  send_*  ──► codec ──► private chain ──► staging ──► FifoRegs::write_tx
//!                                                           │
//!                                                 (hardware FIFO)
//!                                                           ▼
//!  handler / poll ◄── channel queues ◄── dispatch ◄── reassembly ◄── read_rx
//! ```
#![cfg_attr(not(test), no_std)] // Link `std` only when building a test (`cfg(test)`)
#![deny(unsafe_op_in_unsafe_fn)]
extern crate alloc;

pub mod cfg;
pub mod channel;
pub mod codec;
pub mod comutex;
pub mod error;
pub mod fifo;
pub mod hw;
pub mod irq;
pub mod pool;
pub mod reset;
pub mod sched;

pub use self::{
    channel::Channel,
    error::ResultCode,
    irq::{AuxIrqFlags, IrqFlags},
};

/// Identifies one of the two processor cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreId {
    /// The application-class core.
    A,
    /// The I/O-class core.
    B,
}

impl CoreId {
    /// Get the core on the other end of the FIFO link.
    #[inline]
    pub const fn peer(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}
