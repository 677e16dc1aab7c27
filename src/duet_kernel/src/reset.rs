//! Synchronized reset of both cores.
//!
//! A reset is requested by sending a special command to the peer. The
//! receiving core stops normal processing and both cores meet on the sync
//! register pair in a three-step handshake:
//!
//! ```text
//!            own register    proceed when the peer's register is
//!  Announce       1                     1 or 2
//!  Confirm        2                     2 or 0
//!  Release        0                     -
//! ```
//!
//! Accepting the next value as well as the current one lets a core that's a
//! step ahead move on without deadlocking its peer.
use crate::{hw::SyncReg, CoreId};

/// The special command sent by core A to make core B reboot.
pub const A_REQUESTS_B_RESET: u32 = 0x4000c;

/// The special command sent by core B to make core A soft-reset.
pub const B_REQUESTS_A_RESET: u32 = 0x4000b;

/// Get the special command that `requester` sends to reset its peer.
pub const fn request_code(requester: CoreId) -> u32 {
    match requester {
        CoreId::A => A_REQUESTS_B_RESET,
        CoreId::B => B_REQUESTS_A_RESET,
    }
}

/// What a core does after completing a handshake it didn't initiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// Core A: issue a full device soft reset.
    SoftReset,
    /// Core B: jump to the entry point core A published.
    Reboot,
}

/// Decide whether `code`, received by `core`, is a reset request addressed
/// to it.
///
/// A core's own request code coming back (which only a misbehaving peer
/// would send) isn't a request for this core and yields `None`.
pub const fn classify(core: CoreId, code: u32) -> Option<ResetAction> {
    match (core, code) {
        (CoreId::A, B_REQUESTS_A_RESET) => Some(ResetAction::SoftReset),
        (CoreId::B, A_REQUESTS_B_RESET) => Some(ResetAction::Reboot),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    Announced,
    Confirmed,
    Done,
}

/// The handshake state machine of one core. Both cores run the same
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    stage: Stage,
}

impl Handshake {
    pub const fn new() -> Self {
        Self {
            stage: Stage::Start,
        }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Advance as far as the peer's register allows without waiting. Returns
    /// `true` when the handshake is complete.
    pub fn step<R: SyncReg + ?Sized>(&mut self, reg: &R) -> bool {
        loop {
            let next = match self.stage {
                Stage::Start => {
                    reg.write_sync(1);
                    Stage::Announced
                }
                Stage::Announced => match reg.read_peer_sync() {
                    1 | 2 => {
                        reg.write_sync(2);
                        Stage::Confirmed
                    }
                    _ => return false,
                },
                Stage::Confirmed => match reg.read_peer_sync() {
                    2 | 0 => {
                        reg.write_sync(0);
                        Stage::Done
                    }
                    _ => return false,
                },
                Stage::Done => return true,
            };
            self.stage = next;
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the whole handshake, calling `spin` while waiting for the peer.
///
/// This busy-waits on purpose. It runs with the core's normal processing
/// stopped, so there's nothing to yield to.
pub fn perform_handshake<R: SyncReg + ?Sized>(reg: &R, mut spin: impl FnMut()) {
    let mut hs = Handshake::new();
    while !hs.step(reg) {
        spin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicU8, Ordering},
            Arc,
        },
        thread,
    };

    struct Side {
        regs: Arc<[AtomicU8; 2]>,
        me: usize,
    }

    impl SyncReg for Side {
        fn write_sync(&self, value: u8) {
            self.regs[self.me].store(value, Ordering::SeqCst);
        }
        fn read_peer_sync(&self) -> u8 {
            self.regs[1 - self.me].load(Ordering::SeqCst)
        }
    }

    fn pair() -> (Side, Side) {
        let regs = Arc::new([AtomicU8::new(0), AtomicU8::new(0)]);
        (
            Side {
                regs: Arc::clone(&regs),
                me: 0,
            },
            Side { regs, me: 1 },
        )
    }

    #[test]
    fn codes_are_directional() {
        assert_eq!(classify(CoreId::A, request_code(CoreId::B)), Some(ResetAction::SoftReset));
        assert_eq!(classify(CoreId::B, request_code(CoreId::A)), Some(ResetAction::Reboot));
        assert_eq!(classify(CoreId::A, request_code(CoreId::A)), None);
        assert_eq!(classify(CoreId::B, 0x1234), None);
    }

    #[test]
    fn lockstep() {
        let (a, b) = pair();
        let (mut ha, mut hb) = (Handshake::new(), Handshake::new());
        assert!(!ha.step(&a));
        assert_eq!(a.read_peer_sync(), 1);
        // `b` sees `a` announced, announces and confirms in one go
        assert!(!hb.step(&b));
        assert_eq!(a.read_peer_sync(), 2);
        assert!(ha.step(&a));
        assert!(hb.step(&b));
        assert_eq!(a.read_peer_sync(), 0);
        assert_eq!(b.read_peer_sync(), 0);
    }

    #[test]
    fn waits_for_a_silent_peer() {
        let (a, _b) = pair();
        let mut ha = Handshake::new();
        for _ in 0..10 {
            assert!(!ha.step(&a));
        }
        assert!(!ha.is_done());
    }

    #[test]
    fn threads_meet() {
        let (a, b) = pair();
        let t = thread::spawn(move || perform_handshake(&b, thread::yield_now));
        perform_handshake(&a, thread::yield_now);
        t.join().unwrap();
        assert_eq!(a.regs[0].load(Ordering::SeqCst), 0);
        assert_eq!(a.regs[1].load(Ordering::SeqCst), 0);
    }
}
