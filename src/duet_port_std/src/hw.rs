//! Simulated IPC hardware shared by the two cores.
//!
//! The link consists of two word queues, one per direction, each
//! [`HW_FIFO_DEPTH`] words deep, a control register per core, the sync
//! register pair, and the reboot vector core A publishes before asking core B
//! to reboot. Every core also has a [`Doorbell`] standing in for the
//! wait-for-interrupt instruction: whatever could raise one of the core's
//! interrupt lines rings it.
use bitflags::bitflags;
use duet_kernel::{
    cfg::HW_FIFO_DEPTH,
    hw::{FifoRegs, SyncReg},
    CoreId, IrqFlags,
};
use spin::Mutex as SpinMutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Condvar, Mutex,
    },
};

bitflags! {
    /// The writable bits of a core's FIFO control register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FifoCnt: u32 {
        /// The "transmit FIFO has room" interrupt source.
        const SEND_IRQ = 1 << 2;
        /// The "receive FIFO not empty" interrupt source.
        const RECV_IRQ = 1 << 10;
        /// Set by writing to a full transmit FIFO or to a disabled FIFO.
        /// Stays set until the FIFO is cleared.
        const ERROR = 1 << 14;
        const ENABLE = 1 << 15;
    }
}

#[derive(Debug, Default)]
struct LinkState {
    /// `queues[i]` holds the words sent by core `i`.
    queues: [VecDeque<u32>; 2],
    cnt: [FifoCnt; 2],
}

/// The simulated hardware connecting the two cores.
#[derive(Debug, Default)]
pub(crate) struct Link {
    state: Mutex<LinkState>,
    sync: [AtomicU8; 2],
    reboot_vector: SpinMutex<Option<u32>>,
    doorbells: [Doorbell; 2],
}

impl Link {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LinkState> {
        // A panicking cothread must not take the other core down with it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    pub(crate) fn doorbell(&self, core: CoreId) -> &Doorbell {
        &self.doorbells[core.index()]
    }

    pub(crate) fn publish_reboot_vector(&self, entry: Option<u32>) {
        *self.reboot_vector.lock() = entry;
    }

    pub(crate) fn take_reboot_vector(&self) -> Option<u32> {
        self.reboot_vector.lock().take()
    }
}

/// One core's view of the [`Link`].
#[derive(Debug, Clone)]
pub(crate) struct HwPort {
    link: Arc<Link>,
    side: CoreId,
}

impl HwPort {
    pub(crate) fn new(link: Arc<Link>, side: CoreId) -> Self {
        Self { link, side }
    }

    #[inline]
    fn tx(&self) -> usize {
        self.side.index()
    }

    #[inline]
    fn rx(&self) -> usize {
        self.side.peer().index()
    }

    #[inline]
    pub(crate) fn link(&self) -> &Link {
        &self.link
    }

    #[inline]
    pub(crate) fn doorbell(&self) -> &Doorbell {
        self.link.doorbell(self.side)
    }

    fn ring_peer(&self) {
        self.link.doorbell(self.side.peer()).ring();
    }

    fn update_cnt(&self, f: impl FnOnce(&mut FifoCnt)) {
        f(&mut self.link.state().cnt[self.tx()]);
        // Enabling an interrupt source can raise its line
        self.doorbell().ring();
    }

    /// Get the FIFO interrupt lines currently asserted for this core. Both
    /// are level-triggered.
    pub(crate) fn fifo_levels(&self) -> IrqFlags {
        let state = self.link.state();
        let cnt = state.cnt[self.tx()];
        let mut levels = IrqFlags::empty();
        if cnt.contains(FifoCnt::SEND_IRQ) && state.queues[self.tx()].len() < HW_FIFO_DEPTH {
            levels |= IrqFlags::FIFO_SEND;
        }
        if cnt.contains(FifoCnt::RECV_IRQ) && !state.queues[self.rx()].is_empty() {
            levels |= IrqFlags::FIFO_RECV;
        }
        levels
    }

    /// Read this core's control register.
    pub(crate) fn cnt(&self) -> FifoCnt {
        self.link.state().cnt[self.tx()]
    }
}

impl FifoRegs for HwPort {
    fn tx_full(&self) -> bool {
        self.link.state().queues[self.tx()].len() >= HW_FIFO_DEPTH
    }

    fn write_tx(&self, word: u32) {
        {
            let mut state = self.link.state();
            let tx = self.tx();
            if !state.cnt[tx].contains(FifoCnt::ENABLE) || state.queues[tx].len() >= HW_FIFO_DEPTH
            {
                log::warn!("{:?}: FIFO write error; dropping {word:#010x}", self.side);
                state.cnt[tx].insert(FifoCnt::ERROR);
                return;
            }
            state.queues[tx].push_back(word);
        }
        self.ring_peer();
    }

    fn rx_empty(&self) -> bool {
        self.link.state().queues[self.rx()].is_empty()
    }

    fn read_rx(&self) -> Option<u32> {
        let word = self.link.state().queues[self.rx()].pop_front();
        if word.is_some() {
            // The peer's transmit FIFO now has room
            self.ring_peer();
        }
        word
    }

    fn set_send_irq(&self, enable: bool) {
        self.update_cnt(|cnt| cnt.set(FifoCnt::SEND_IRQ, enable));
    }

    fn set_recv_irq(&self, enable: bool) {
        self.update_cnt(|cnt| cnt.set(FifoCnt::RECV_IRQ, enable));
    }

    fn enable_and_clear(&self) {
        let mut state = self.link.state();
        let tx = self.tx();
        state.queues[tx].clear();
        state.cnt[tx].insert(FifoCnt::ENABLE);
        state.cnt[tx].remove(FifoCnt::ERROR);
    }
}

impl SyncReg for HwPort {
    fn write_sync(&self, value: u8) {
        self.link.sync[self.tx()].store(value & 0xf, Ordering::SeqCst);
        self.ring_peer();
    }

    fn read_peer_sync(&self) -> u8 {
        self.link.sync[self.rx()].load(Ordering::SeqCst)
    }
}

/// Wakes a core waiting for an interrupt.
#[derive(Debug, Default)]
pub(crate) struct Doorbell {
    rung: Mutex<bool>,
    cv: Condvar,
}

impl Doorbell {
    pub(crate) fn ring(&self) {
        let mut rung = self.rung.lock().unwrap_or_else(|e| e.into_inner());
        *rung = true;
        self.cv.notify_all();
    }

    /// Block until the doorbell rings or `has_work` returns `true`.
    ///
    /// `has_work` is evaluated with the doorbell's lock held, so a ring that
    /// follows a state change `has_work` didn't observe is never missed.
    pub(crate) fn wait(&self, mut has_work: impl FnMut() -> bool) {
        let mut rung = self.rung.lock().unwrap_or_else(|e| e.into_inner());
        while !*rung && !has_work() {
            rung = self.cv.wait(rung).unwrap_or_else(|e| e.into_inner());
        }
        *rung = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> (HwPort, HwPort) {
        let link = Link::new();
        let a = HwPort::new(Arc::clone(&link), CoreId::A);
        let b = HwPort::new(link, CoreId::B);
        a.enable_and_clear();
        b.enable_and_clear();
        (a, b)
    }

    #[test]
    fn words_cross_in_order() {
        let (a, b) = ports();
        a.write_tx(1);
        a.write_tx(2);
        assert!(a.rx_empty());
        assert_eq!(b.read_rx(), Some(1));
        assert_eq!(b.read_rx(), Some(2));
        assert_eq!(b.read_rx(), None);
    }

    #[quickcheck_macros::quickcheck]
    fn words_survive_interleaved_transfers(words: Vec<u32>, bursts: Vec<u8>) -> bool {
        let (a, b) = ports();
        let mut pending = words.iter().copied();
        let mut received = Vec::new();
        for burst in bursts.iter().cycle().take(words.len() * 2 + 1) {
            for _ in 0..(*burst as usize % (HW_FIFO_DEPTH + 1)) {
                if a.tx_full() {
                    break;
                }
                match pending.next() {
                    Some(w) => a.write_tx(w),
                    None => break,
                }
            }
            received.extend(std::iter::from_fn(|| b.read_rx()));
        }
        // Whatever didn't fit into the bursts
        for w in pending {
            a.write_tx(w);
            received.extend(b.read_rx());
        }
        received == words && !a.cnt().contains(FifoCnt::ERROR)
    }

    #[test]
    fn overflow_sets_error() {
        let (a, b) = ports();
        for i in 0..HW_FIFO_DEPTH as u32 {
            assert!(!a.tx_full());
            a.write_tx(i);
        }
        assert!(a.tx_full());
        assert!(!a.cnt().contains(FifoCnt::ERROR));
        a.write_tx(99);
        assert!(a.cnt().contains(FifoCnt::ERROR));
        // The extra word was dropped
        let received: Vec<u32> = std::iter::from_fn(|| b.read_rx()).collect();
        assert_eq!(received.len(), HW_FIFO_DEPTH);
        assert_eq!(received.last(), Some(&(HW_FIFO_DEPTH as u32 - 1)));

        a.enable_and_clear();
        assert!(!a.cnt().contains(FifoCnt::ERROR));
    }

    #[test]
    fn levels_follow_enables() {
        let (a, b) = ports();
        assert_eq!(a.fifo_levels(), IrqFlags::empty());
        a.set_send_irq(true);
        assert_eq!(a.fifo_levels(), IrqFlags::FIFO_SEND);

        b.set_recv_irq(true);
        assert_eq!(b.fifo_levels(), IrqFlags::empty());
        a.write_tx(5);
        assert_eq!(b.fifo_levels(), IrqFlags::FIFO_RECV);
        b.read_rx();
        assert_eq!(b.fifo_levels(), IrqFlags::empty());
    }

    #[test]
    fn sync_registers_are_crossed() {
        let (a, b) = ports();
        a.write_sync(0x13);
        assert_eq!(b.read_peer_sync(), 3);
        assert_eq!(a.read_peer_sync(), 0);
    }

    #[test]
    fn doorbell_wakes_waiter() {
        let bell = Arc::new(Doorbell::default());
        let bell2 = Arc::clone(&bell);
        let t = std::thread::spawn(move || bell2.wait(|| false));
        std::thread::sleep(std::time::Duration::from_millis(20));
        bell.ring();
        t.join().unwrap();
    }
}
