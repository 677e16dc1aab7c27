//! The messaging API.
use duet_kernel::{
    cfg::MAX_DATA_BYTES,
    channel::{Handlers, Route},
    codec::{self, Header, SPECIAL_MASK},
    fifo::PoolStats,
    hw::FifoRegs,
    Channel, IrqFlags,
};
use std::{fmt, sync::Arc};

use crate::{
    comutex::Comutex,
    hw::FifoCnt,
    sched::{self, CoreShared},
    RecvError, SendError, WaitError,
};

/// Called with the full address of an address message.
pub type AddressHandler = Box<dyn FnMut(&Fifo, u32) + Send>;

/// Called with the value of a scalar message.
pub type Value32Handler = Box<dyn FnMut(&Fifo, u32) + Send>;

/// Called with the length of a data message. The handler can pull the bytes
/// with [`Fifo::get_data`]; if it doesn't, the message is discarded when the
/// handler returns.
pub type DataHandler = Box<dyn FnMut(&Fifo, usize) + Send>;

pub(crate) struct PortHandlers;

impl Handlers for PortHandlers {
    type Address = AddressHandler;
    type Value32 = Value32Handler;
    type Data = DataHandler;
}

/// One core's end of the FIFO link.
///
/// Handlers run in interrupt context on the receiving core, between (never
/// during) the execution of that core's cothreads. They must not block; the
/// blocking methods of `Fifo` return [`WaitError::BadContext`] there.
#[derive(Clone)]
pub struct Fifo {
    core: Arc<CoreShared>,
}

impl fmt::Debug for Fifo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Fifo").field(&self.core.id).finish()
    }
}

impl Fifo {
    pub(crate) fn new(core: Arc<CoreShared>) -> Self {
        Self { core }
    }

    /// Yield until `flags` fire. Only cothreads of the owning core may wait.
    fn wait_for(&self, flags: IrqFlags) -> Result<(), WaitError> {
        if !self.core.is_current() {
            return Err(WaitError::BadContext);
        }
        sched::yield_until(flags)
    }

    // Sending
    // ---------------------------------------------------------------------

    /// Stage a whole message, waiting for pool space as needed.
    fn send_words(&self, words: &[u32]) -> Result<(), SendError> {
        loop {
            let mut cpu = self.core.lock_cpu();
            if self.core.is_halted() {
                // Only reachable from outside the core; its own cothreads
                // unwind when the guard is released
                drop(cpu);
                return Err(SendError::BadObjectState);
            }
            if cpu.fifo.stage(words) {
                cpu.fifo.drain_tx(&self.core.hw);
                return Ok(());
            }

            if cpu.fifo.is_staging_empty() {
                // The slots are held by received messages nobody has
                // consumed yet. Only polling can free them.
                drop(cpu);
                self.wait_for(IrqFlags::empty())?;
            } else {
                self.core.hw.set_send_irq(true);
                drop(cpu);
                self.wait_for(IrqFlags::FIFO_SEND)?;
            }
        }
    }

    /// Send a pointer into the shared-RAM window.
    pub fn send_address(&self, channel: Channel, address: u32) -> Result<(), SendError> {
        let packed = codec::pack_address(address).ok_or(SendError::BadParam)?;
        let header = Header::Address {
            channel,
            address: packed,
        };
        self.send_words(&[header.encode()])
    }

    /// Send a 32-bit scalar. Values that don't fit in a header take one more
    /// word.
    pub fn send_value32(&self, channel: Channel, value: u32) -> Result<(), SendError> {
        match codec::encode_value32(channel, value) {
            (header, None) => self.send_words(&[header]),
            (header, Some(extra)) => self.send_words(&[header, extra]),
        }
    }

    /// Send a block of up to [`MAX_DATA_BYTES`] bytes.
    pub fn send_data(&self, channel: Channel, bytes: &[u8]) -> Result<(), SendError> {
        if bytes.len() > MAX_DATA_BYTES {
            return Err(SendError::BadParam);
        }
        let mut words = Vec::with_capacity(1 + codec::data_words(bytes.len()));
        words.push(
            Header::Data {
                channel,
                len: bytes.len(),
            }
            .encode(),
        );
        words.extend(codec::data_payload(bytes));
        self.send_words(&words)
    }

    /// Send an out-of-band command.
    pub fn send_special(&self, code: u32) -> Result<(), SendError> {
        if code > SPECIAL_MASK {
            return Err(SendError::BadParam);
        }
        self.send_words(&[Header::Special { code }.encode()])
    }

    /// Wait until every staged word has been written to the hardware.
    pub fn flush(&self) -> Result<(), WaitError> {
        loop {
            let cpu = self.core.lock_cpu();
            if cpu.fifo.is_staging_empty() {
                return Ok(());
            }
            self.core.hw.set_send_irq(true);
            drop(cpu);
            self.wait_for(IrqFlags::FIFO_SEND)?;
        }
    }

    // Handler registration
    // ---------------------------------------------------------------------

    /// Register a handler for address messages on `channel`, replacing the
    /// current one. Messages already queued on the channel are delivered to
    /// it first, in order.
    pub fn set_address_handler(
        &self,
        channel: Channel,
        handler: impl FnMut(&Fifo, u32) + Send + 'static,
    ) {
        let mut cpu = self.core.lock_cpu();
        cpu.fifo.channel_mut(channel).address = Route::Registered(Box::new(handler));
        let owned = cpu.fifo.begin_dispatch();
        drop(cpu);

        loop {
            let mut cpu = self.core.lock_cpu();
            if !cpu.fifo.has_address(channel) {
                break;
            }
            // Lend first so that a handler that's already running (e.g., the
            // one registering itself) isn't re-entered
            let Some(mut handler) = cpu.fifo.channel_mut(channel).address.lend() else {
                break;
            };
            let Some(address) = cpu.fifo.take_address(channel) else {
                cpu.fifo.channel_mut(channel).address.give_back(handler);
                break;
            };
            cpu.fifo.unstall(&self.core.hw);
            drop(cpu);

            self.core.call_handler(|| handler(self, address));
            self.core
                .lock_cpu()
                .fifo
                .channel_mut(channel)
                .address
                .give_back(handler);
        }

        self.finish_registration(owned);
    }

    /// Register a handler for scalar messages on `channel`, replacing the
    /// current one. Messages already queued on the channel are delivered to
    /// it first, in order.
    pub fn set_value32_handler(
        &self,
        channel: Channel,
        handler: impl FnMut(&Fifo, u32) + Send + 'static,
    ) {
        let mut cpu = self.core.lock_cpu();
        cpu.fifo.channel_mut(channel).value32 = Route::Registered(Box::new(handler));
        let owned = cpu.fifo.begin_dispatch();
        drop(cpu);

        loop {
            let mut cpu = self.core.lock_cpu();
            if !cpu.fifo.has_value32(channel) {
                break;
            }
            let Some(mut handler) = cpu.fifo.channel_mut(channel).value32.lend() else {
                break;
            };
            let Some(value) = cpu.fifo.take_value32(channel) else {
                cpu.fifo.channel_mut(channel).value32.give_back(handler);
                break;
            };
            cpu.fifo.unstall(&self.core.hw);
            drop(cpu);

            self.core.call_handler(|| handler(self, value));
            self.core
                .lock_cpu()
                .fifo
                .channel_mut(channel)
                .value32
                .give_back(handler);
        }

        self.finish_registration(owned);
    }

    /// Register a handler for data messages on `channel`, replacing the
    /// current one. Messages already queued on the channel are delivered to
    /// it first, in order.
    pub fn set_data_handler(
        &self,
        channel: Channel,
        handler: impl FnMut(&Fifo, usize) + Send + 'static,
    ) {
        let mut cpu = self.core.lock_cpu();
        cpu.fifo.channel_mut(channel).data = Route::Registered(Box::new(handler));
        let owned = cpu.fifo.begin_dispatch();
        drop(cpu);

        loop {
            let mut cpu = self.core.lock_cpu();
            let Some((len, mark)) = cpu.fifo.peek_data(channel) else {
                break;
            };
            let Some(mut handler) = cpu.fifo.channel_mut(channel).data.lend() else {
                break;
            };
            drop(cpu);

            self.core.call_handler(|| handler(self, len));

            let mut cpu = self.core.lock_cpu();
            cpu.fifo.discard_data_if_head(channel, mark);
            cpu.fifo.channel_mut(channel).data.give_back(handler);
            cpu.fifo.unstall(&self.core.hw);
        }

        self.finish_registration(owned);
    }

    /// Release the dispatch guard claimed for a registration and have the
    /// receive interrupt deliver whatever arrived in the meantime.
    fn finish_registration(&self, owned: bool) {
        if !owned {
            return;
        }
        self.core.lock_cpu().fifo.end_dispatch();
        self.core.pend(IrqFlags::FIFO_RECV);
    }

    /// Remove the address handler of `channel`. Address messages queue up for
    /// polling again.
    pub fn clear_address_handler(&self, channel: Channel) {
        self.core.lock_cpu().fifo.channel_mut(channel).address = Route::Unregistered;
    }

    /// Remove the scalar handler of `channel`. Scalar messages queue up for
    /// polling again.
    pub fn clear_value32_handler(&self, channel: Channel) {
        self.core.lock_cpu().fifo.channel_mut(channel).value32 = Route::Unregistered;
    }

    /// Remove the data handler of `channel`. Data messages queue up for
    /// polling again.
    pub fn clear_data_handler(&self, channel: Channel) {
        self.core.lock_cpu().fifo.channel_mut(channel).data = Route::Unregistered;
    }

    // Polling
    // ---------------------------------------------------------------------

    pub fn check_address(&self, channel: Channel) -> bool {
        self.core.lock_cpu().fifo.has_address(channel)
    }

    /// Remove the oldest queued address message of `channel`.
    pub fn get_address(&self, channel: Channel) -> Result<u32, RecvError> {
        let mut cpu = self.core.lock_cpu();
        let address = cpu.fifo.take_address(channel).ok_or(RecvError::QueueEmpty)?;
        cpu.fifo.unstall(&self.core.hw);
        Ok(address)
    }

    pub fn check_value32(&self, channel: Channel) -> bool {
        self.core.lock_cpu().fifo.has_value32(channel)
    }

    /// Remove the oldest queued scalar message of `channel`.
    pub fn get_value32(&self, channel: Channel) -> Result<u32, RecvError> {
        let mut cpu = self.core.lock_cpu();
        let value = cpu.fifo.take_value32(channel).ok_or(RecvError::QueueEmpty)?;
        cpu.fifo.unstall(&self.core.hw);
        Ok(value)
    }

    /// Get the length in bytes of the oldest queued data message of
    /// `channel`.
    pub fn check_data_len(&self, channel: Channel) -> Option<usize> {
        self.core.lock_cpu().fifo.data_len(channel)
    }

    /// Remove the oldest queued data message of `channel`, copying as much of
    /// it as fits into `buf`. Returns the number of bytes copied; the rest of
    /// the message is discarded.
    pub fn get_data(&self, channel: Channel, buf: &mut [u8]) -> Result<usize, RecvError> {
        let mut cpu = self.core.lock_cpu();
        let copied = cpu
            .fifo
            .take_data(channel, buf)
            .ok_or(RecvError::QueueEmpty)?;
        cpu.fifo.unstall(&self.core.hw);
        Ok(copied)
    }

    // Blocking receive
    // ---------------------------------------------------------------------

    fn wait_recv<T>(
        &self,
        mut poll: impl FnMut(&Self) -> Result<T, RecvError>,
    ) -> Result<T, WaitError> {
        loop {
            if let Ok(x) = poll(self) {
                return Ok(x);
            }
            self.wait_for(IrqFlags::FIFO_RECV)?;
        }
    }

    /// Wait for an address message on `channel` and remove it.
    pub fn wait_address(&self, channel: Channel) -> Result<u32, WaitError> {
        self.wait_recv(|fifo| fifo.get_address(channel))
    }

    /// Wait for a scalar message on `channel` and remove it.
    pub fn wait_value32(&self, channel: Channel) -> Result<u32, WaitError> {
        self.wait_recv(|fifo| fifo.get_value32(channel))
    }

    /// Wait for a data message on `channel` and remove it. See
    /// [`Self::get_data`].
    pub fn wait_data(&self, channel: Channel, buf: &mut [u8]) -> Result<usize, WaitError> {
        self.wait_recv(|fifo| fifo.get_data(channel, &mut *buf))
    }

    // Miscellaneous
    // ---------------------------------------------------------------------

    /// Take a snapshot of the buffer pool's usage.
    pub fn stats(&self) -> PoolStats {
        self.core.lock_cpu().fifo.stats()
    }

    /// Determine whether the hardware FIFO's error flag is set. It never is
    /// unless something wrote to the FIFO behind the engine's back.
    pub fn hw_error(&self) -> bool {
        self.core.hw.cnt().contains(FifoCnt::ERROR)
    }

    /// Get the cooperative mutex associated with `channel`.
    pub fn channel_mutex(&self, channel: Channel) -> &Comutex {
        &self.core.comutexes[channel.num() as usize]
    }
}
