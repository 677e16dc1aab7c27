//! The FIFO messaging engine.
//!
//! [`FifoState`] owns a core's slot pool and every list built on it: the
//! outgoing *staging* queue, the incoming *reassembly* queue, and the
//! per-channel delivery queues. It's driven by the port from three places:
//!
//!  - Task context, to stage outgoing messages ([`FifoState::stage`]) and to
//!    poll delivery queues.
//!  - The send interrupt handler ([`FifoState::drain_tx`]).
//!  - The receive interrupt handler ([`FifoState::pull_rx`] followed by a
//!    dispatch pass made of [`FifoState::dispatch_next`] calls).
//!
//! Every method must be called with the core's CPU Lock active. Handlers are
//! never called from here. Instead, [`Dispatch`] hands the handler out to the
//! port, which calls it with CPU Lock released and then returns it through
//! the channel's [`Route`](crate::channel::Route).
use core::fmt;

use crate::{
    cfg::{CoreConfig, MAX_DATA_BYTES, NUM_CHANNELS},
    channel::{ChannelState, Handlers, MessageKind},
    codec::{self, Header},
    hw::FifoRegs,
    pool::{Pool, SlotKind, SlotList, SlotMark},
    Channel,
};

/// The outcome of one [`FifoState::dispatch_next`] call.
pub enum Dispatch<H: Handlers> {
    /// The reassembly queue is empty.
    Idle,
    /// The message at the head of the reassembly queue hasn't fully arrived.
    /// It stays there until more words are pulled in.
    Incomplete,
    /// A message was appended to a channel's delivery queue.
    Queued,
    /// A malformed message was discarded.
    Dropped,
    /// An address message for a registered handler. The message's slot is
    /// already freed.
    Address {
        channel: Channel,
        address: u32,
        handler: H::Address,
    },
    /// A scalar message for a registered handler. The message's slots are
    /// already freed.
    Value32 {
        channel: Channel,
        value: u32,
        handler: H::Value32,
    },
    /// A data message for a registered handler. The message was appended to
    /// the channel's data queue so that the handler can pull the bytes. The
    /// port should call [`FifoState::discard_data_if_head`] with `mark` after
    /// the handler returns.
    Data {
        channel: Channel,
        len: usize,
        mark: SlotMark,
        handler: H::Data,
    },
    /// A special command.
    Special { code: u32 },
}

impl<H: Handlers> fmt::Debug for Dispatch<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Incomplete => f.write_str("Incomplete"),
            Self::Queued => f.write_str("Queued"),
            Self::Dropped => f.write_str("Dropped"),
            Self::Address {
                channel, address, ..
            } => write!(f, "Address({channel:?}, {address:#010x})"),
            Self::Value32 { channel, value, .. } => write!(f, "Value32({channel:?}, {value:#x})"),
            Self::Data { channel, len, .. } => write!(f, "Data({channel:?}, {len})"),
            Self::Special { code } => write!(f, "Special({code:#x})"),
        }
    }
}

/// A snapshot of where a core's slots are.
///
/// `free + staging + reassembly + queued == capacity` holds for every
/// snapshot taken with CPU Lock active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub free: usize,
    pub staging: usize,
    pub reassembly: usize,
    /// The slots held by all channels' delivery queues.
    pub queued: usize,
}

impl PoolStats {
    /// Determine whether every slot is accounted for.
    pub fn is_conserved(&self) -> bool {
        self.free + self.staging + self.reassembly + self.queued == self.capacity
    }
}

/// The messaging state of one core.
pub struct FifoState<H: Handlers> {
    pool: Pool,
    staging: SlotList,
    reassembly: SlotList,
    channels: [ChannelState<H>; NUM_CHANNELS],
    /// Set while a dispatch pass (or a handler registration draining a
    /// queue) is in progress. Nested receive interrupts only pull words.
    dispatching: bool,
    /// Set when [`Self::pull_rx`] found the pool exhausted and disabled the
    /// receive interrupt.
    recv_stalled: bool,
}

impl<H: Handlers> FifoState<H> {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            pool: Pool::new(cfg.pool_slots()),
            staging: SlotList::new(),
            reassembly: SlotList::new(),
            channels: core::array::from_fn(|_| ChannelState::new()),
            dispatching: false,
            recv_stalled: false,
        }
    }

    /// Bring the hardware into the state the engine expects: FIFO enabled
    /// and cleared, receive interrupt on, send interrupt off until there's
    /// something to send.
    pub fn init_hw<R: FifoRegs + ?Sized>(&self, regs: &R) {
        regs.enable_and_clear();
        regs.set_send_irq(false);
        regs.set_recv_irq(true);
    }

    #[inline]
    pub fn channel(&self, channel: Channel) -> &ChannelState<H> {
        &self.channels[channel.index()]
    }

    #[inline]
    pub fn channel_mut(&mut self, channel: Channel) -> &mut ChannelState<H> {
        &mut self.channels[channel.index()]
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.pool.capacity(),
            free: self.pool.free_len(),
            staging: self.staging.len(),
            reassembly: self.reassembly.len(),
            queued: self.channels.iter().map(ChannelState::queued_slots).sum(),
        }
    }

    #[inline]
    pub fn is_staging_empty(&self) -> bool {
        self.staging.is_empty()
    }

    #[inline]
    pub fn is_recv_stalled(&self) -> bool {
        self.recv_stalled
    }

    // Send side
    // ---------------------------------------------------------------------

    /// Copy `words` into freshly allocated slots and append them to the
    /// staging queue as one unit.
    ///
    /// This is all-or-nothing: if the pool can't hold all of `words`, nothing
    /// is allocated and `false` is returned. The caller is expected to wait
    /// for the send interrupt (which frees slots as it drains) and retry.
    /// Because the whole message enters the staging queue in one step, words
    /// of two messages staged by different cothreads never interleave.
    pub fn stage(&mut self, words: &[u32]) -> bool {
        if self.pool.free_len() < words.len() {
            log::trace!(
                "pool exhausted: need {} slots, {} free",
                words.len(),
                self.pool.free_len()
            );
            return false;
        }

        let mut chain = SlotList::new();
        for &word in words {
            // Can't fail; the free count was checked above
            let slot = self.pool.alloc(word).expect("pool underflow");
            self.pool.push_back(&mut chain, slot);
        }
        self.pool.append(&mut self.staging, chain);
        true
    }

    /// Move words from the staging queue to the transmit FIFO until either
    /// runs out, and set the send interrupt accordingly. Returns the number
    /// of words written.
    ///
    /// This is the body of the send interrupt handler. It's also called right
    /// after staging a message so that short messages go out without waiting
    /// for an interrupt.
    pub fn drain_tx<R: FifoRegs + ?Sized>(&mut self, regs: &R) -> usize {
        let mut written = 0;
        while !regs.tx_full() {
            let Some(slot) = self.pool.pop_front(&mut self.staging) else {
                break;
            };
            regs.write_tx(self.pool.word(&slot));
            self.pool.free(slot);
            written += 1;
        }

        // The send interrupt is level-triggered; leaving it enabled with
        // nothing to send would make it fire continuously.
        regs.set_send_irq(!self.staging.is_empty());

        if written > 0 {
            self.unstall(regs);
        }
        written
    }

    // Receive side
    // ---------------------------------------------------------------------

    /// Move words from the receive FIFO to the reassembly queue. Returns the
    /// number of words moved.
    ///
    /// If the pool runs out, the remaining words are left in the hardware and
    /// the receive interrupt is disabled until a slot is freed.
    pub fn pull_rx<R: FifoRegs + ?Sized>(&mut self, regs: &R) -> usize {
        let mut pulled = 0;
        while !regs.rx_empty() {
            let Some(slot) = self.pool.alloc(0) else {
                if !self.recv_stalled {
                    log::debug!("pool exhausted; stalling the receive side");
                    self.recv_stalled = true;
                    regs.set_recv_irq(false);
                }
                break;
            };
            let Some(word) = regs.read_rx() else {
                self.pool.free(slot);
                break;
            };
            self.pool.set_word(&slot, word);
            self.pool.push_back(&mut self.reassembly, slot);
            pulled += 1;
        }
        pulled
    }

    /// Try to claim the dispatch guard. Returns `false` if a dispatch pass is
    /// already in progress further up the stack.
    #[inline]
    pub fn begin_dispatch(&mut self) -> bool {
        !core::mem::replace(&mut self.dispatching, true)
    }

    #[inline]
    pub fn end_dispatch(&mut self) {
        debug_assert!(self.dispatching);
        self.dispatching = false;
    }

    #[inline]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching
    }

    /// Classify the message at the head of the reassembly queue and route it.
    ///
    /// The caller should hold the dispatch guard and keep calling this until
    /// it returns [`Dispatch::Idle`] or [`Dispatch::Incomplete`].
    pub fn dispatch_next(&mut self) -> Dispatch<H> {
        let Some(header_word) = self.pool.front_word(&self.reassembly) else {
            return Dispatch::Idle;
        };
        let header = Header::decode(header_word);

        if let Header::Data { len, channel } = header {
            if len > MAX_DATA_BYTES {
                // A conforming peer never sends this. The trailing word count
                // can't be trusted, so only the header is dropped.
                log::warn!("dropping oversized data header on {channel:?} ({len} bytes)");
                self.free_front(1);
                return Dispatch::Dropped;
            }
        }

        let needed = 1 + header.trailing_words();
        if self.reassembly.len() < needed {
            return Dispatch::Incomplete;
        }

        match header {
            Header::Address { channel, address } => {
                let state = &mut self.channels[channel.index()];
                if let Some(handler) = state.address.lend() {
                    self.free_front(1);
                    Dispatch::Address {
                        channel,
                        address,
                        handler,
                    }
                } else {
                    let slot = self.pool.pop_front(&mut self.reassembly).expect("empty");
                    self.pool.set_word(&slot, address);
                    self.pool.push_back(&mut state.address_queue, slot);
                    Dispatch::Queued
                }
            }
            Header::Value32 { channel, .. } | Header::Value32Extra { channel } => {
                // Both forms are stored as one slot holding the full value
                let mut slot = self.pool.pop_front(&mut self.reassembly).expect("empty");
                let value = if let Header::Value32 { value, .. } = header {
                    value
                } else {
                    self.pool.free(slot);
                    slot = self.pool.pop_front(&mut self.reassembly).expect("empty");
                    self.pool.word(&slot)
                };

                let state = &mut self.channels[channel.index()];
                if let Some(handler) = state.value32.lend() {
                    self.pool.free(slot);
                    Dispatch::Value32 {
                        channel,
                        value,
                        handler,
                    }
                } else {
                    self.pool.set_word(&slot, value);
                    self.pool.push_back(&mut state.value32_queue, slot);
                    Dispatch::Queued
                }
            }
            Header::Data { channel, len } => {
                // The header slot is kept as the message's delimiter in the
                // data queue, tagged with the byte count
                let header_slot = self.pool.pop_front(&mut self.reassembly).expect("empty");
                self.pool.set_kind(&header_slot, SlotKind::DataStart, len as u8);
                let mark = header_slot.mark();
                let payload = self.pool.split_front(&mut self.reassembly, needed - 1);

                let state = &mut self.channels[channel.index()];
                self.pool.push_back(&mut state.data_queue, header_slot);
                self.pool.append(&mut state.data_queue, payload);

                if let Some(handler) = state.data.lend() {
                    Dispatch::Data {
                        channel,
                        len,
                        mark,
                        handler,
                    }
                } else {
                    Dispatch::Queued
                }
            }
            Header::Special { code } => {
                log::debug!("special command {code:#x}");
                self.free_front(1);
                Dispatch::Special { code }
            }
        }
    }

    // Polling
    // ---------------------------------------------------------------------

    pub fn has_address(&self, channel: Channel) -> bool {
        !self.channel(channel).queue(MessageKind::Address).is_empty()
    }

    pub fn take_address(&mut self, channel: Channel) -> Option<u32> {
        self.take_word(channel, MessageKind::Address)
    }

    pub fn has_value32(&self, channel: Channel) -> bool {
        !self.channel(channel).queue(MessageKind::Value32).is_empty()
    }

    pub fn take_value32(&mut self, channel: Channel) -> Option<u32> {
        self.take_word(channel, MessageKind::Value32)
    }

    /// Get the length in bytes of the oldest queued data message.
    pub fn data_len(&self, channel: Channel) -> Option<usize> {
        match self.pool.front_kind(&self.channel(channel).data_queue)? {
            (SlotKind::DataStart, len) => Some(len as usize),
            (SlotKind::Unused, _) => unreachable!("data queue out of sync"),
        }
    }

    /// Get the length and identity of the oldest queued data message. The
    /// mark can be passed to [`Self::discard_data_if_head`] later.
    pub fn peek_data(&self, channel: Channel) -> Option<(usize, SlotMark)> {
        let len = self.data_len(channel)?;
        let mark = self.channel(channel).data_queue.front_mark()?;
        Some((len, mark))
    }

    /// Remove the oldest queued data message, copying as many of its bytes as
    /// fit into `out`. Returns the number of bytes copied.
    pub fn take_data(&mut self, channel: Channel, out: &mut [u8]) -> Option<usize> {
        let len = self.data_len(channel)?;
        let queue = &mut self.channels[channel.index()].data_queue;
        let header = self.pool.pop_front(queue).expect("empty");
        let payload = self.pool.split_front(queue, codec::data_words(len));

        let out_len = len.min(out.len());
        let copied = codec::unpack_data(self.pool.words(&payload), &mut out[..out_len]);

        self.pool.free(header);
        self.pool.free_list(payload);
        Some(copied)
    }

    /// Discard the oldest queued data message of `channel` if it's still the
    /// one identified by `mark`. Called after a data handler returns so that
    /// a message the handler didn't pull doesn't hold slots forever.
    pub fn discard_data_if_head(&mut self, channel: Channel, mark: SlotMark) -> bool {
        if self.channel(channel).data_queue.front_mark() != Some(mark) {
            return false;
        }
        let discarded = self.take_data(channel, &mut []);
        debug_assert_eq!(discarded, Some(0));
        true
    }

    /// Re-enable the receive side if it was stalled and a slot has become
    /// available. The port must call this after any polling call that
    /// returned a message, because polling doesn't have register access.
    pub fn unstall<R: FifoRegs + ?Sized>(&mut self, regs: &R) -> bool {
        if self.recv_stalled && self.pool.free_len() > 0 {
            log::debug!("slots freed; resuming the receive side");
            self.recv_stalled = false;
            regs.set_recv_irq(true);
            true
        } else {
            false
        }
    }

    // Internal helpers
    // ---------------------------------------------------------------------

    fn take_word(&mut self, channel: Channel, kind: MessageKind) -> Option<u32> {
        let queue = self.channels[channel.index()].queue_mut(kind);
        let slot = self.pool.pop_front(queue)?;
        let word = self.pool.word(&slot);
        self.pool.free(slot);
        Some(word)
    }

    /// Free the first `count` slots of the reassembly queue.
    fn free_front(&mut self, count: usize) {
        let list = self.pool.split_front(&mut self.reassembly, count);
        self.pool.free_list(list);
    }
}

impl<H: Handlers> fmt::Debug for FifoState<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FifoState")
            .field("stats", &self.stats())
            .field("dispatching", &self.dispatching)
            .field("recv_stalled", &self.recv_stalled)
            .finish()
    }
}
