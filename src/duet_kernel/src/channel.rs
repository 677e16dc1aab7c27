//! Logical channels and their per-kind delivery state.
use core::{fmt, mem};

use crate::{cfg::NUM_CHANNELS, error::ChannelError, pool::SlotList};

/// One of the [`NUM_CHANNELS`] logical lanes multiplexed over the FIFO link.
///
/// All channels exist statically; there is nothing to create or destroy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Channel(u8);

impl Channel {
    /// Power management.
    pub const POWER: Self = Self(0);
    /// Sound hardware control.
    pub const SOUND: Self = Self(1);
    /// System requests (e.g., firmware settings, touch input).
    pub const SYSTEM: Self = Self(2);
    /// The audio streaming engine.
    pub const AUDIO_ENGINE: Self = Self(3);
    /// The wireless driver.
    pub const WIFI: Self = Self(4);
    /// Removable and internal storage.
    pub const STORAGE: Self = Self(5);
    /// Firmware flash access.
    pub const FIRMWARE: Self = Self(6);
    /// The camera driver.
    pub const CAMERA: Self = Self(7);
    /// The first channel reserved for applications. Channels from here up to
    /// `NUM_CHANNELS - 1` are free for application use.
    pub const USER_FIRST: Self = Self(8);

    /// Construct a `Channel` from a raw channel number.
    ///
    /// ```
    /// use duet_kernel::Channel;
    /// assert_eq!(Channel::new(5), Ok(Channel::STORAGE));
    /// assert!(Channel::new(16).is_err());
    /// ```
    pub const fn new(num: u8) -> Result<Self, ChannelError> {
        if (num as usize) < NUM_CHANNELS {
            Ok(Self(num))
        } else {
            Err(ChannelError::BadParam)
        }
    }

    /// Construct a `Channel` from the low four bits of `num`.
    #[inline]
    pub(crate) const fn from_bits(num: u32) -> Self {
        Self((num & 0xf) as u8)
    }

    #[inline]
    pub const fn num(self) -> u8 {
        self.0
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over all channels in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..NUM_CHANNELS as u8).map(Self)
    }
}

impl TryFrom<u8> for Channel {
    type Error = ChannelError;

    #[inline]
    fn try_from(num: u8) -> Result<Self, Self::Error> {
        Self::new(num)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Channel({})", self.0)
    }
}

/// The kind of a channel message. Each kind has its own queue and handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Address,
    Value32,
    Data,
}

/// Where a newly completed message of one kind goes.
pub enum Route<H> {
    /// No handler is registered. Messages accumulate in the channel's queue
    /// for polling.
    Unregistered,
    /// Messages are handed to this handler as soon as they are dispatched.
    Registered(H),
    /// A handler is registered, but it has been lent out to the dispatcher
    /// for the duration of a call.
    Lent,
}

impl<H> Route<H> {
    #[inline]
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::Unregistered)
    }

    /// Take the handler out for a call, leaving [`Route::Lent`] in its place.
    pub fn lend(&mut self) -> Option<H> {
        match mem::replace(self, Self::Lent) {
            Self::Registered(h) => Some(h),
            other => {
                *self = other;
                None
            }
        }
    }

    /// Return a handler taken by [`Self::lend`]. If the route was changed
    /// while the handler was out (the handler replaced or removed itself),
    /// the returned handler is dropped instead.
    pub fn give_back(&mut self, handler: H) {
        if let Self::Lent = self {
            *self = Self::Registered(handler);
        }
    }
}

impl<H> fmt::Debug for Route<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Unregistered => "Unregistered",
            Self::Registered(_) => "Registered",
            Self::Lent => "Lent",
        })
    }
}

/// The handler types a port plugs into the channel table.
pub trait Handlers {
    /// Called with an address message's full address.
    type Address;
    /// Called with a scalar message's value.
    type Value32;
    /// Called with a data block's length in bytes. The bytes themselves stay
    /// in the channel's data queue for the handler to pull.
    type Data;
}

/// The delivery state of one channel: a route and a queue per message kind.
pub struct ChannelState<H: Handlers> {
    pub address: Route<H::Address>,
    pub value32: Route<H::Value32>,
    pub data: Route<H::Data>,
    pub(crate) address_queue: SlotList,
    pub(crate) value32_queue: SlotList,
    /// Data messages, each stored as a header slot (marked
    /// [`SlotKind::DataStart`](crate::pool::SlotKind::DataStart)) followed by
    /// its payload words.
    pub(crate) data_queue: SlotList,
}

impl<H: Handlers> ChannelState<H> {
    pub const fn new() -> Self {
        Self {
            address: Route::Unregistered,
            value32: Route::Unregistered,
            data: Route::Unregistered,
            address_queue: SlotList::new(),
            value32_queue: SlotList::new(),
            data_queue: SlotList::new(),
        }
    }

    pub(crate) fn queue(&self, kind: MessageKind) -> &SlotList {
        match kind {
            MessageKind::Address => &self.address_queue,
            MessageKind::Value32 => &self.value32_queue,
            MessageKind::Data => &self.data_queue,
        }
    }

    pub(crate) fn queue_mut(&mut self, kind: MessageKind) -> &mut SlotList {
        match kind {
            MessageKind::Address => &mut self.address_queue,
            MessageKind::Value32 => &mut self.value32_queue,
            MessageKind::Data => &mut self.data_queue,
        }
    }

    /// Get the number of slots held by this channel's queues.
    pub fn queued_slots(&self) -> usize {
        self.address_queue.len() + self.value32_queue.len() + self.data_queue.len()
    }
}

impl<H: Handlers> Default for ChannelState<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handlers> fmt::Debug for ChannelState<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ChannelState")
            .field("address", &self.address)
            .field("value32", &self.value32)
            .field("data", &self.data)
            .field("address_queue", &self.address_queue.len())
            .field("value32_queue", &self.value32_queue.len())
            .field("data_queue", &self.data_queue.len())
            .finish()
    }
}
