//! Header word packing and unpacking.
//!
//! Every unit crossing the hardware FIFO is one 32-bit word. The first word of
//! each message is a *header*:
//!
//! ```text
//!  31    28 27 26 25 24                                               0
//! ┌────────┬──┬──┬──┬─────────────────────────────────────────────────┐
//! │channel │A │I │X │ payload                                         │
//! └────────┴──┴──┴──┴─────────────────────────────────────────────────┘
//!   A=1 I=0      address: payload = low 25 bits of a shared-RAM address
//!   A=0 I=1 X=0  scalar: payload = the value itself
//!   A=0 I=1 X=1  scalar: payload ignored, the value follows in one raw word
//!   A=0 I=0      data block: payload = byte count, ceil(n/4) raw words follow
//!   A=1 I=1      special command: payload[23:0] = command code, no channel
//! ```
use crate::{
    cfg::{MAX_DATA_BYTES, SHARED_RAM_BASE, SHARED_RAM_SIZE},
    Channel,
};

const CHANNEL_SHIFT: u32 = 28;
const ADDRESS_FLAG: u32 = 1 << 27;
const IMMEDIATE_FLAG: u32 = 1 << 26;
const EXTRA_FLAG: u32 = 1 << 25;

/// The bits available to a header's payload.
pub const PAYLOAD_MASK: u32 = (1 << 25) - 1;

/// The bits available to a special command code.
pub const SPECIAL_MASK: u32 = (1 << 24) - 1;

/// The address bits carried by an address header. The remaining upper bits
/// are reconstructed from [`SHARED_RAM_BASE`].
const ADDRESS_MASK: u32 = PAYLOAD_MASK;

/// A decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// A pointer into the shared-RAM window.
    Address { channel: Channel, address: u32 },
    /// A scalar small enough to travel inside the header.
    Value32 { channel: Channel, value: u32 },
    /// A scalar carried by the one raw word following the header.
    Value32Extra { channel: Channel },
    /// A byte block of `len` bytes carried by the raw words following the
    /// header.
    Data { channel: Channel, len: usize },
    /// An out-of-band command that doesn't belong to any channel.
    Special { code: u32 },
}

impl Header {
    /// Classify a header word.
    pub const fn decode(word: u32) -> Self {
        let channel = Channel::from_bits(word >> CHANNEL_SHIFT);
        let payload = word & PAYLOAD_MASK;
        match (word & ADDRESS_FLAG != 0, word & IMMEDIATE_FLAG != 0) {
            (true, true) => Self::Special {
                code: word & SPECIAL_MASK,
            },
            (true, false) => Self::Address {
                channel,
                address: unpack_address(payload),
            },
            (false, true) => {
                if word & EXTRA_FLAG != 0 {
                    Self::Value32Extra { channel }
                } else {
                    Self::Value32 {
                        channel,
                        value: payload,
                    }
                }
            }
            (false, false) => Self::Data {
                channel,
                len: payload as usize,
            },
        }
    }

    /// Produce the header word.
    ///
    /// The caller is responsible for the payload being in range (see
    /// [`pack_address`], [`value_fits_immediate`], [`MAX_DATA_BYTES`]);
    /// out-of-range bits are truncated.
    pub const fn encode(self) -> u32 {
        match self {
            Self::Address { channel, address } => {
                channel_bits(channel) | ADDRESS_FLAG | (address & ADDRESS_MASK)
            }
            Self::Value32 { channel, value } => {
                channel_bits(channel) | IMMEDIATE_FLAG | (value & PAYLOAD_MASK)
            }
            Self::Value32Extra { channel } => channel_bits(channel) | IMMEDIATE_FLAG | EXTRA_FLAG,
            Self::Data { channel, len } => channel_bits(channel) | (len as u32 & PAYLOAD_MASK),
            Self::Special { code } => ADDRESS_FLAG | IMMEDIATE_FLAG | (code & SPECIAL_MASK),
        }
    }

    /// Get the number of raw words that follow this header on the wire.
    pub const fn trailing_words(self) -> usize {
        match self {
            Self::Value32Extra { .. } => 1,
            Self::Data { len, .. } => data_words(len),
            Self::Address { .. } | Self::Value32 { .. } | Self::Special { .. } => 0,
        }
    }
}

#[inline]
const fn channel_bits(channel: Channel) -> u32 {
    (channel.num() as u32) << CHANNEL_SHIFT
}

/// Check that `address` is inside the shared-RAM window and return the bits
/// that go into an address header.
pub const fn pack_address(address: u32) -> Option<u32> {
    if address.wrapping_sub(SHARED_RAM_BASE) < SHARED_RAM_SIZE {
        Some(address & ADDRESS_MASK)
    } else {
        None
    }
}

/// Reconstruct a full address from an address header's payload.
#[inline]
pub const fn unpack_address(payload: u32) -> u32 {
    (payload & ADDRESS_MASK) | (SHARED_RAM_BASE & !ADDRESS_MASK)
}

/// Determine whether `value` can travel inside a header word.
#[inline]
pub const fn value_fits_immediate(value: u32) -> bool {
    value & !PAYLOAD_MASK == 0
}

/// Get the number of raw words needed to carry `len` bytes.
#[inline]
pub const fn data_words(len: usize) -> usize {
    (len + 3) / 4
}

/// Encode a scalar into its header and optional trailing word.
pub fn encode_value32(channel: Channel, value: u32) -> (u32, Option<u32>) {
    if value_fits_immediate(value) {
        (Header::Value32 { channel, value }.encode(), None)
    } else {
        (Header::Value32Extra { channel }.encode(), Some(value))
    }
}

/// Iterate over the raw words carrying `bytes`, little-endian, with the final
/// word zero-padded.
///
/// # Panics
///
/// `bytes` must not exceed [`MAX_DATA_BYTES`].
pub fn data_payload(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    assert!(bytes.len() <= MAX_DATA_BYTES);
    bytes.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(word)
    })
}

/// Copy the bytes carried by `words` into `out`, stopping at whichever runs
/// out first. Returns the number of bytes copied.
pub fn unpack_data(words: impl Iterator<Item = u32>, out: &mut [u8]) -> usize {
    let mut copied = 0;
    for word in words {
        if copied >= out.len() {
            break;
        }
        let bytes = word.to_le_bytes();
        let n = bytes.len().min(out.len() - copied);
        out[copied..copied + n].copy_from_slice(&bytes[..n]);
        copied += n;
    }
    copied
}
