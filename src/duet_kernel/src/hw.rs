//! The hardware interface a port must provide.
//!
//! All methods take `&self` because they model memory-mapped registers; an
//! implementation uses interior mutability as needed. The messaging engine only
//! calls them with the owning core's CPU Lock active.

/// The IPC FIFO registers of one core.
pub trait FifoRegs {
    /// Determine whether the transmit FIFO can't take another word.
    fn tx_full(&self) -> bool;

    /// Push one word into the transmit FIFO. Writing to a full FIFO drops the
    /// word and sets the error flag.
    fn write_tx(&self, word: u32);

    /// Determine whether the receive FIFO is empty.
    fn rx_empty(&self) -> bool;

    /// Pop one word from the receive FIFO. Returns `None` if it's empty.
    fn read_rx(&self) -> Option<u32>;

    /// Enable or disable the "transmit FIFO has room" interrupt source.
    fn set_send_irq(&self, enable: bool);

    /// Enable or disable the "receive FIFO not empty" interrupt source.
    fn set_recv_irq(&self, enable: bool);

    /// Enable the FIFO and discard whatever the transmit side holds.
    fn enable_and_clear(&self);
}

/// The sync register pair used for the reset handshake. Each core writes a
/// small value that the other core can read.
pub trait SyncReg {
    /// Publish `value` (4 bits) to the peer.
    fn write_sync(&self, value: u8);

    /// Read the value the peer last published.
    fn read_peer_sync(&self) -> u8;
}
