//! Synchronized reset of both cores.
use duet_kernel::{
    reset::{self, ResetAction},
    CoreId,
};
use std::{hint, thread};

use crate::{sched::CoreShared, Core, CoreExit, ResetError};

fn spin() {
    hint::spin_loop();
    thread::yield_now();
}

impl Core {
    /// Ask the peer core to reset and wait until both cores have met in the
    /// sync handshake. Must be called by a cothread of this core.
    ///
    /// Core A makes core B reboot at `reboot_entry`. Core B makes core A
    /// soft-reset the device, and `reboot_entry` is ignored.
    ///
    /// The requesting core keeps running afterwards; on hardware it would
    /// typically go on to reset itself.
    pub fn request_peer_reset(&self, reboot_entry: Option<u32>) -> Result<(), ResetError> {
        let shared = &*self.shared;
        if !shared.is_current() {
            return Err(ResetError::BadContext);
        }
        let fifo = self.fifo();

        // Anything already staged must go out before the request
        fifo.flush()?;
        if shared.id == CoreId::A {
            shared.hw.link().publish_reboot_vector(reboot_entry);
        }
        let code = reset::request_code(shared.id);
        log::info!("{:?}: requesting a peer reset ({code:#x})", shared.id);
        fifo.send_special(code)?;
        fifo.flush()?;

        reset::perform_handshake(&shared.hw, spin);
        log::info!("{:?}: peer reset handshake complete", shared.id);
        Ok(())
    }
}

impl CoreShared {
    /// Stop normal processing, meet the peer in the handshake, and make the
    /// scheduling loop exit with the corresponding [`CoreExit`].
    pub(crate) fn accept_reset(&self, action: ResetAction) {
        log::info!("{:?}: accepting a reset request ({action:?})", self.id);
        reset::perform_handshake(&self.hw, spin);

        let exit = match action {
            ResetAction::SoftReset => CoreExit::SoftReset,
            ResetAction::Reboot => CoreExit::Reboot {
                entry: self.hw.link().take_reboot_vector(),
            },
        };
        self.halt(exit);
    }
}
