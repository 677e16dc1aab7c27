use duet_port_std::{
    yield_now, yield_until, Channel, CoreExit, CoreId, IrqFlags, Platform, PlatformConfig,
    ResetError,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use crate::run_pair;

#[test]
fn a_reboots_b() {
    let (a, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            core.request_peer_reset(Some(0x0200_1000)).unwrap();
            5
        },
        |core| {
            // Never satisfied; the reset request interrupts the wait
            core.fifo().wait_value32(Channel::USER_FIRST).unwrap();
            unreachable!()
        },
    );
    assert_eq!(a, CoreExit::Exited(5));
    assert_eq!(
        b,
        CoreExit::Reboot {
            entry: Some(0x0200_1000)
        }
    );
}

#[test]
fn b_soft_resets_a() {
    let (a, b) = run_pair(
        PlatformConfig::DEFAULT,
        |_| loop {
            yield_until(IrqFlags::VBLANK).unwrap();
        },
        |core| {
            // The reboot entry is core A's to publish
            core.request_peer_reset(Some(0x0200_1000)).unwrap();
            6
        },
    );
    assert_eq!(a, CoreExit::SoftReset);
    assert_eq!(b, CoreExit::Exited(6));
}

#[test]
fn accepted_reset_stops_the_interrupted_cothread() {
    const CH: Channel = Channel::USER_FIRST;
    let reset_done = Arc::new(AtomicBool::new(false));
    let late_iterations = Arc::new(AtomicU32::new(0));
    let late_sends = Arc::new(AtomicU32::new(0));

    let (a, b) = run_pair(
        PlatformConfig::DEFAULT,
        {
            let reset_done = Arc::clone(&reset_done);
            move |core| {
                core.request_peer_reset(None).unwrap();
                reset_done.store(true, Ordering::SeqCst);

                // Anything core B still sends would show up by now
                thread::sleep(Duration::from_millis(50));
                let fifo = core.fifo();
                let _ = fifo.check_value32(CH);
                fifo.check_value32(CH) as i32
            }
        },
        {
            let reset_done = Arc::clone(&reset_done);
            let late_iterations = Arc::clone(&late_iterations);
            let late_sends = Arc::clone(&late_sends);
            move |core| {
                let fifo = core.fifo();
                let mut i: u32 = 0;
                loop {
                    // Busy-poll so that the reset is taken on this cothread
                    let _ = fifo.check_value32(CH);
                    if reset_done.load(Ordering::SeqCst) {
                        late_iterations.fetch_add(1, Ordering::SeqCst);
                        if i % 50 == 0 && fifo.send_value32(CH, i).is_ok() {
                            late_sends.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    i = i.wrapping_add(1);
                    if i % 100_000 == 0 {
                        yield_now();
                    }
                }
            }
        },
    );

    assert_eq!(b, CoreExit::Reboot { entry: None });
    assert_eq!(late_iterations.load(Ordering::SeqCst), 0);
    assert_eq!(late_sends.load(Ordering::SeqCst), 0);
    // Nothing crossed the link after the handshake
    assert_eq!(a, CoreExit::Exited(0));
}

#[test]
fn core_runs_again_after_reboot() {
    let _ = env_logger::try_init();
    let platform = Platform::new(PlatformConfig::DEFAULT);
    let b = platform.spawn_core(CoreId::B, || loop {
        yield_until(IrqFlags::VBLANK).unwrap();
    });
    let a = platform.spawn_core(CoreId::A, {
        let core = platform.core(CoreId::A);
        move || {
            core.request_peer_reset(None).unwrap();
            // Talk to the rebooted core
            let fifo = core.fifo();
            fifo.send_value32(Channel::USER_FIRST, 20).unwrap();
            fifo.wait_value32(Channel::USER_FIRST).unwrap() as i32
        }
    });

    assert_eq!(b.join().unwrap(), CoreExit::Reboot { entry: None });

    let core = platform.core(CoreId::B);
    let exit = core.clone().run(move || {
        let fifo = core.fifo();
        let v = fifo.wait_value32(Channel::USER_FIRST).unwrap();
        fifo.send_value32(Channel::USER_FIRST, v * 2).unwrap();
        fifo.flush().unwrap();
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
    assert_eq!(a.join().unwrap(), CoreExit::Exited(40));
}

#[test]
fn reset_requires_a_cothread() {
    let platform = Platform::new(PlatformConfig::DEFAULT);
    assert_eq!(
        platform.core(CoreId::A).request_peer_reset(None),
        Err(ResetError::BadContext)
    );
}
