//! Request/response traffic between the two cores of a simulated platform.
//!
//! Core B acts as the I/O core. It answers scalar pings from its main task,
//! echoes data blocks back reversed from a handler, and keeps a per-channel
//! tally in a helper cothread. Core A drives the exchange and finally asks
//! core B to reboot.
//!
//! Run with `RUST_LOG=info` (or `debug`/`trace` for the scheduler's view).
use duet_port_std::{
    yield_until, Channel, Core, CoreId, Fifo, IrqFlags, Platform, PlatformConfig, SpawnOptions,
    MAX_DATA_BYTES,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

const PING: Channel = Channel::USER_FIRST;
const ECHO: Channel = match Channel::new(9) {
    Ok(ch) => ch,
    Err(_) => panic!(),
};

const NUM_PINGS: u32 = 8;
const REBOOT_ENTRY: u32 = 0x0200_0800;

fn io_core(core: Core) -> i32 {
    let fifo = core.fifo();
    let echoed = Arc::new(AtomicU32::new(0));

    fifo.set_data_handler(ECHO, {
        let echoed = Arc::clone(&echoed);
        move |fifo: &Fifo, len| {
            let mut buf = [0u8; MAX_DATA_BYTES];
            let Ok(len) = fifo.get_data(ECHO, &mut buf[..len]) else {
                return;
            };
            buf[..len].reverse();
            if let Err(e) = fifo.send_data(ECHO, &buf[..len]) {
                log::warn!("echo failed: {e}");
            }
            echoed.fetch_add(1, Ordering::Relaxed);
        }
    });

    // Report progress now and then without holding up the main task
    core.spawn(SpawnOptions::new().detached(), {
        let echoed = Arc::clone(&echoed);
        move || loop {
            yield_until(IrqFlags::FIFO_RECV).unwrap();
            log::debug!("B: {} block(s) echoed so far", echoed.load(Ordering::Relaxed));
        }
    })
    .unwrap();

    loop {
        let ping = fifo.wait_value32(PING).unwrap();
        log::info!("B: ping {ping:#x}");
        fifo.send_value32(PING, ping.wrapping_mul(3)).unwrap();
    }
}

fn app_core(core: Core) -> i32 {
    let fifo = core.fifo();

    for i in 1..=NUM_PINGS {
        // Every other ping needs the two-word encoding
        let ping = if i % 2 == 0 { i << 28 } else { i };
        fifo.send_value32(PING, ping).unwrap();
        let pong = fifo.wait_value32(PING).unwrap();
        log::info!("A: pong {pong:#x}");
        assert_eq!(pong, ping.wrapping_mul(3));
    }

    let message = b"the quick brown fox jumps over the lazy dog";
    fifo.send_data(ECHO, message).unwrap();
    let mut buf = [0u8; MAX_DATA_BYTES];
    let len = fifo.wait_data(ECHO, &mut buf).unwrap();
    log::info!("A: echo {:?}", String::from_utf8_lossy(&buf[..len]));

    log::info!("A: pool {:?}", fifo.stats());
    core.request_peer_reset(Some(REBOOT_ENTRY)).unwrap();
    0
}

fn main() {
    env_logger::init();

    let platform = Platform::new(PlatformConfig::DEFAULT);
    let b = platform.spawn_core(CoreId::B, {
        let core = platform.core(CoreId::B);
        move || io_core(core)
    });
    let a = platform.spawn_core(CoreId::A, {
        let core = platform.core(CoreId::A);
        move || app_core(core)
    });

    let a = a.join().expect("core A panicked");
    let b = b.join().expect("core B panicked");
    log::info!("core A: {a:?}");
    log::info!("core B: {b:?}");
}
