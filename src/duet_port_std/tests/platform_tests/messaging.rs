use duet_port_std::{
    kernel::cfg::CoreConfig, yield_until, Channel, CoreExit, IrqFlags, PlatformConfig, RecvError,
    SendError, WaitError, MAX_DATA_BYTES,
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

use crate::run_pair;

const CH: Channel = Channel::USER_FIRST;

fn ch(num: u8) -> Channel {
    Channel::new(num).unwrap()
}

#[test]
fn scalar_round_trip() {
    let (a, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_value32(CH, 41).unwrap();
            fifo.wait_value32(CH).unwrap() as i32
        },
        |core| {
            let fifo = core.fifo();
            let v = fifo.wait_value32(CH).unwrap();
            fifo.send_value32(CH, v + 1).unwrap();
            fifo.flush().unwrap();
            0
        },
    );
    assert_eq!(a, CoreExit::Exited(42));
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn wide_scalar_takes_an_extra_word() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_value32(CH, 0xFFFF_FFFF).unwrap();
            fifo.send_value32(CH, 0x01FF_FFFF).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            assert_eq!(fifo.wait_value32(CH), Ok(0xFFFF_FFFF));
            assert_eq!(fifo.wait_value32(CH), Ok(0x01FF_FFFF));
            let stats = fifo.stats();
            assert!(stats.is_conserved());
            assert_eq!(stats.free, stats.capacity);
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn ten_byte_block() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_data(CH, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            let mut buf = [0u8; MAX_DATA_BYTES];
            let len = fifo.wait_data(CH, &mut buf).unwrap();
            assert_eq!(&buf[..len], &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
            assert_eq!(fifo.check_data_len(CH), None);
            assert_eq!(fifo.get_data(CH, &mut buf), Err(RecvError::QueueEmpty));
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn address_round_trip() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            assert_eq!(fifo.send_address(CH, 0x0100_0000), Err(SendError::BadParam));
            fifo.send_address(CH, 0x0234_5678).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| core.fifo().wait_address(CH).unwrap() as i32,
    );
    assert_eq!(b, CoreExit::Exited(0x0234_5678));
}

#[test]
fn per_channel_order_is_preserved() {
    const N: u32 = 200;
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            for i in 0..N {
                // Alternate between the immediate and the two-word forms
                fifo.send_value32(ch(8), i * 0x0100_0001).unwrap();
                fifo.send_value32(ch(9), N - i).unwrap();
            }
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            for i in 0..N {
                assert_eq!(fifo.wait_value32(ch(8)), Ok(i * 0x0100_0001));
            }
            for i in 0..N {
                assert_eq!(fifo.wait_value32(ch(9)), Ok(N - i));
            }
            assert!(fifo.stats().is_conserved());
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn small_pools_apply_backpressure() {
    const N: usize = 20;
    let cfg = PlatformConfig::DEFAULT.both(CoreConfig::DEFAULT.with_pool_slots(40));
    let (a, b) = run_pair(
        cfg,
        |core| {
            let fifo = core.fifo();
            for i in 0..N {
                let block = [i as u8; MAX_DATA_BYTES];
                fifo.send_data(CH, &block).unwrap();
                assert!(fifo.stats().is_conserved());
            }
            fifo.flush().unwrap();
            assert!(!fifo.hw_error());
            0
        },
        |core| {
            let fifo = core.fifo();
            let mut buf = [0u8; MAX_DATA_BYTES];
            for i in 0..N {
                let len = fifo.wait_data(CH, &mut buf).unwrap();
                assert_eq!(len, MAX_DATA_BYTES);
                assert!(buf.iter().all(|&x| x == i as u8));
                assert!(fifo.stats().is_conserved());
            }
            let stats = fifo.stats();
            assert_eq!(stats.free, stats.capacity);
            0
        },
    );
    assert_eq!(a, CoreExit::Exited(0));
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn oversized_block_is_rejected() {
    let (a, _) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            let block = [0u8; MAX_DATA_BYTES + 1];
            assert_eq!(fifo.send_data(CH, &block), Err(SendError::BadParam));
            assert_eq!(fifo.send_special(1 << 24), Err(SendError::BadParam));
            assert_eq!(fifo.stats().staging, 0);
            0
        },
        |_| 0,
    );
    assert_eq!(a, CoreExit::Exited(0));
}

#[test]
fn handler_receives_scalars() {
    const N: u32 = 50;
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            for i in 1..=N {
                fifo.send_value32(CH, i).unwrap();
            }
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            let count = Arc::new(AtomicU32::new(0));
            let sum = Arc::new(AtomicU32::new(0));
            fifo.set_value32_handler(CH, {
                let (count, sum) = (Arc::clone(&count), Arc::clone(&sum));
                move |_, v| {
                    sum.fetch_add(v, Ordering::Relaxed);
                    count.fetch_add(1, Ordering::Relaxed);
                }
            });
            while count.load(Ordering::Relaxed) < N {
                yield_until(IrqFlags::FIFO_RECV).unwrap();
            }
            // Nothing was queued for polling
            assert!(!fifo.check_value32(CH));
            sum.load(Ordering::Relaxed) as i32
        },
    );
    assert_eq!(b, CoreExit::Exited((N * (N + 1) / 2) as i32));
}

#[test]
fn registering_a_handler_delivers_queued_messages() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            for i in 1..=3 {
                fifo.send_value32(ch(8), i).unwrap();
            }
            // Dispatched after the three values above
            fifo.send_value32(ch(9), 0).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            fifo.wait_value32(ch(9)).unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            fifo.set_value32_handler(ch(8), {
                let seen = Arc::clone(&seen);
                move |_, v| seen.lock().unwrap().push(v)
            });
            assert_eq!(*seen.lock().unwrap(), [1, 2, 3]);
            assert!(!fifo.check_value32(ch(8)));

            fifo.clear_value32_handler(ch(8));
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn data_handler_pulls_or_drops() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_data(CH, b"pulled by the handler").unwrap();
            fifo.send_data(CH, b"ignored by the handler").unwrap();
            fifo.send_value32(ch(9), 0).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            let seen = Arc::new(Mutex::new(Vec::new()));
            fifo.set_data_handler(CH, {
                let seen = Arc::clone(&seen);
                let mut first = true;
                move |fifo, len| {
                    let mut buf = [0u8; 6];
                    let copied = if first {
                        fifo.get_data(CH, &mut buf).unwrap()
                    } else {
                        0
                    };
                    first = false;
                    seen.lock().unwrap().push((len, buf[..copied].to_vec()));
                }
            });

            fifo.wait_value32(ch(9)).unwrap();
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 2);
            assert_eq!(seen[0], (21, b"pulled".to_vec()));
            assert_eq!(seen[1], (22, vec![]));

            // Neither block is left holding slots
            assert_eq!(fifo.check_data_len(CH), None);
            let stats = fifo.stats();
            assert_eq!(stats.free, stats.capacity);
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn handlers_must_not_block() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_value32(CH, 1).unwrap();
            fifo.send_value32(ch(9), 0).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| {
            let fifo = core.fifo();
            let result = Arc::new(Mutex::new(None));
            fifo.set_value32_handler(CH, {
                let result = Arc::clone(&result);
                move |fifo, _| {
                    *result.lock().unwrap() = Some(fifo.wait_value32(CH));
                }
            });
            fifo.wait_value32(ch(9)).unwrap();
            assert_eq!(*result.lock().unwrap(), Some(Err(WaitError::BadContext)));
            0
        },
    );
    assert_eq!(b, CoreExit::Exited(0));
}

#[test]
fn unknown_special_commands_are_ignored() {
    let (_, b) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            fifo.send_special(0x1234).unwrap();
            fifo.send_value32(CH, 9).unwrap();
            fifo.flush().unwrap();
            0
        },
        |core| core.fifo().wait_value32(CH).unwrap() as i32,
    );
    assert_eq!(b, CoreExit::Exited(9));
}

#[test]
fn channel_mutex_is_per_channel() {
    let (a, _) = run_pair(
        PlatformConfig::DEFAULT,
        |core| {
            let fifo = core.fifo();
            let _g = fifo.channel_mutex(ch(8)).lock();
            assert!(fifo.channel_mutex(ch(8)).try_lock().is_none());
            assert!(fifo.channel_mutex(ch(9)).try_lock().is_some());
            0
        },
        |_| 0,
    );
    assert_eq!(a, CoreExit::Exited(0));
}
