//! Boots both cores of a simulated platform and checks end-to-end behavior.
use duet_port_std::{Core, CoreExit, CoreId, Platform, PlatformConfig};
use std::{
    panic,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

mod platform_tests {
    pub mod messaging;
    pub mod reset;
    pub mod scheduling;
}

const TIMEOUT: Duration = Duration::from_secs(30);

fn join<T>(thread: JoinHandle<T>, deadline: Instant) -> T {
    while !thread.is_finished() {
        if Instant::now() > deadline {
            panic!("The platform deadlocked");
        }
        thread::sleep(Duration::from_millis(1));
    }
    match thread.join() {
        Ok(x) => x,
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Run both cores to completion, passing each main task a handle to its own
/// core.
pub fn run_pair(
    cfg: PlatformConfig,
    a_main: impl FnOnce(Core) -> i32 + Send + 'static,
    b_main: impl FnOnce(Core) -> i32 + Send + 'static,
) -> (CoreExit, CoreExit) {
    let _ = env_logger::try_init();

    let platform = Platform::new(cfg);
    let a = platform.core(CoreId::A);
    let b = platform.core(CoreId::B);
    let a = platform.spawn_core(CoreId::A, move || a_main(a));
    let b = platform.spawn_core(CoreId::B, move || b_main(b));

    let deadline = Instant::now() + TIMEOUT;
    let a = join(a, deadline);
    let b = join(b, deadline);
    (a, b)
}

/// Run one core of a fresh platform to completion. The other core stays off.
pub fn run_single(id: CoreId, main: impl FnOnce(Core) -> i32 + Send + 'static) -> CoreExit {
    let _ = env_logger::try_init();

    let platform = Platform::new(PlatformConfig::DEFAULT);
    let core = platform.core(id);
    let thread = platform.spawn_core(id, move || main(core));
    join(thread, Instant::now() + TIMEOUT)
}
