use duet_port_std::{
    current_task, yield_now, yield_until, yield_until_aux, AuxIrqFlags, Channel, Core, CoreExit,
    CoreId, DeleteTaskError, GetExitCodeError, IrqFlags, JoinTaskError, SpawnError,
    SpawnOptions, Stack, TaskId, WaitError,
};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use crate::run_single;

fn wait_joined(core: &Core, tasks: &[TaskId]) {
    while !tasks.iter().all(|&t| core.has_joined(t).unwrap()) {
        yield_now();
    }
}

#[test]
fn round_robin_in_list_order() {
    let exit = run_single(CoreId::A, |core| {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tasks: Vec<TaskId> = (1..=3)
            .map(|i| {
                let log = Arc::clone(&log);
                core.spawn(SpawnOptions::new(), move || {
                    for _ in 0..5 {
                        log.lock().unwrap().push(i);
                        yield_now();
                    }
                    i * 10
                })
                .unwrap()
            })
            .collect();

        wait_joined(&core, &tasks);

        assert_eq!(*log.lock().unwrap(), [1, 2, 3].repeat(5));
        for (i, &t) in tasks.iter().enumerate() {
            assert_eq!(core.exit_code(t), Ok((i as i32 + 1) * 10));
        }
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
}

#[test]
fn main_task_exit_code_ends_the_core() {
    let exit = run_single(CoreId::B, |core| {
        // Left running; cancelled when the core exits
        core.spawn(SpawnOptions::new(), || loop {
            yield_now();
        })
        .unwrap();
        yield_now();
        -3
    });
    assert_eq!(exit, CoreExit::Exited(-3));
}

#[test]
fn task_lifecycle_errors() {
    let exit = run_single(CoreId::A, |core| {
        let main = current_task().unwrap();

        let looping = core
            .spawn(SpawnOptions::new(), || loop {
                yield_now();
            })
            .unwrap();
        assert_eq!(core.exit_code(looping), Err(GetExitCodeError::BadObjectState));
        assert_eq!(core.has_joined(looping), Ok(false));
        yield_now();

        assert_eq!(core.delete_task(main), Err(DeleteTaskError::BadContext));
        assert_eq!(core.delete_task(looping), Ok(()));
        assert_eq!(core.delete_task(looping), Err(DeleteTaskError::BadId));
        assert_eq!(core.has_joined(looping), Err(JoinTaskError::BadId));
        assert_eq!(core.detach_task(main), Err(JoinTaskError::BadObjectState));

        // A task deleting the main task
        let result = Arc::new(Mutex::new(None));
        let t = core
            .spawn(SpawnOptions::new(), {
                let (core, result) = (core.clone(), Arc::clone(&result));
                move || {
                    *result.lock().unwrap() = Some(core.delete_task(main));
                    0
                }
            })
            .unwrap();
        wait_joined(&core, &[t]);
        assert_eq!(*result.lock().unwrap(), Some(Err(DeleteTaskError::BadObjectState)));
        assert_eq!(core.delete_task(t), Ok(()));

        // Detached tasks remove themselves
        let before = core.num_tasks();
        let t = core
            .spawn(SpawnOptions::new().detached(), || 5)
            .unwrap();
        assert_eq!(core.num_tasks(), before + 1);
        yield_now();
        assert_eq!(core.num_tasks(), before);
        assert_eq!(core.has_joined(t), Err(JoinTaskError::BadId));

        // Detaching a finished task releases it
        let t = core.spawn(SpawnOptions::new(), || 6).unwrap();
        wait_joined(&core, &[t]);
        assert_eq!(core.detach_task(t), Ok(()));
        assert_eq!(core.exit_code(t), Err(GetExitCodeError::BadId));
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
}

#[test]
fn stack_validation() {
    let exit = run_single(CoreId::A, |core| {
        let spawn = |options| core.spawn(options, || 0);
        assert_eq!(
            spawn(SpawnOptions::new().stack_size(0)),
            Err(SpawnError::BadParam)
        );
        assert_eq!(
            spawn(SpawnOptions::new().stack_size(128)),
            Err(SpawnError::BadParam)
        );
        assert_eq!(
            spawn(SpawnOptions::new().stack_size(1001)),
            Err(SpawnError::BadParam)
        );
        let t = spawn(SpawnOptions::new().stack(Stack::Provided(vec![0; 128].into_boxed_slice())))
            .unwrap();
        let u = spawn(SpawnOptions::new().stack_size(8192)).unwrap();
        wait_joined(&core, &[t, u]);
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
}

#[test]
fn comutex_serializes_across_yields() {
    let exit = run_single(CoreId::A, |core| {
        let counter = Arc::new(AtomicU32::new(0));
        let mutex_ch = Channel::USER_FIRST;
        let tasks: Vec<TaskId> = (0..3)
            .map(|_| {
                let (core, counter) = (core.clone(), Arc::clone(&counter));
                core.clone()
                    .spawn(SpawnOptions::new(), move || {
                        let fifo = core.fifo();
                        for _ in 0..10 {
                            let _guard = fifo.channel_mutex(mutex_ch).lock();
                            // A non-atomic update split by yields
                            let x = counter.load(Ordering::Relaxed);
                            yield_now();
                            yield_now();
                            counter.store(x + 1, Ordering::Relaxed);
                        }
                        0
                    })
                    .unwrap()
            })
            .collect();
        wait_joined(&core, &tasks);
        counter.load(Ordering::Relaxed) as i32
    });
    assert_eq!(exit, CoreExit::Exited(30));
}

#[test]
fn blocking_outside_a_cothread() {
    assert_eq!(yield_until(IrqFlags::VBLANK), Err(WaitError::BadContext));
    assert_eq!(current_task(), None);
    assert!(Core::current().is_none());
    // Does nothing
    yield_now();
}

#[test]
fn aux_bank_is_core_b_only() {
    let exit = run_single(CoreId::A, |core| {
        assert_eq!(yield_until_aux(AuxIrqFlags::WIFI), Err(WaitError::NotSupported));
        assert_eq!(
            core.pend_aux_interrupt(AuxIrqFlags::WIFI),
            Err(WaitError::NotSupported)
        );
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
}

#[test]
fn external_interrupts_wake_waiting_tasks() {
    let exit = run_single(CoreId::B, |core| {
        let done = Arc::new(AtomicBool::new(false));
        let pender = thread::spawn({
            let (core, done) = (core.clone(), Arc::clone(&done));
            move || {
                thread::sleep(Duration::from_millis(20));
                core.pend_interrupt(IrqFlags::TIMER0);
                while !done.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(5));
                    core.pend_aux_interrupt(AuxIrqFlags::WIFI).unwrap();
                }
            }
        });

        yield_until(IrqFlags::TIMER0).unwrap();
        yield_until_aux(AuxIrqFlags::WIFI).unwrap();
        done.store(true, Ordering::Release);
        pender.join().unwrap();
        assert_eq!(Core::current().map(|c| c.id()), Some(CoreId::B));
        0
    });
    assert_eq!(exit, CoreExit::Exited(0));
}

#[test]
fn tasks_can_spawn_from_any_thread() {
    let exit = run_single(CoreId::A, |core| {
        let spawned = thread::spawn({
            let core = core.clone();
            move || core.spawn(SpawnOptions::new(), || 7).unwrap()
        })
        .join()
        .unwrap();
        wait_joined(&core, &[spawned]);
        core.exit_code(spawned).unwrap()
    });
    assert_eq!(exit, CoreExit::Exited(7));
}

#[test]
#[should_panic(expected = "task failure")]
fn task_panics_propagate() {
    run_single(CoreId::A, |core| {
        core.spawn(SpawnOptions::new(), || panic!("task failure"))
            .unwrap();
        loop {
            yield_now();
        }
    });
}
