//! Cothread context switching on host threads.
//!
//! Every cothread is backed by a host thread. A [`Baton`] shared by the
//! scheduler and one cothread decides which of the two may run; the other
//! one is blocked on the baton's condition variable. Because the scheduler
//! only hands out one baton at a time, at most one cothread per core makes
//! progress at any instant, which is all the cooperative model needs.
//!
//! A suspended cothread can be *cancelled*. Its pending [`Baton::suspend`]
//! then returns `Err(Cancelled)`, and the caller unwinds the host thread with
//! [`Cancelled`] as the payload.
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Condvar, Mutex, MutexGuard},
    thread,
};

/// The unwinding payload used to abandon a cothread.
#[derive(Debug)]
pub(crate) struct Cancelled;

/// How a cothread's host thread ended.
#[derive(Debug)]
pub(crate) enum TaskEnd {
    /// The entry function returned this exit code.
    Returned(i32),
    /// The cothread was cancelled.
    Cancelled,
    /// The entry function panicked.
    Panicked(Box<dyn Any + Send>),
}

#[derive(Debug)]
enum Turn {
    /// The scheduler runs; the cothread is suspended or not started.
    Scheduler,
    /// The cothread runs; the scheduler waits.
    Task,
    /// The cothread has been told to unwind.
    Cancel,
    /// The host thread finished.
    Done(Option<TaskEnd>),
}

/// What [`Baton::resume`] observed when control came back.
#[derive(Debug)]
pub(crate) enum Resumed {
    Yielded,
    Ended(TaskEnd),
}

#[derive(Debug)]
pub(crate) struct Baton {
    turn: Mutex<Turn>,
    cv: Condvar,
}

impl Baton {
    pub(crate) fn new() -> Self {
        Self {
            turn: Mutex::new(Turn::Scheduler),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Turn> {
        self.turn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, Turn>,
        mut cond: impl FnMut(&Turn) -> bool,
    ) -> MutexGuard<'a, Turn> {
        self.cv
            .wait_while(guard, |turn| cond(turn))
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Scheduler side: let the cothread run until it yields or ends.
    pub(crate) fn resume(&self) -> Resumed {
        let mut turn = self.lock();
        if let Turn::Done(end) = &mut *turn {
            return Resumed::Ended(end.take().unwrap_or(TaskEnd::Cancelled));
        }
        assert!(
            matches!(*turn, Turn::Scheduler),
            "resumed a running cothread"
        );
        *turn = Turn::Task;
        self.cv.notify_all();

        let mut turn = self.wait_while(turn, |t| matches!(t, Turn::Task));
        match &mut *turn {
            Turn::Scheduler => Resumed::Yielded,
            Turn::Done(end) => Resumed::Ended(end.take().unwrap_or(TaskEnd::Cancelled)),
            Turn::Task | Turn::Cancel => unreachable!(),
        }
    }

    /// Cothread side: give control back to the scheduler and wait for the
    /// next turn.
    pub(crate) fn suspend(&self) -> Result<(), Cancelled> {
        let mut turn = self.lock();
        *turn = Turn::Scheduler;
        self.cv.notify_all();
        self.wait_for_turn(turn)
    }

    /// Cothread side: wait for the first turn.
    pub(crate) fn start(&self) -> Result<(), Cancelled> {
        let turn = self.lock();
        self.wait_for_turn(turn)
    }

    fn wait_for_turn(&self, turn: MutexGuard<'_, Turn>) -> Result<(), Cancelled> {
        let turn = self.wait_while(turn, |t| matches!(t, Turn::Scheduler));
        match &*turn {
            Turn::Task => Ok(()),
            Turn::Cancel => Err(Cancelled),
            Turn::Scheduler | Turn::Done(_) => unreachable!(),
        }
    }

    /// Report the end of the host thread. Doesn't block.
    pub(crate) fn finish(&self, end: TaskEnd) {
        *self.lock() = Turn::Done(Some(end));
        self.cv.notify_all();
    }

    /// Tell a suspended (or never started) cothread to unwind. The caller
    /// should join the host thread afterwards.
    pub(crate) fn cancel(&self) {
        let mut turn = self.lock();
        if matches!(*turn, Turn::Scheduler) {
            *turn = Turn::Cancel;
            self.cv.notify_all();
        }
    }
}

/// Start the host thread backing a cothread. The thread waits for its first
/// turn on `baton` before calling `entry`, and reports how it ended through
/// `baton`.
pub(crate) fn spawn(
    name: String,
    stack_size: usize,
    baton: std::sync::Arc<Baton>,
    init: impl FnOnce() + Send + 'static,
    entry: Box<dyn FnOnce() -> i32 + Send>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .stack_size(stack_size)
        .spawn(move || {
            init();
            let end = match baton.start() {
                Err(Cancelled) => TaskEnd::Cancelled,
                Ok(()) => match panic::catch_unwind(AssertUnwindSafe(entry)) {
                    Ok(code) => TaskEnd::Returned(code),
                    Err(payload) if payload.is::<Cancelled>() => TaskEnd::Cancelled,
                    Err(payload) => TaskEnd::Panicked(payload),
                },
            };
            log::trace!("host thread of {:?} ending with {end:?}", thread::current().name());
            baton.finish(end);
        })
}
