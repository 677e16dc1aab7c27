//! The per-core state, the interrupt controller, and the scheduling loop.
use duet_kernel::{
    cfg::{CoreConfig, NUM_CHANNELS},
    fifo::{Dispatch, FifoState},
    irq::IrqWait,
    reset,
    sched::{validate_stack_size, FinishOutcome, TaskId, TaskList},
    AuxIrqFlags, CoreId, IrqFlags,
};
use spin::Mutex as SpinMutex;
use std::{
    any::Any,
    cell::{Cell, RefCell},
    mem, ops,
    panic,
    ptr,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Weak,
    },
    thread,
};

use crate::{
    comutex::Comutex,
    fifo::{Fifo, PortHandlers},
    hw::{HwPort, Link},
    threading::{self, Baton, Cancelled, Resumed, TaskEnd},
    Core, CoreExit, DeleteTaskError, GetExitCodeError, JoinTaskError, SpawnError, WaitError,
};

/// The smallest host stack given to a cothread's backing thread. Host code
/// (formatting, logging, unwinding) needs far more than a real cothread
/// stack, so the requested size is only honored above this.
const HOST_STACK_FLOOR: usize = 256 * 1024;

/// The role of a host thread.
#[derive(Clone)]
enum ThreadRole {
    Unknown,
    /// Runs the scheduling loop of the core at this address.
    Scheduler(*const CoreShared),
    /// Backs a cothread.
    Task(TaskContext),
}

#[derive(Clone)]
struct TaskContext {
    core: Arc<CoreShared>,
    id: TaskId,
    baton: Arc<Baton>,
}

thread_local! {
    /// The current thread's role. It's assigned when a thread managed by the
    /// port starts.
    static THREAD_ROLE: RefCell<ThreadRole> = RefCell::new(ThreadRole::Unknown);

    /// The nesting depth of FIFO handler calls on this thread. Handlers run
    /// in interrupt context and must not block.
    static HANDLER_DEPTH: Cell<u32> = Cell::new(0);
}

fn current_context() -> Option<TaskContext> {
    THREAD_ROLE.with(|role| match &*role.borrow() {
        ThreadRole::Task(cx) => Some(cx.clone()),
        ThreadRole::Unknown | ThreadRole::Scheduler(_) => None,
    })
}

/// Determine whether the calling thread is running a FIFO handler.
pub(crate) fn in_handler() -> bool {
    HANDLER_DEPTH.with(Cell::get) > 0
}

pub(crate) fn current_core() -> Option<Arc<CoreShared>> {
    current_context().map(|cx| cx.core)
}

/// Get the handle of the calling cothread.
pub fn current_task() -> Option<TaskId> {
    current_context().map(|cx| cx.id)
}

/// The backing memory of a cothread's stack.
#[derive(Debug)]
pub enum Stack {
    /// Use the given memory. It's owned by the task and released when the
    /// task is deleted.
    Provided(Box<[usize]>),
    /// Allocate a stack of the given size in bytes.
    Auto(usize),
}

/// Options for [`Core::spawn`].
///
/// ```
/// use duet_port_std::SpawnOptions;
/// let opts = SpawnOptions::new().stack_size(8192).detached();
/// ```
#[derive(Debug, Default)]
pub struct SpawnOptions {
    stack: Option<Stack>,
    detached: bool,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(self, stack: Stack) -> Self {
        Self {
            stack: Some(stack),
            ..self
        }
    }

    pub fn stack_size(self, size: usize) -> Self {
        self.stack(Stack::Auto(size))
    }

    /// Make the task remove itself as soon as it returns. Its exit code is
    /// discarded.
    pub fn detached(self) -> Self {
        Self {
            detached: true,
            ..self
        }
    }
}

/// The port's per-task state.
pub(crate) struct TaskSlot {
    baton: Arc<Baton>,
    thread: Option<thread::JoinHandle<()>>,
    _stack: Option<Box<[usize]>>,
}

impl TaskSlot {
    fn new(baton: Arc<Baton>, stack: Option<Box<[usize]>>) -> Self {
        Self {
            baton,
            thread: None,
            _stack: stack,
        }
    }

    /// Abandon the task and wait for its host thread to go away. The task
    /// must not be running.
    fn dispose(self) {
        self.baton.cancel();
        if let Some(thread) = self.thread {
            // The outcome was already reported through the baton
            let _ = thread.join();
        }
    }
}

/// The state protected by CPU Lock.
pub(crate) struct CpuState {
    pub(crate) tasks: TaskList<TaskSlot>,
    pub(crate) fifo: FifoState<PortHandlers>,
    /// The interrupt lines that fired since the last scheduling pass.
    pub(crate) fired: IrqWait,
}

impl CpuState {
    fn new(cfg: &CoreConfig) -> Self {
        Self {
            tasks: TaskList::new(TaskSlot::new(Arc::new(Baton::new()), None)),
            fifo: FifoState::new(cfg),
            fired: IrqWait::NONE,
        }
    }
}

/// Everything that makes up one core.
pub(crate) struct CoreShared {
    pub(crate) id: CoreId,
    pub(crate) cfg: CoreConfig,
    pub(crate) hw: HwPort,
    this: Weak<CoreShared>,
    cpu: SpinMutex<CpuState>,
    /// Interrupt master enable
    ime: AtomicBool,
    soft_pending: AtomicU32,
    soft_pending_aux: AtomicU32,
    running: AtomicBool,
    halted: AtomicBool,
    exit: SpinMutex<Option<CoreExit>>,
    pub(crate) comutexes: [Comutex; NUM_CHANNELS],
}

/// RAII guard for CPU Lock. Pending interrupts are taken when it's dropped.
///
/// If one of those interrupts makes the core halt, dropping the guard on a
/// cothread of that core unwinds the cothread.
pub(crate) struct CpuLockGuard<'a> {
    core: &'a CoreShared,
    guard: Option<spin::MutexGuard<'a, CpuState>>,
}

impl ops::Deref for CpuLockGuard<'_> {
    type Target = CpuState;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.guard.as_ref().expect("released guard")
    }
}

impl ops::DerefMut for CpuLockGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_mut().expect("released guard")
    }
}

impl Drop for CpuLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        if self.core.is_own_thread() {
            self.core.service_interrupts();
            // A core that accepted a reset runs no more cothread code
            if self.core.is_halted() && self.core.is_current() && !thread::panicking() {
                log::trace!("{:?}: unwinding the interrupted cothread", self.core.id);
                panic::resume_unwind(Box::new(Cancelled));
            }
        }
    }
}

impl CoreShared {
    pub(crate) fn new(id: CoreId, cfg: CoreConfig, link: Arc<Link>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id,
            cfg,
            hw: HwPort::new(link, id),
            this: this.clone(),
            cpu: SpinMutex::new(CpuState::new(&cfg)),
            ime: AtomicBool::new(false),
            soft_pending: AtomicU32::new(0),
            soft_pending_aux: AtomicU32::new(0),
            running: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            exit: SpinMutex::new(None),
            comutexes: Default::default(),
        })
    }

    /// Activate CPU Lock.
    pub(crate) fn lock_cpu(&self) -> CpuLockGuard<'_> {
        CpuLockGuard {
            core: self,
            guard: Some(self.cpu.lock()),
        }
    }

    fn arc(&self) -> Arc<Self> {
        self.this.upgrade().expect("core dropped while in use")
    }

    pub(crate) fn fifo_handle(&self) -> Fifo {
        Fifo::new(self.arc())
    }

    /// Determine whether the calling thread is one of this core's threads.
    fn is_own_thread(&self) -> bool {
        THREAD_ROLE.with(|role| match &*role.borrow() {
            ThreadRole::Scheduler(core) => ptr::eq(*core, self),
            ThreadRole::Task(cx) => ptr::eq(Arc::as_ptr(&cx.core), self),
            ThreadRole::Unknown => false,
        })
    }

    /// Determine whether the caller is a cothread of this core.
    pub(crate) fn is_current(&self) -> bool {
        current_context().map_or(false, |cx| ptr::eq(Arc::as_ptr(&cx.core), self))
    }

    #[inline]
    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stop the scheduling loop. The first exit reason recorded wins.
    pub(crate) fn halt(&self, exit: CoreExit) {
        let mut slot = self.exit.lock();
        if slot.is_none() {
            log::debug!("{:?}: halting with {exit:?}", self.id);
            *slot = Some(exit);
        }
        self.halted.store(true, Ordering::Release);
        drop(slot);
        self.hw.doorbell().ring();
    }

    // Interrupt controller
    // ---------------------------------------------------------------------

    /// Pend interrupt lines of the main bank and wake the core.
    pub(crate) fn pend(&self, flags: IrqFlags) {
        self.soft_pending.fetch_or(flags.bits(), Ordering::AcqRel);
        self.hw.doorbell().ring();
    }

    fn has_pending_lines(&self) -> bool {
        self.is_halted()
            || self.soft_pending.load(Ordering::Acquire) != 0
            || self.soft_pending_aux.load(Ordering::Acquire) != 0
            || !self.hw.fifo_levels().is_empty()
    }

    /// Sample and acknowledge the pending interrupt lines, crediting them to
    /// the accumulated pending mask.
    fn take_pending_lines(&self) -> IrqWait {
        let main = self.hw.fifo_levels()
            | IrqFlags::from_bits_retain(self.soft_pending.swap(0, Ordering::AcqRel));
        let aux = AuxIrqFlags::from_bits_retain(self.soft_pending_aux.swap(0, Ordering::AcqRel));
        let lines = IrqWait { main, aux };
        if !lines.is_empty() {
            let mut cpu = self.cpu.lock();
            cpu.fired.main |= main;
            cpu.fired.aux |= aux;
        }
        lines
    }

    /// Take every pending interrupt if IME is set. IME is cleared while the
    /// handlers run, so a nested call does nothing unless a handler set it
    /// again. A halted core takes no more interrupts; words still in the
    /// hardware are left for the next boot.
    pub(crate) fn service_interrupts(&self) {
        while !self.is_halted()
            && self
                .ime
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let lines = self.take_pending_lines();
            if lines.is_empty() {
                self.ime.store(true, Ordering::Release);
                return;
            }
            log::trace!("{:?}: servicing {lines:?}", self.id);

            if lines.main.contains(IrqFlags::FIFO_SEND) {
                self.cpu.lock().fifo.drain_tx(&self.hw);
            }
            if lines.main.contains(IrqFlags::FIFO_RECV) {
                self.recv_isr();
            }

            self.ime.store(true, Ordering::Release);
        }
    }

    fn recv_isr(&self) {
        {
            let mut cpu = self.cpu.lock();
            cpu.fifo.pull_rx(&self.hw);
            if !cpu.fifo.begin_dispatch() {
                // The outer invocation will get to the new words
                return;
            }
        }
        self.dispatch_pass();
    }

    /// Classify and route complete messages until the reassembly queue runs
    /// dry. The dispatch guard must be held on entry; it's released on exit.
    pub(crate) fn dispatch_pass(&self) {
        let fifo = self.fifo_handle();
        loop {
            let mut cpu = self.cpu.lock();
            if self.is_halted() {
                cpu.fifo.end_dispatch();
                return;
            }
            match cpu.fifo.dispatch_next() {
                Dispatch::Idle | Dispatch::Incomplete => {
                    cpu.fifo.end_dispatch();
                    cpu.fifo.unstall(&self.hw);
                    return;
                }
                Dispatch::Dropped => {}
                Dispatch::Queued => {
                    // Wake up pollers even if the line fired for a different
                    // message
                    cpu.fired.main |= IrqFlags::FIFO_RECV;
                }
                Dispatch::Address {
                    channel,
                    address,
                    mut handler,
                } => {
                    drop(cpu);
                    self.call_handler(|| handler(&fifo, address));
                    let mut cpu = self.cpu.lock();
                    cpu.fifo.channel_mut(channel).address.give_back(handler);
                    cpu.fifo.unstall(&self.hw);
                }
                Dispatch::Value32 {
                    channel,
                    value,
                    mut handler,
                } => {
                    drop(cpu);
                    self.call_handler(|| handler(&fifo, value));
                    let mut cpu = self.cpu.lock();
                    cpu.fifo.channel_mut(channel).value32.give_back(handler);
                    cpu.fifo.unstall(&self.hw);
                }
                Dispatch::Data {
                    channel,
                    len,
                    mark,
                    mut handler,
                } => {
                    drop(cpu);
                    self.call_handler(|| handler(&fifo, len));
                    let mut cpu = self.cpu.lock();
                    if cpu.fifo.discard_data_if_head(channel, mark) {
                        log::trace!("{:?}: discarded unread data on {channel:?}", self.id);
                    }
                    cpu.fifo.channel_mut(channel).data.give_back(handler);
                    cpu.fifo.unstall(&self.hw);
                }
                Dispatch::Special { code } => match reset::classify(self.id, code) {
                    Some(action) => {
                        cpu.fifo.end_dispatch();
                        drop(cpu);
                        self.accept_reset(action);
                        return;
                    }
                    None => log::warn!("{:?}: ignoring special command {code:#x}", self.id),
                },
            }
        }
    }

    /// Call a FIFO handler with interrupts enabled so that words keep flowing
    /// into the reassembly queue while it runs.
    pub(crate) fn call_handler<R>(&self, f: impl FnOnce() -> R) -> R {
        HANDLER_DEPTH.with(|d| d.set(d.get() + 1));
        let ime = self.ime.swap(true, Ordering::AcqRel);
        let result = f();
        self.ime.store(ime, Ordering::Release);
        HANDLER_DEPTH.with(|d| d.set(d.get() - 1));
        result
    }

    // Scheduling loop
    // ---------------------------------------------------------------------

    fn schedule(&self) -> Result<CoreExit, Box<dyn Any + Send>> {
        loop {
            self.service_interrupts();
            if let Some(exit) = self.take_exit() {
                return Ok(exit);
            }

            let mut progressed = false;
            {
                let mut cpu = self.cpu.lock();
                let fired = mem::take(&mut cpu.fired);
                cpu.tasks.begin_pass(fired);
            }

            loop {
                let next = {
                    let mut cpu = self.cpu.lock();
                    cpu.tasks.next_in_pass().and_then(|id| {
                        let baton = Arc::clone(&cpu.tasks.get(id)?.payload.baton);
                        Some((id, baton))
                    })
                };
                let Some((id, baton)) = next else { break };
                progressed = true;

                log::trace!("{:?}: resuming {id:?}", self.id);
                match baton.resume() {
                    Resumed::Yielded => {}
                    Resumed::Ended(TaskEnd::Returned(code)) => self.on_task_returned(id, code),
                    Resumed::Ended(TaskEnd::Cancelled) => self.on_task_unwound(id),
                    Resumed::Ended(TaskEnd::Panicked(payload)) => return Err(payload),
                }

                self.service_interrupts();
                if self.is_halted() {
                    break;
                }
            }

            if !progressed {
                // Refresh the pending mask before deciding to sleep. A line
                // that fired after the pass began would otherwise be missed.
                let runnable = {
                    let mut cpu = self.cpu.lock();
                    let fired = mem::take(&mut cpu.fired);
                    cpu.tasks.apply_fired(fired);
                    cpu.tasks.any_runnable()
                };
                if !runnable {
                    log::trace!("{:?}: waiting for an interrupt", self.id);
                    self.hw.doorbell().wait(|| self.has_pending_lines());
                }
            }
        }
    }

    fn take_exit(&self) -> Option<CoreExit> {
        if self.is_halted() {
            *self.exit.lock()
        } else {
            None
        }
    }

    fn on_task_returned(&self, id: TaskId, code: i32) {
        let outcome = self.cpu.lock().tasks.finish(id, code);
        match outcome {
            FinishOutcome::Main(code) => {
                log::debug!("{:?}: main task returned {code}", self.id);
                self.halt(CoreExit::Exited(code));
            }
            FinishOutcome::Removed(slot) => {
                log::debug!("{:?}: detached {id:?} returned {code}", self.id);
                slot.dispose();
            }
            FinishOutcome::Retained => {
                log::debug!("{:?}: {id:?} returned {code}", self.id);
            }
        }
    }

    /// Forget a cothread that unwound without being deleted. The main task
    /// only unwinds when the core is halting, so it's left for the teardown.
    fn on_task_unwound(&self, id: TaskId) {
        log::trace!("{:?}: {id:?} unwound", self.id);
        let removed = self.cpu.lock().tasks.delete(id, None);
        if let Ok(slot) = removed {
            slot.dispose();
        }
    }

    /// Cancel every cothread and return the core to its power-on state.
    fn teardown(&self) {
        self.ime.store(false, Ordering::Release);
        let tasks: Vec<TaskSlot> = {
            let mut cpu = self.cpu.lock();
            let tasks: Vec<TaskSlot> = cpu.tasks.drain().map(|(_, slot)| slot).collect();
            *cpu = CpuState::new(&self.cfg);
            tasks
        };
        log::debug!("{:?}: tearing down {} cothread(s)", self.id, tasks.len());
        for slot in tasks {
            slot.dispose();
        }
        self.soft_pending.store(0, Ordering::Release);
        self.soft_pending_aux.store(0, Ordering::Release);
        *self.exit.lock() = None;
        self.halted.store(false, Ordering::Release);
    }

    /// Start the host thread of a cothread that's already in the task list.
    fn start_thread(
        &self,
        id: TaskId,
        baton: Arc<Baton>,
        stack_size: usize,
        entry: Box<dyn FnOnce() -> i32 + Send>,
    ) -> Result<(), SpawnError> {
        let cx = TaskContext {
            core: self.arc(),
            id,
            baton: Arc::clone(&baton),
        };
        let result = threading::spawn(
            format!("core {:?} {id:?}", self.id),
            stack_size.max(HOST_STACK_FLOOR),
            Arc::clone(&baton),
            move || THREAD_ROLE.with(|role| *role.borrow_mut() = ThreadRole::Task(cx)),
            entry,
        );

        match result {
            Ok(thread) => {
                if let Some(task) = self.lock_cpu().tasks.get_mut(id) {
                    task.payload.thread = Some(thread);
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("{:?}: failed to start a host thread for {id:?}: {e}", self.id);
                baton.finish(TaskEnd::Cancelled);
                let _ = self.lock_cpu().tasks.delete(id, None);
                Err(SpawnError::NotSupported)
            }
        }
    }
}

/// Suspend the calling cothread until the scheduler resumes it, having
/// waited for `wait` first.
fn suspend(wait: IrqWait) -> Result<(), WaitError> {
    let cx = current_context().ok_or(WaitError::BadContext)?;
    if in_handler() || thread::panicking() {
        return Err(WaitError::BadContext);
    }
    if cx.core.is_halted() {
        panic::resume_unwind(Box::new(Cancelled));
    }

    cx.core.lock_cpu().tasks.set_wait(cx.id, wait);

    if cx.baton.suspend().is_err() {
        log::trace!("{:?}: {:?} cancelled", cx.core.id, cx.id);
        panic::resume_unwind(Box::new(Cancelled));
    }
    Ok(())
}

/// Yield the processor to other cothreads of the same core.
///
/// Does nothing when called outside a cothread or from a FIFO handler.
pub fn yield_now() {
    let _ = suspend(IrqWait::NONE);
}

/// Yield until every interrupt source in `flags` has fired at least once.
pub fn yield_until(flags: IrqFlags) -> Result<(), WaitError> {
    suspend(IrqWait {
        main: flags,
        aux: AuxIrqFlags::empty(),
    })
}

/// Yield until every source of the auxiliary interrupt bank in `flags` has
/// fired at least once. The auxiliary bank only exists on core B.
pub fn yield_until_aux(flags: AuxIrqFlags) -> Result<(), WaitError> {
    let cx = current_context().ok_or(WaitError::BadContext)?;
    if cx.core.id != CoreId::B {
        return Err(WaitError::NotSupported);
    }
    suspend(IrqWait {
        main: IrqFlags::empty(),
        aux: flags,
    })
}

impl Core {
    /// Run the scheduling loop on the calling thread until the main task
    /// returns or the core accepts a reset request. All remaining cothreads
    /// are cancelled before this returns, and the core is left in its
    /// power-on state, ready to be run again.
    ///
    /// # Panics
    ///
    /// Panics if the core is already running, or propagates the panic of a
    /// cothread.
    pub fn run(&self, main: impl FnOnce() -> i32 + Send + 'static) -> CoreExit {
        let shared = &*self.shared;
        assert!(
            !shared.running.swap(true, Ordering::AcqRel),
            "{:?} is already running",
            shared.id
        );
        THREAD_ROLE.with(|role| *role.borrow_mut() = ThreadRole::Scheduler(shared));
        log::debug!("{:?}: booting", shared.id);

        let baton = Arc::new(Baton::new());
        let main_id = {
            let mut cpu = shared.cpu.lock();
            cpu.fifo.init_hw(&shared.hw);
            let main_id = cpu.tasks.main();
            if let Some(task) = cpu.tasks.get_mut(main_id) {
                task.payload = TaskSlot::new(Arc::clone(&baton), None);
            }
            main_id
        };
        shared
            .start_thread(main_id, baton, shared.cfg.default_stack_size(), Box::new(main))
            .expect("failed to start the main cothread");

        shared.ime.store(true, Ordering::Release);
        let result = shared.schedule();
        shared.teardown();

        THREAD_ROLE.with(|role| *role.borrow_mut() = ThreadRole::Unknown);
        shared.running.store(false, Ordering::Release);

        match result {
            Ok(exit) => {
                log::debug!("{:?}: exited with {exit:?}", shared.id);
                exit
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Create a cothread. It's appended to the task list and first runs in
    /// the scheduling pass that reaches it.
    pub fn spawn(
        &self,
        options: SpawnOptions,
        entry: impl FnOnce() -> i32 + Send + 'static,
    ) -> Result<TaskId, SpawnError> {
        let shared = &*self.shared;
        let (stack_size, stack) = match options.stack {
            None => (shared.cfg.default_stack_size(), None),
            Some(Stack::Auto(size)) => (size, None),
            Some(Stack::Provided(memory)) => (mem::size_of_val(&*memory), Some(memory)),
        };
        validate_stack_size(stack_size)?;

        let baton = Arc::new(Baton::new());
        let id = shared
            .lock_cpu()
            .tasks
            .spawn(TaskSlot::new(Arc::clone(&baton), stack), options.detached);
        shared.start_thread(id, baton, stack_size, Box::new(entry))?;

        log::debug!("{:?}: spawned {id:?} ({stack_size} byte stack)", shared.id);
        shared.hw.doorbell().ring();
        Ok(id)
    }

    /// Delete a task, cancelling it if it hasn't finished. Must be called by
    /// another cothread of the same core.
    pub fn delete_task(&self, id: TaskId) -> Result<(), DeleteTaskError> {
        let shared = &*self.shared;
        let current = current_context()
            .filter(|cx| Arc::ptr_eq(&cx.core, &self.shared))
            .ok_or(DeleteTaskError::BadContext)?
            .id;
        let slot = shared.lock_cpu().tasks.delete(id, Some(current))?;
        log::debug!("{:?}: deleting {id:?}", shared.id);
        slot.dispose();
        Ok(())
    }

    /// Make a task release its resources as soon as it finishes. A task that
    /// has already finished is released immediately.
    pub fn detach_task(&self, id: TaskId) -> Result<(), JoinTaskError> {
        let slot = self.shared.lock_cpu().tasks.detach(id)?;
        if let Some(slot) = slot {
            slot.dispose();
        }
        Ok(())
    }

    /// Determine whether a task has finished.
    pub fn has_joined(&self, id: TaskId) -> Result<bool, JoinTaskError> {
        self.shared.lock_cpu().tasks.has_joined(id)
    }

    /// Get the exit code of a finished, non-detached task.
    pub fn exit_code(&self, id: TaskId) -> Result<i32, GetExitCodeError> {
        self.shared.lock_cpu().tasks.exit_code(id)
    }

    /// Get the number of tasks in the task list, the main task included.
    pub fn num_tasks(&self) -> usize {
        self.shared.lock_cpu().tasks.len()
    }

    /// Pend interrupt lines of the main bank. This can be called from any
    /// thread and wakes the core if it's waiting for an interrupt.
    pub fn pend_interrupt(&self, flags: IrqFlags) {
        self.shared.pend(flags);
    }

    /// Pend interrupt lines of the auxiliary bank, which only exists on
    /// core B.
    pub fn pend_aux_interrupt(&self, flags: AuxIrqFlags) -> Result<(), WaitError> {
        if self.shared.id != CoreId::B {
            return Err(WaitError::NotSupported);
        }
        self.shared
            .soft_pending_aux
            .fetch_or(flags.bits(), Ordering::AcqRel);
        self.shared.hw.doorbell().ring();
        Ok(())
    }
}
