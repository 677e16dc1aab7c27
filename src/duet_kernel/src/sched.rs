//! The cooperative task list.
//!
//! [`TaskList`] implements the bookkeeping half of the scheduler: which
//! cothreads exist, which of them may run, in what order, and what becomes of
//! them when they finish. Suspending and resuming a cothread is the port's
//! business; each task carries an opaque port-defined payload `S` for that.
//!
//! The list is rooted at the *main task*, which is created together with the
//! list and can never be deleted. New tasks are appended, and a scheduling
//! pass visits tasks in list order:
//!
//! ```
//! use duet_kernel::{sched::TaskList, irq::IrqWait};
//! let mut tasks = TaskList::new("main");
//! let worker = tasks.spawn("worker", false);
//! tasks.begin_pass(IrqWait::NONE);
//! assert_eq!(tasks.next_in_pass(), Some(tasks.main()));
//! assert_eq!(tasks.next_in_pass(), Some(worker));
//! assert_eq!(tasks.next_in_pass(), None);
//! ```
use alloc::vec::Vec;
use core::{fmt, num::NonZeroU32};

use crate::{
    cfg::MIN_STACK_SIZE,
    error::{DeleteTaskError, GetExitCodeError, JoinTaskError, SpawnError},
    irq::IrqWait,
};

/// Identifies a task in a [`TaskList`]. Identifiers are never reused within
/// one list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(NonZeroU32);

impl TaskId {
    const MAIN: Self = Self(match NonZeroU32::new(1) {
        Some(x) => x,
        None => unreachable!(),
    });

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskId({})", self.0)
    }
}

/// The lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// The task hasn't returned from its entry function.
    Active,
    /// The task returned the contained exit code.
    Finished(i32),
}

/// Task control block.
pub struct TaskCb<S> {
    id: TaskId,
    state: TaskState,
    detached: bool,
    /// The interrupt sources the task is still waiting for.
    wait: IrqWait,
    /// Port-defined per-task state.
    pub payload: S,
}

impl<S> TaskCb<S> {
    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    #[inline]
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    #[inline]
    pub fn wait(&self) -> IrqWait {
        self.wait
    }

    /// Determine whether the scheduler may resume this task.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.state == TaskState::Active && self.wait.is_empty()
    }
}

impl<S> fmt::Debug for TaskCb<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskCb")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("detached", &self.detached)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

/// What [`TaskList::finish`] did with a task that returned.
#[derive(Debug)]
pub enum FinishOutcome<S> {
    /// The main task returned. The scheduling loop should end with this exit
    /// code.
    Main(i32),
    /// The task was detached, so it was removed from the list. Its payload is
    /// returned for cleanup.
    Removed(S),
    /// The exit code was retained for a later query.
    Retained,
}

/// The list of cothreads of one core.
pub struct TaskList<S> {
    tasks: Vec<TaskCb<S>>,
    next_id: u32,
    /// The index of the next task to visit in the current pass.
    cursor: usize,
}

impl<S> TaskList<S> {
    /// Construct a list holding only the main task.
    pub fn new(main_payload: S) -> Self {
        Self {
            tasks: alloc::vec![TaskCb {
                id: TaskId::MAIN,
                state: TaskState::Active,
                detached: false,
                wait: IrqWait::NONE,
                payload: main_payload,
            }],
            next_id: TaskId::MAIN.get() + 1,
            cursor: 0,
        }
    }

    #[inline]
    pub fn main(&self) -> TaskId {
        TaskId::MAIN
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Always `false`; the main task can't be removed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskCb<S>> {
        self.tasks.iter()
    }

    fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskCb<S>> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskCb<S>> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Append a new, runnable task to the list.
    pub fn spawn(&mut self, payload: S, detached: bool) -> TaskId {
        let id = TaskId(NonZeroU32::new(self.next_id).expect("task ID overflow"));
        self.next_id += 1;
        self.tasks.push(TaskCb {
            id,
            state: TaskState::Active,
            detached,
            wait: IrqWait::NONE,
            payload,
        });
        id
    }

    /// Record that `id` may not resume until every source in `wait` fires.
    pub fn set_wait(&mut self, id: TaskId, wait: IrqWait) {
        if let Some(task) = self.get_mut(id) {
            task.wait = wait;
        }
    }

    /// Cross the fired sources off every task's wait set.
    pub fn apply_fired(&mut self, fired: IrqWait) {
        if fired.is_empty() {
            return;
        }
        for task in &mut self.tasks {
            task.wait.consume(fired);
        }
    }

    /// Determine whether any task could be resumed right now.
    pub fn any_runnable(&self) -> bool {
        self.tasks.iter().any(TaskCb::is_runnable)
    }

    /// Start a scheduling pass, crediting the interrupt sources that fired
    /// since the last pass.
    pub fn begin_pass(&mut self, fired: IrqWait) {
        self.apply_fired(fired);
        self.cursor = 0;
    }

    /// Get the next runnable task of the current pass, in list order.
    ///
    /// Tasks spawned during the pass are visited in the same pass; removing
    /// a task doesn't make the pass skip or revisit any other task.
    pub fn next_in_pass(&mut self) -> Option<TaskId> {
        while let Some(task) = self.tasks.get(self.cursor) {
            self.cursor += 1;
            if task.is_runnable() {
                return Some(task.id);
            }
        }
        None
    }

    /// Record that `id` returned `exit_code` from its entry function.
    pub fn finish(&mut self, id: TaskId, exit_code: i32) -> FinishOutcome<S> {
        let Some(i) = self.position(id) else {
            // Deleted while it was returning
            return FinishOutcome::Retained;
        };
        self.tasks[i].state = TaskState::Finished(exit_code);
        if id == TaskId::MAIN {
            FinishOutcome::Main(exit_code)
        } else if self.tasks[i].detached {
            FinishOutcome::Removed(self.remove_at(i))
        } else {
            FinishOutcome::Retained
        }
    }

    /// Remove `id` from the list and return its payload.
    ///
    /// `current` is the running task, which can't delete itself. A task that
    /// hasn't finished can be deleted; the port is responsible for
    /// abandoning its execution context.
    pub fn delete(&mut self, id: TaskId, current: Option<TaskId>) -> Result<S, DeleteTaskError> {
        let i = self.position(id).ok_or(DeleteTaskError::BadId)?;
        if current == Some(id) {
            return Err(DeleteTaskError::BadContext);
        }
        if id == TaskId::MAIN {
            return Err(DeleteTaskError::BadObjectState);
        }
        Ok(self.remove_at(i))
    }

    /// Mark `id` as detached. If it has already finished, it's removed
    /// immediately and its payload is returned.
    pub fn detach(&mut self, id: TaskId) -> Result<Option<S>, JoinTaskError> {
        let i = self.position(id).ok_or(JoinTaskError::BadId)?;
        let task = &mut self.tasks[i];
        if id == TaskId::MAIN || task.detached {
            return Err(JoinTaskError::BadObjectState);
        }
        task.detached = true;
        let finished = matches!(task.state, TaskState::Finished(_));
        Ok(finished.then(|| self.remove_at(i)))
    }

    /// Determine whether `id` has finished.
    pub fn has_joined(&self, id: TaskId) -> Result<bool, JoinTaskError> {
        let task = self.get(id).ok_or(JoinTaskError::BadId)?;
        Ok(matches!(task.state, TaskState::Finished(_)))
    }

    pub fn exit_code(&self, id: TaskId) -> Result<i32, GetExitCodeError> {
        match self.get(id).ok_or(GetExitCodeError::BadId)?.state {
            TaskState::Finished(code) => Ok(code),
            TaskState::Active => Err(GetExitCodeError::BadObjectState),
        }
    }

    /// Remove every task, main task included, and return their payloads.
    /// The list is unusable afterwards.
    pub fn drain(&mut self) -> impl Iterator<Item = (TaskId, S)> + '_ {
        self.cursor = 0;
        self.tasks.drain(..).map(|t| (t.id, t.payload))
    }

    fn remove_at(&mut self, i: usize) -> S {
        if i < self.cursor {
            self.cursor -= 1;
        }
        self.tasks.remove(i).payload
    }
}

impl<S> fmt::Debug for TaskList<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.tasks).finish()
    }
}

/// Check a requested stack size.
pub const fn validate_stack_size(size: usize) -> Result<(), SpawnError> {
    if size == 0 || size % core::mem::size_of::<usize>() != 0 || size < MIN_STACK_SIZE {
        Err(SpawnError::BadParam)
    } else {
        Ok(())
    }
}
