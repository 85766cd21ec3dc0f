//! Cross-queue dispatch.
//!
//! Every [`Queue`] resolves to one process-wide serial executor: a named
//! worker thread draining a FIFO mailbox and a set of pending timers. The
//! executor is started the first time a [`Scheduler`] for its queue is
//! constructed and lives for the rest of the process.
//!
//! Work handed to the same queue runs in the order it was submitted. Timers
//! fire no earlier than their deadline and can be cancelled with the
//! [`TimerToken`] returned when they were scheduled.

use std::{
    cell::Cell,
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{atomic::AtomicU64, LazyLock},
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::ScheduleError;

/// The logical execution queues work can be routed to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Queue {
    /// The primary queue. Use it for anything with UI affinity.
    Main,
    Background,
}

impl Queue {
    pub const fn label(self) -> &'static str {
        match self {
            Queue::Main => "main",
            Queue::Background => "background",
        }
    }

    /// The queue whose executor is running the calling code, if any.
    pub fn current() -> Option<Queue> {
        CURRENT_QUEUE.with(|current| current.get())
    }

    /// Whether the calling code is running on this queue.
    pub fn is_current(self) -> bool {
        Self::current() == Some(self)
    }

    fn executor(self) -> &'static Executor {
        match self {
            Queue::Main => &*MAIN_EXECUTOR,
            Queue::Background => &*BACKGROUND_EXECUTOR,
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

thread_local! {
    static CURRENT_QUEUE: Cell<Option<Queue>> = const { Cell::new(None) };
}

static MAIN_EXECUTOR: LazyLock<Executor> = LazyLock::new(|| Executor::start(Queue::Main));
static BACKGROUND_EXECUTOR: LazyLock<Executor> =
    LazyLock::new(|| Executor::start(Queue::Background));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

impl TimerToken {
    /// A token that does not correspond to any timer.
    pub const INVALID: TimerToken = TimerToken(0);

    /// Create a new token.
    pub fn next() -> TimerToken {
        static TIMER_COUNTER: AtomicU64 = AtomicU64::new(1);
        TimerToken(TIMER_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }

    /// Get the raw value for a token.
    pub const fn into_raw(self) -> u64 {
        self.0
    }
}

type Task = Box<dyn FnOnce() + Send>;

struct Timer {
    token: TimerToken,
    action: Box<dyn FnOnce(TimerToken) + Send>,
    /// `None` when the deadline lies past what `Instant` can represent; such
    /// a timer stays pending until cancelled.
    deadline: Option<Instant>,
}

enum Command {
    Run(Task),
    RequestTimer(Timer),
    CancelTimer(TimerToken),
}

/// Handle to the mailbox of a queue's worker thread.
struct Executor {
    queue: Queue,
    sender: Option<Sender<Command>>,
}

impl Executor {
    fn start(queue: Queue) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let spawned = thread::Builder::new()
            .name(format!("signal-kit-{}", queue.label()))
            .spawn(move || Worker::new(queue).run(receiver));

        match spawned {
            Ok(_) => {
                tracing::debug!(%queue, "queue executor started");
                Self {
                    queue,
                    sender: Some(sender),
                }
            }
            Err(err) => {
                tracing::warn!(%queue, error = %err, "failed to spawn queue executor");
                Self {
                    queue,
                    sender: None,
                }
            }
        }
    }

    fn send(&self, command: Command) -> Result<(), ScheduleError> {
        let sender = self
            .sender
            .as_ref()
            .ok_or(ScheduleError::QueueUnavailable(self.queue))?;
        sender
            .send(command)
            .map_err(|_| ScheduleError::QueueUnavailable(self.queue))
    }
}

struct Worker {
    queue: Queue,
    timers: HashMap<TimerToken, Timer>,
}

impl Worker {
    fn new(queue: Queue) -> Self {
        Self {
            queue,
            timers: HashMap::new(),
        }
    }

    fn run(mut self, receiver: Receiver<Command>) {
        CURRENT_QUEUE.with(|current| current.set(Some(self.queue)));

        loop {
            let received = match self.next_deadline() {
                Some(deadline) => match receiver.recv_deadline(deadline) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match receiver.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };

            if let Some(command) = received {
                self.handle_command(command);
            }
            self.handle_timers();
        }

        tracing::debug!(queue = %self.queue, "queue executor stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Run(task) => self.guarded(task),
            Command::RequestTimer(timer) => {
                self.timers.insert(timer.token, timer);
            }
            Command::CancelTimer(token) => {
                self.timers.remove(&token);
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().filter_map(|timer| timer.deadline).min()
    }

    fn handle_timers(&mut self) {
        let now = Instant::now();
        let mut due: Vec<(Instant, TimerToken)> = self
            .timers
            .iter()
            .filter_map(|(token, timer)| match timer.deadline {
                Some(deadline) if deadline <= now => Some((deadline, *token)),
                _ => None,
            })
            .collect();
        due.sort();

        for (_, token) in due {
            if let Some(timer) = self.timers.remove(&token) {
                let action = timer.action;
                self.guarded(Box::new(move || action(token)));
            }
        }
    }

    /// Runs a task, keeping the worker alive if it panics.
    fn guarded(&self, task: Task) {
        if catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(queue = %self.queue, "task panicked on queue executor");
        }
    }
}

/// Dispatches work onto a [`Queue`].
#[derive(Clone, Copy)]
pub struct Scheduler {
    queue: Queue,
    executor: &'static Executor,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Scheduler");
        s.field("queue", &self.queue);
        s.finish()
    }
}

impl Scheduler {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            executor: queue.executor(),
        }
    }

    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Queue `work` to run on this scheduler's queue without blocking.
    pub fn try_async(&self, work: impl FnOnce() + Send + 'static) -> Result<(), ScheduleError> {
        self.executor.send(Command::Run(Box::new(work)))
    }

    /// Like [`Scheduler::try_async`], but drops the work with a warning if
    /// the queue is unavailable.
    pub fn run_async(&self, work: impl FnOnce() + Send + 'static) {
        if let Err(err) = self.try_async(work) {
            tracing::warn!(error = %err, "dropping async work");
        }
    }

    /// Run `work` on this scheduler's queue no earlier than `after` from now.
    ///
    /// The returned token can be passed to [`Scheduler::cancel`] until the
    /// timer fires. A delay too large to be represented never fires.
    pub fn try_delay(
        &self,
        after: Duration,
        work: impl FnOnce(TimerToken) + Send + 'static,
    ) -> Result<TimerToken, ScheduleError> {
        let token = TimerToken::next();
        let deadline = Instant::now().checked_add(after);
        self.executor.send(Command::RequestTimer(Timer {
            token,
            action: Box::new(work),
            deadline,
        }))?;
        tracing::debug!(queue = %self.queue, ?after, token = token.into_raw(), "timer scheduled");
        Ok(token)
    }

    /// Like [`Scheduler::try_delay`], but returns [`TimerToken::INVALID`]
    /// with a warning if the queue is unavailable.
    pub fn delay(
        &self,
        after: Duration,
        work: impl FnOnce(TimerToken) + Send + 'static,
    ) -> TimerToken {
        match self.try_delay(after, work) {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "dropping delayed work");
                TimerToken::INVALID
            }
        }
    }

    /// Cancels a pending timer. Cancelling a timer that already fired, or
    /// [`TimerToken::INVALID`], does nothing.
    pub fn cancel(&self, token: TimerToken) {
        if token == TimerToken::INVALID {
            return;
        }
        tracing::debug!(queue = %self.queue, token = token.into_raw(), "timer cancelled");
        if let Err(err) = self.executor.send(Command::CancelTimer(token)) {
            tracing::warn!(error = %err, "failed to cancel timer");
        }
    }
}
