// src/recording/scheduler.rs
//! Single-worker periodic scheduler
//!
//! Each scheduler owns one dedicated, named background thread that invokes a
//! [`PeriodicTask`] according to a [`SchedulePolicy`]:
//!
//! - **Fixed rate**: invocation `n` targets `start + n * period`. If an
//!   invocation overruns, the missed ones run back-to-back instead of
//!   drifting.
//! - **Fixed delay**: the next invocation starts `delay` after the previous
//!   one returned, so invocations never overlap.
//!
//! # Shutdown
//!
//! ```text
//! shutdown()          → no further invocations; in-flight one completes
//! await_termination() → bounded wait for the worker to exit
//! shutdown_now()      → cancelled flag set, worker detached
//! ```
//!
//! Threads cannot be killed, so `shutdown_now` abandons the worker: it
//! observes the cancelled flag before its next invocation and exits.

use crate::utils::errors::{RecorderError, Result};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Suffix for worker thread names
static WORKER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Body of a periodically scheduled job
///
/// Implementations must handle their own failures: a single invocation
/// should log and return rather than propagate.
pub trait PeriodicTask: Send + Sync + 'static {
    fn run(&self);

    /// Runs once on the worker thread after a graceful `shutdown`
    fn on_shutdown(&self) {}
}

impl<F> PeriodicTask for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self) {
        self()
    }
}

/// Timing policy of a periodic job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// Target absolute invocation times, catching up after overruns
    FixedRate(Duration),

    /// Wait a fixed delay after each invocation returns
    FixedDelay(Duration),
}

impl SchedulePolicy {
    pub fn period(&self) -> Duration {
        match self {
            SchedulePolicy::FixedRate(period) | SchedulePolicy::FixedDelay(period) => *period,
        }
    }
}

/// Outcome of a bounded termination wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Worker exited (or was never started)
    Stopped(Duration),

    /// Worker still running when the timeout elapsed
    TimedOut,
}

impl Termination {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Termination::Stopped(_))
    }
}

/// Handle used to abort a blocked termination wait from another thread
///
/// Once fired, the handle stays interrupted until [`clear`](Self::clear)
/// is called; every wait started while it is set fails immediately.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Interrupt any current or future wait
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reset the interrupted state
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
        while self.wake_rx.try_recv().is_ok() {}
    }
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a started worker
struct Worker {
    /// Dropping the sender stops the worker after its current invocation
    stop_tx: Option<Sender<()>>,

    /// Disconnects when the worker thread exits
    done_rx: Receiver<()>,

    /// Set by `shutdown_now`
    cancelled: Arc<AtomicBool>,

    handle: Option<JoinHandle<()>>,
}

/// Periodic scheduler backed by one dedicated thread
pub struct PeriodicScheduler {
    name: String,
    worker: Option<Worker>,
}

impl PeriodicScheduler {
    /// Create an idle scheduler; `name` prefixes the worker thread name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a worker has been started
    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// Whether the worker has been told to stop
    pub fn is_shutdown(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| w.stop_tx.is_none())
            .unwrap_or(false)
    }

    /// Whether the worker thread has exited
    pub fn is_terminated(&self) -> bool {
        match &self.worker {
            Some(worker) => matches!(worker.done_rx.try_recv(), Err(TryRecvError::Disconnected)),
            None => false,
        }
    }

    /// Start the worker; the first invocation runs immediately
    pub fn start<T: PeriodicTask>(&mut self, task: Arc<T>, policy: SchedulePolicy) -> Result<()> {
        if self.worker.is_some() {
            return Err(RecorderError::InvalidState {
                operation: "start",
                state: format!("{} scheduler already started", self.name),
            });
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(0);
        let cancelled = Arc::new(AtomicBool::new(false));

        let thread_name = format!("{}{}", self.name, WORKER_SEQ.fetch_add(1, Ordering::Relaxed));
        let worker_cancelled = Arc::clone(&cancelled);
        let worker_name = self.name.clone();

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                // Held until the thread exits so waiters observe disconnection
                let _done = done_tx;
                run_loop(&worker_name, task.as_ref(), policy, &stop_rx, &worker_cancelled);
            })
            .map_err(|source| RecorderError::SpawnFailed {
                name: thread_name,
                source,
            })?;

        debug!("{} scheduler started with {:?}", self.name, policy);

        self.worker = Some(Worker {
            stop_tx: Some(stop_tx),
            done_rx,
            cancelled,
            handle: Some(handle),
        });

        Ok(())
    }

    /// Stop scheduling; the in-flight invocation is allowed to complete
    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            if worker.stop_tx.take().is_some() {
                debug!("{} scheduler shutdown requested", self.name);
            }
        }
    }

    /// Stop scheduling immediately and abandon the worker thread
    pub fn shutdown_now(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.cancelled.store(true, Ordering::SeqCst);
            worker.stop_tx.take();
            // Detach: an in-flight invocation is not waited for
            worker.handle.take();
            debug!("{} scheduler terminated", self.name);
        }
    }

    /// Block until the worker exits, the timeout elapses or `interrupt` fires
    pub fn await_termination(
        &mut self,
        timeout: Duration,
        interrupt: &InterruptHandle,
    ) -> Result<Termination> {
        let start = Instant::now();

        let Some(worker) = self.worker.as_mut() else {
            return Ok(Termination::Stopped(Duration::ZERO));
        };

        if interrupt.is_interrupted() {
            return Err(RecorderError::Interrupted {
                waiting_for: self.name.clone(),
            });
        }

        let stopped = select! {
            recv(worker.done_rx) -> _ => true,
            recv(interrupt.wake_rx) -> _ => {
                // Keep the caller's interrupted state visible after returning
                interrupt.flag.store(true, Ordering::SeqCst);
                return Err(RecorderError::Interrupted {
                    waiting_for: self.name.clone(),
                });
            }
            default(timeout) => false,
        };

        if !stopped {
            return Ok(Termination::TimedOut);
        }

        if let Some(handle) = worker.handle.take() {
            if handle.join().is_err() {
                error!("{} worker thread panicked", self.name);
            }
        }

        Ok(Termination::Stopped(start.elapsed()))
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        // Never leave a worker running past its owner
        self.shutdown_now();
    }
}

impl std::fmt::Debug for PeriodicScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicScheduler")
            .field("name", &self.name)
            .field("started", &self.is_started())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn run_loop(
    name: &str,
    task: &dyn PeriodicTask,
    policy: SchedulePolicy,
    stop_rx: &Receiver<()>,
    cancelled: &AtomicBool,
) {
    let mut next = Instant::now();
    let mut invocations: u64 = 0;
    let mut graceful = false;

    loop {
        // A message or a disconnect both mean stop
        match stop_rx.recv_deadline(next) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                graceful = true;
                break;
            }
        }

        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        if catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            error!("{} task panicked; continuing with next invocation", name);
        }
        invocations += 1;

        next = match policy {
            SchedulePolicy::FixedRate(period) => next + period,
            SchedulePolicy::FixedDelay(delay) => Instant::now() + delay,
        };
    }

    if graceful && !cancelled.load(Ordering::SeqCst) {
        if catch_unwind(AssertUnwindSafe(|| task.on_shutdown())).is_err() {
            error!("{} shutdown hook panicked", name);
        }
    }

    trace!("{} worker exiting after {} invocations", name, invocations);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_task() -> (Arc<AtomicU64>, Arc<impl PeriodicTask>) {
        let count = Arc::new(AtomicU64::new(0));
        let task_count = Arc::clone(&count);
        let task = Arc::new(move || {
            task_count.fetch_add(1, Ordering::SeqCst);
        });
        (count, task)
    }

    #[test]
    fn test_fixed_rate_invocation_count() {
        let (count, task) = counter_task();
        let mut scheduler = PeriodicScheduler::new("test:rate:");
        scheduler
            .start(task, SchedulePolicy::FixedRate(Duration::from_millis(20)))
            .unwrap();

        thread::sleep(Duration::from_millis(500));
        scheduler.shutdown();
        let termination = scheduler
            .await_termination(Duration::from_secs(1), &InterruptHandle::new())
            .unwrap();

        assert!(termination.is_stopped());
        let n = count.load(Ordering::SeqCst);
        assert!((20..=30).contains(&n), "unexpected invocation count {}", n);
    }

    #[test]
    fn test_fixed_rate_catches_up_after_overrun() {
        let count = Arc::new(AtomicU64::new(0));
        let task_count = Arc::clone(&count);
        let task = Arc::new(move || {
            // First invocation overruns by several periods
            if task_count.fetch_add(1, Ordering::SeqCst) == 0 {
                thread::sleep(Duration::from_millis(200));
            }
        });

        let mut scheduler = PeriodicScheduler::new("test:catchup:");
        scheduler
            .start(task, SchedulePolicy::FixedRate(Duration::from_millis(20)))
            .unwrap();

        thread::sleep(Duration::from_millis(400));
        scheduler.shutdown();
        scheduler
            .await_termination(Duration::from_secs(1), &InterruptHandle::new())
            .unwrap();

        // Without catch-up, a drifting scheduler would manage about 10
        let n = count.load(Ordering::SeqCst);
        assert!(n >= 17, "expected catch-up invocations, got {}", n);
    }

    #[test]
    fn test_fixed_delay_never_overlaps() {
        let running = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let (r, o) = (Arc::clone(&running), Arc::clone(&overlapped));
        let task = Arc::new(move || {
            if r.swap(true, Ordering::SeqCst) {
                o.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(5));
            r.store(false, Ordering::SeqCst);
        });

        let mut scheduler = PeriodicScheduler::new("test:delay:");
        scheduler
            .start(task, SchedulePolicy::FixedDelay(Duration::from_millis(1)))
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.shutdown();
        scheduler
            .await_termination(Duration::from_secs(1), &InterruptHandle::new())
            .unwrap();

        assert!(!overlapped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_task_keeps_running() {
        let count = Arc::new(AtomicU64::new(0));
        let task_count = Arc::clone(&count);
        let task = Arc::new(move || {
            if task_count.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first invocation fails");
            }
        });

        let mut scheduler = PeriodicScheduler::new("test:panic:");
        scheduler
            .start(task, SchedulePolicy::FixedRate(Duration::from_millis(10)))
            .unwrap();
        thread::sleep(Duration::from_millis(100));
        scheduler.shutdown();
        scheduler
            .await_termination(Duration::from_secs(1), &InterruptHandle::new())
            .unwrap();

        assert!(count.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn test_await_termination_times_out_on_stuck_task() {
        let task = Arc::new(|| thread::sleep(Duration::from_millis(500)));
        let mut scheduler = PeriodicScheduler::new("test:stuck:");
        scheduler
            .start(task, SchedulePolicy::FixedDelay(Duration::from_millis(1)))
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        scheduler.shutdown();
        let start = Instant::now();
        let termination = scheduler
            .await_termination(Duration::from_millis(50), &InterruptHandle::new())
            .unwrap();

        assert_eq!(termination, Termination::TimedOut);
        assert!(start.elapsed() < Duration::from_millis(400));
        scheduler.shutdown_now();
    }

    #[test]
    fn test_interrupt_aborts_wait_and_stays_set() {
        let task = Arc::new(|| thread::sleep(Duration::from_millis(300)));
        let mut scheduler = PeriodicScheduler::new("test:interrupt:");
        scheduler
            .start(task, SchedulePolicy::FixedDelay(Duration::from_millis(1)))
            .unwrap();
        thread::sleep(Duration::from_millis(20));
        scheduler.shutdown();

        let interrupt = InterruptHandle::new();
        let remote = interrupt.clone();
        let trigger = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.interrupt();
        });

        let result = scheduler.await_termination(Duration::from_secs(5), &interrupt);
        trigger.join().unwrap();

        assert!(matches!(result, Err(RecorderError::Interrupted { .. })));
        assert!(interrupt.is_interrupted());

        interrupt.clear();
        assert!(!interrupt.is_interrupted());
        scheduler.shutdown_now();
    }

    #[test]
    fn test_unstarted_scheduler() {
        let mut scheduler = PeriodicScheduler::new("test:idle:");
        assert!(!scheduler.is_started());
        scheduler.shutdown();
        let termination = scheduler
            .await_termination(Duration::from_millis(10), &InterruptHandle::new())
            .unwrap();
        assert!(termination.is_stopped());
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (_, task) = counter_task();
        let mut scheduler = PeriodicScheduler::new("test:double:");
        scheduler
            .start(Arc::clone(&task), SchedulePolicy::FixedDelay(Duration::from_millis(5)))
            .unwrap();
        assert!(scheduler
            .start(task, SchedulePolicy::FixedDelay(Duration::from_millis(5)))
            .is_err());
        scheduler.shutdown_now();
    }
}
