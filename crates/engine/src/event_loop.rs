//! Single-threaded event loop for delegate exchanges
//!
//! One OS thread runs a current-thread tokio runtime. Every exchange future and
//! every completion handler runs there; other threads only hand jobs over the
//! wake channel.
//!
//! ## Loop iteration
//!
//! ```text
//! select! {
//!     wake channel      -> Job: dispatch, Shutdown: leave
//!     in-flight set     -> exchange done: complete job, dispatch the
//!                          connection's next job or start its reconnect
//!                          reconnect done: dispatch the next job
//!     wake_period timer -> run tickers
//! }
//! ```
//!
//! Reconnects after a failed exchange run in the in-flight set like any
//! exchange, so a slow peer never holds up the others. The thread suspends
//! only inside `select!`.
//!
//! Tickers also run after `ticker_job_interval` completed jobs, so a busy loop
//! still collects garbage.
//!
//! ## Shutdown
//!
//! `stop()` sets the stop flag and posts `Shutdown`. The loop closes the wake
//! channel, fails every in-flight job and every job still queued in the
//! channel, each together with its connection's pending requests. Connections
//! still reconnecting have their pending requests failed the same way.

use crate::connection::DelegateConnection;
use crate::error::{EngineError, Result};
use crate::job::{DelegateJob, Followup, InFlightJob};
use crate::transport::ExchangeResult;
use courier_core::ErrorCode;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Periodic callback run on the loop thread
pub type Ticker = Box<dyn Fn() + Send + 'static>;

const THREAD_NAME: &str = "courier-event-loop";
const SHUTDOWN_MESSAGE: &str = "event loop stopped";

/// Event loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLoopConfig {
    /// Longest time the loop waits without running its tickers
    pub wake_period: Duration,
    /// Completed jobs after which tickers run regardless of the timer
    pub ticker_job_interval: u64,
    /// Upper bound for one exchange
    pub request_timeout: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        EventLoopConfig {
            wake_period: Duration::from_millis(1000),
            ticker_job_interval: 64,
            request_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Loop counters
#[derive(Debug, Default)]
pub struct EventLoopStats {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    ticks: AtomicU64,
}

impl EventLoopStats {
    /// Jobs handed to a channel
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Jobs whose exchange finished, successfully or not
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Completed jobs whose exchange failed
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Ticker rounds run
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

enum LoopMessage {
    Job(DelegateJob),
    Shutdown,
}

struct Shared {
    config: EventLoopConfig,
    stopped: AtomicBool,
    tickers: Mutex<Vec<Ticker>>,
    stats: EventLoopStats,
}

/// Handle to the loop thread
///
/// Created stopped; [`EventLoop::start`] spawns the thread. Jobs pushed before
/// `start` wait in the wake channel.
pub struct EventLoop {
    shared: Arc<Shared>,
    sender: UnboundedSender<LoopMessage>,
    idle: Mutex<Option<(Runtime, UnboundedReceiver<LoopMessage>)>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoop {
    /// Build the runtime and the wake channel
    ///
    /// # Errors
    /// `Runtime` if the tokio runtime cannot be created.
    pub fn new(config: EventLoopConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        Ok(EventLoop {
            shared: Arc::new(Shared {
                config,
                stopped: AtomicBool::new(false),
                tickers: Mutex::new(Vec::new()),
                stats: EventLoopStats::default(),
            }),
            sender,
            idle: Mutex::new(Some((runtime, receiver))),
            thread: Mutex::new(None),
        })
    }

    /// Settings the loop was built with
    pub fn config(&self) -> EventLoopConfig {
        self.shared.config
    }

    /// Loop counters
    pub fn stats(&self) -> &EventLoopStats {
        &self.shared.stats
    }

    /// Whether `stop` was called
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Whether the loop thread is running
    pub fn is_running(&self) -> bool {
        !self.is_stopped() && self.thread.lock().is_some()
    }

    /// Spawn the loop thread
    ///
    /// # Errors
    /// `AlreadyStarted` on a second call, `Shutdown` after `stop`, `Runtime`
    /// if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(EngineError::Shutdown);
        }
        let (runtime, receiver) = self.idle.lock().take().ok_or(EngineError::AlreadyStarted)?;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                runtime.block_on(run(shared, receiver));
            })?;
        *self.thread.lock() = Some(handle);
        info!(
            wake_period_ms = self.shared.config.wake_period.as_millis() as u64,
            ticker_job_interval = self.shared.config.ticker_job_interval,
            "Event loop started"
        );
        Ok(())
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// In-flight and queued jobs are answered with a shutdown failure.
    /// Idempotent. Called from the loop thread itself (from a callback or a
    /// ticker) the thread is signalled but not joined.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        let _ = self.sender.send(LoopMessage::Shutdown);

        // Never started: drain what was queued before start
        if let Some((runtime, mut receiver)) = self.idle.lock().take() {
            receiver.close();
            drain(&mut receiver);
            drop(runtime);
        }

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("Event loop stop requested from the loop thread");
                return;
            }
            if handle.join().is_err() {
                error!("Event loop thread panicked");
            }
            info!(
                completed = self.shared.stats.completed(),
                "Event loop stopped"
            );
        }
    }

    /// Hand a job to the loop
    ///
    /// Thread-safe. Returns `false` once the loop is stopped; the job is then
    /// aborted with a shutdown answer before this returns.
    pub fn push_job(&self, job: DelegateJob) -> bool {
        if self.is_stopped() {
            job.abort(ErrorCode::Shutdown, SHUTDOWN_MESSAGE);
            return false;
        }
        match self.sender.send(LoopMessage::Job(job)) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                if let LoopMessage::Job(job) = message {
                    job.abort(ErrorCode::Shutdown, SHUTDOWN_MESSAGE);
                }
                false
            }
        }
    }

    /// Register a periodic callback
    ///
    /// Tickers run on the loop thread and must not register further tickers.
    pub fn add_ticker(&self, ticker: impl Fn() + Send + 'static) {
        self.shared.tickers.lock().push(Box::new(ticker));
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.shared.config)
            .field("stopped", &self.is_stopped())
            .field("stats", &self.shared.stats)
            .finish()
    }
}

// ============================================================================
// Loop thread
// ============================================================================

enum LoopEvent {
    Message(Option<LoopMessage>),
    Completed(u64, Outcome),
    Tick,
}

/// Work tracked for one entry of the in-flight set
enum Work {
    Exchange(InFlightJob),
    Reconnect(Arc<DelegateConnection>),
}

impl Work {
    fn abort(self, code: ErrorCode, message: &str) {
        match self {
            Work::Exchange(job) => job.abort(code, message),
            Work::Reconnect(connection) => {
                connection.drop_all_pending_requests(code, message);
            }
        }
    }
}

enum Outcome {
    Exchange(ExchangeResult),
    Reconnected,
}

struct LoopState {
    shared: Arc<Shared>,
    in_flight: FuturesUnordered<BoxFuture<'static, (u64, Outcome)>>,
    jobs: FxHashMap<u64, Work>,
    next_key: u64,
    completed_since_tick: u64,
}

async fn run(shared: Arc<Shared>, mut receiver: UnboundedReceiver<LoopMessage>) {
    let wake_period = shared.config.wake_period;
    let mut state = LoopState {
        shared,
        in_flight: FuturesUnordered::new(),
        jobs: FxHashMap::default(),
        next_key: 0,
        completed_since_tick: 0,
    };
    let mut next_tick = Instant::now() + wake_period;

    loop {
        let event = tokio::select! {
            message = receiver.recv() => LoopEvent::Message(message),
            Some((key, outcome)) = state.in_flight.next(), if !state.in_flight.is_empty() => {
                LoopEvent::Completed(key, outcome)
            }
            _ = tokio::time::sleep_until(next_tick) => LoopEvent::Tick,
        };

        match event {
            LoopEvent::Message(Some(LoopMessage::Job(job))) => state.dispatch(job),
            LoopEvent::Message(Some(LoopMessage::Shutdown)) | LoopEvent::Message(None) => break,
            LoopEvent::Completed(key, outcome) => {
                state.complete(key, outcome);
                if state.completed_since_tick >= state.shared.config.ticker_job_interval {
                    state.run_tickers();
                    next_tick = Instant::now() + wake_period;
                }
            }
            LoopEvent::Tick => {
                state.run_tickers();
                next_tick = Instant::now() + wake_period;
            }
        }

        if state.shared.stopped.load(Ordering::Acquire) {
            break;
        }
    }

    receiver.close();
    let aborted = state.jobs.len();
    for (_, work) in state.jobs.drain() {
        work.abort(ErrorCode::Shutdown, SHUTDOWN_MESSAGE);
    }
    let drained = drain(&mut receiver);
    debug!(aborted, drained, "Event loop drained");
}

/// Abort every job still in the (closed) wake channel
fn drain(receiver: &mut UnboundedReceiver<LoopMessage>) -> usize {
    let mut count = 0;
    while let Ok(message) = receiver.try_recv() {
        if let LoopMessage::Job(job) = message {
            job.abort(ErrorCode::Shutdown, SHUTDOWN_MESSAGE);
            count += 1;
        }
    }
    count
}

impl LoopState {
    fn dispatch(&mut self, job: DelegateJob) {
        let address = job.address().to_string();
        let Some((in_flight, exchange)) = job.start() else {
            warn!(address = %address, "Dropped delegate job without channel");
            return;
        };
        let key = self.next_key();
        self.jobs.insert(key, Work::Exchange(in_flight));

        let timeout = self.shared.config.request_timeout;
        self.in_flight.push(
            async move {
                let result = match AssertUnwindSafe(tokio::time::timeout(timeout, exchange))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(result)) => result,
                    Ok(Err(_)) => Err(EngineError::Timeout(timeout)),
                    Err(panic) => Err(EngineError::Internal(format!(
                        "exchange panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                };
                (key, Outcome::Exchange(result))
            }
            .boxed(),
        );
        self.shared.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        debug!(address = %address, key, "Dispatched delegate job");
    }

    /// Run the connection's reconnect inside the in-flight set
    fn reconnect(&mut self, connection: Arc<DelegateConnection>) {
        let address = connection.address().to_string();
        let reconnect = match catch_unwind(AssertUnwindSafe(|| connection.reconnect())) {
            Ok(reconnect) => reconnect,
            Err(panic) => {
                error!(address = %address, panic = %panic_message(panic.as_ref()), "Reconnect panicked");
                connection.drop_all_pending_requests(ErrorCode::Internal, "reconnect panicked");
                return;
            }
        };
        let key = self.next_key();
        self.jobs.insert(key, Work::Reconnect(Arc::clone(&connection)));
        let target = address.clone();
        self.in_flight.push(
            async move {
                if let Err(panic) = AssertUnwindSafe(reconnect).catch_unwind().await {
                    error!(address = %target, panic = %panic_message(panic.as_ref()), "Reconnect panicked");
                    connection.drop_all_pending_requests(ErrorCode::Internal, "reconnect panicked");
                }
                (key, Outcome::Reconnected)
            }
            .boxed(),
        );
        debug!(address = %address, key, "Reconnecting delegate connection");
    }

    fn complete(&mut self, key: u64, outcome: Outcome) {
        let Some(work) = self.jobs.remove(&key) else {
            error!(key, "Completed exchange has no job");
            return;
        };
        match (work, outcome) {
            (Work::Exchange(job), Outcome::Exchange(result)) => self.complete_exchange(key, job, result),
            (Work::Reconnect(connection), Outcome::Reconnected) => {
                if let Some(next) = connection.next_job() {
                    self.dispatch(next);
                }
            }
            (work, _) => {
                error!(key, "Completion does not match its work");
                work.abort(ErrorCode::Internal, "event loop bookkeeping error");
            }
        }
    }

    fn complete_exchange(&mut self, key: u64, job: InFlightJob, result: ExchangeResult) {
        let stats = &self.shared.stats;
        stats.completed.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.completed_since_tick += 1;

        let connection = Arc::clone(job.connection());
        match catch_unwind(AssertUnwindSafe(move || job.complete(result))) {
            Ok(Followup::Idle) => {}
            Ok(Followup::Dispatch(next)) => self.dispatch(next),
            Ok(Followup::Reconnect(connection)) => self.reconnect(connection),
            Err(panic) => {
                error!(
                    key,
                    address = %connection.address(),
                    panic = %panic_message(panic.as_ref()),
                    "Job completion panicked"
                );
                connection.drop_all_pending_requests(ErrorCode::Internal, "job completion panicked");
            }
        }
    }

    fn next_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key = self.next_key.wrapping_add(1);
        key
    }

    fn run_tickers(&mut self) {
        self.completed_since_tick = 0;
        self.shared.stats.ticks.fetch_add(1, Ordering::Relaxed);
        let tickers = self.shared.tickers.lock();
        for (n, ticker) in tickers.iter().enumerate() {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| ticker())) {
                error!(ticker = n, panic = %panic_message(panic.as_ref()), "Ticker panicked");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
