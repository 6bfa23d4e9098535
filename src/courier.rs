use crate::config::CourierConfig;
use crate::error::{Error, Result};
use courier_concurrency::{Transaction, TransactionPool};
use courier_core::{Answer, PseudoRandomSource, Tick, TickClock, TransactionId};
use courier_engine::{
    ConnectionRegistry, Connector, Dispatcher, EventLoop, EventLoopStats, HttpConnector,
};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The courier service core.
///
/// Owns the delegate event loop, the connection registry and the transaction
/// pool for contexts of type `C`. The pool's garbage collection runs as a
/// ticker on the event loop, driven by a tick clock counting seconds since the
/// service was opened.
///
/// # Example
///
/// ```ignore
/// use courier::prelude::*;
///
/// let courier: Courier<Vec<u8>> = Courier::builder()
///     .max_idle_time(30)
///     .open()?;
///
/// courier.send("search-2:8080/query", "POST", body, |answer| {
///     println!("{} {:?}", answer.http_status, answer.body_str());
/// });
///
/// let id = courier.create_transaction(cursor, 10)?;
/// let txn = courier.fetch_transaction(&id.to_string())?;
///
/// courier.shutdown();
/// ```
pub struct Courier<C> {
    config: CourierConfig,
    clock: TickClock,
    pool: Arc<TransactionPool<C>>,
    dispatcher: Dispatcher,
}

impl<C: Send + 'static> Courier<C> {
    /// Create a builder with default settings.
    pub fn builder() -> CourierBuilder<C> {
        CourierBuilder::new()
    }

    /// Open with the given configuration.
    pub fn open(config: CourierConfig) -> Result<Self> {
        CourierBuilder::new().config(config).open()
    }

    /// Open with configuration read from a TOML file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = CourierConfig::load_file(path)?;
        Self::open(config)
    }
}

impl<C> Courier<C> {
    /// Send a delegate request.
    ///
    /// Returns `true` when `callback` has been or will be invoked exactly
    /// once, with either the response or a failure answer. Returns `false`
    /// without invoking it when the connection limit or the address's queue
    /// limit is reached.
    pub fn send(
        &self,
        address: &str,
        method: &str,
        body: impl Into<bytes::Bytes>,
        callback: impl FnOnce(Answer) + Send + 'static,
    ) -> bool {
        self.dispatcher.send(address, method, body, callback)
    }

    /// The shared transaction pool.
    pub fn transactions(&self) -> &Arc<TransactionPool<C>> {
        &self.pool
    }

    /// Store a new transaction that expires after `idle_time` ticks unless
    /// fetched.
    pub fn create_transaction(&self, context: C, idle_time: Tick) -> Result<TransactionId> {
        self.pool.create(context, idle_time).map_err(Error::from)
    }

    /// Take a transaction out of the pool.
    ///
    /// `Ok(None)` for an unknown or expired id.
    pub fn fetch_transaction(&self, id: &str) -> Result<Option<Transaction<C>>> {
        self.pool.fetch(id).map_err(Error::from)
    }

    /// Put a fetched transaction back, renewing its deadline.
    pub fn return_transaction(&self, transaction: Transaction<C>) -> Result<TransactionId> {
        self.pool.return_transaction(transaction).map_err(Error::from)
    }

    /// Destroy a transaction. Returns whether it was present.
    pub fn release_transaction(&self, id: &str) -> Result<bool> {
        self.pool.release(id).map_err(Error::from)
    }

    /// Expire transactions up to the current tick now instead of waiting for
    /// the ticker.
    pub fn collect_garbage(&self) -> usize {
        self.pool.collect_garbage(self.clock.now())
    }

    /// Current tick of the service clock.
    pub fn tick(&self) -> Tick {
        self.clock.now()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Event loop counters.
    pub fn stats(&self) -> &EventLoopStats {
        self.dispatcher.event_loop().stats()
    }

    /// Number of delegate addresses seen so far.
    pub fn connections(&self) -> usize {
        self.dispatcher.registry().len()
    }

    /// Stop the event loop.
    ///
    /// Pending delegate requests are answered with a shutdown failure. Later
    /// sends are answered the same way. The transaction pool stays usable.
    pub fn shutdown(&self) {
        self.dispatcher.event_loop().stop();
    }

    /// Whether `shutdown` was called.
    pub fn is_shutdown(&self) -> bool {
        self.dispatcher.event_loop().is_stopped()
    }
}

impl<C> Drop for Courier<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C> std::fmt::Debug for Courier<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Courier")
            .field("pool", &self.pool)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

/// Builder for [`Courier`].
///
/// # Example
///
/// ```ignore
/// // From a file, with one override
/// let config = CourierConfig::load_file("courier.toml")?;
/// let courier: Courier<Session> = Courier::builder()
///     .config(config)
///     .request_timeout_ms(5_000)
///     .open()?;
/// ```
pub struct CourierBuilder<C> {
    config: CourierConfig,
    connector: Option<Arc<dyn Connector>>,
    clock: Option<TickClock>,
    seed: Option<u64>,
    _context: PhantomData<fn() -> C>,
}

impl<C> CourierBuilder<C> {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: CourierConfig::default(),
            connector: None,
            clock: None,
            seed: None,
            _context: PhantomData,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Longest transaction idle time, in ticks.
    pub fn max_idle_time(mut self, ticks: u64) -> Self {
        self.config.transactions.max_idle_time = ticks;
        self
    }

    /// Expected transaction creations per tick.
    pub fn transactions_per_tick(mut self, n: usize) -> Self {
        self.config.transactions.transactions_per_tick = n;
        self
    }

    /// Longest wait between ticker runs.
    pub fn wake_period_ms(mut self, ms: u64) -> Self {
        self.config.event_loop.wake_period_ms = ms;
        self
    }

    /// Completed jobs after which tickers run early.
    pub fn ticker_job_interval(mut self, jobs: u64) -> Self {
        self.config.event_loop.ticker_job_interval = jobs;
        self
    }

    /// Upper bound for one delegate exchange.
    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.event_loop.request_timeout_ms = ms;
        self
    }

    /// Upper bound for establishing a connection.
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.event_loop.connect_timeout_ms = ms;
        self
    }

    /// Maximum number of distinct delegate addresses.
    pub fn max_connections(mut self, n: usize) -> Self {
        self.config.connections.max_connections = n;
        self
    }

    /// Maximum queued requests per address.
    pub fn max_pending_per_address(mut self, n: usize) -> Self {
        self.config.connections.max_pending_per_address = n;
        self
    }

    /// Content type sent with request bodies; `None` sends none.
    pub fn content_type(mut self, content_type: Option<&str>) -> Self {
        self.config.connections.content_type = content_type.map(str::to_string);
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Use a custom tick clock (for example one continuing an earlier run).
    pub fn clock(mut self, clock: TickClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed the transaction id generator deterministically.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl<C: Send + 'static> CourierBuilder<C> {
    /// Validate the configuration, start the event loop and open the pool.
    pub fn open(self) -> Result<Courier<C>> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_default();
        let random = match self.seed {
            Some(seed) => PseudoRandomSource::new(seed),
            None => PseudoRandomSource::from_time(),
        };
        let pool = Arc::new(TransactionPool::with_random(
            clock.now(),
            config.transactions.max_idle_time,
            config.transactions.transactions_per_tick,
            random,
        )?);

        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(HttpConnector::new(
                config.connect_timeout(),
                config.connections.content_type.as_deref(),
            )),
        };
        let registry = Arc::new(ConnectionRegistry::new(connector, config.registry_config()));
        let event_loop = Arc::new(EventLoop::new(config.event_loop_config())?);

        let gc_pool = Arc::clone(&pool);
        let gc_clock = clock.clone();
        event_loop.add_ticker(move || {
            let expired = gc_pool.collect_garbage(gc_clock.now());
            if expired > 0 {
                debug!(expired, remaining = gc_pool.len(), "Expired idle transactions");
            }
        });
        event_loop.start()?;

        info!(
            capacity = pool.capacity(),
            max_idle_time = pool.max_idle_time(),
            max_connections = config.connections.max_connections,
            "Courier opened"
        );
        Ok(Courier {
            config,
            clock,
            pool,
            dispatcher: Dispatcher::new(registry, event_loop),
        })
    }
}

impl<C> Default for CourierBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
