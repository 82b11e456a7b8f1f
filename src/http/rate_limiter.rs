//! Fixed-window rate limiter.
//!
//! Issues at most `capacity` permits per window. A background task owned by
//! the limiter refills the pool to full capacity every `window`, anchored at
//! construction time and independent of load. Permits still held when the
//! window rolls over are not carried into the new window, so a burst of up to
//! `2 * capacity` grants around a boundary is possible. This is the
//! fixed-window algorithm, not a token bucket or sliding log, and the
//! boundary burst is a known limitation that callers rely on.
//!
//! The permit count lives under one lock. Waiters never hold a permit while
//! parked; they are woken by [`Notify`] and take the permit themselves under
//! the lock, so an abandoned wait has nothing to hand back.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::utils::time::TimeUnit;

/// Whether the current window still has permits to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Exhausted,
}

impl WindowState {
    fn of(available: usize) -> Self {
        if available == 0 {
            WindowState::Exhausted
        } else {
            WindowState::Open
        }
    }
}

/// Point-in-time view of a limiter, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct LimiterSnapshot {
    pub capacity: usize,
    pub available: usize,
    pub window: Duration,
    pub window_anchor: Instant,
    pub resets: u64,
    pub state: WindowState,
}

#[derive(Debug)]
struct Pool {
    // Always within [0, capacity].
    available: usize,
    anchor: Instant,
    resets: u64,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    capacity: usize,
    window_duration: Duration,
    pool: Mutex<Pool>,
    wakeup: Notify,
}

impl Shared {
    /// `Ok(false)` when the window is exhausted.
    fn take(&self) -> Result<bool> {
        let mut pool = self.pool.lock();
        if pool.closed {
            return Err(AppError::Cancelled("rate limiter is shut down".into()));
        }
        if pool.available == 0 {
            return Ok(false);
        }
        pool.available -= 1;
        Ok(true)
    }

    fn release(&self) {
        {
            let mut pool = self.pool.lock();
            if pool.closed || pool.available >= self.capacity {
                return;
            }
            pool.available += 1;
        }
        self.wakeup.notify_one();
    }

    fn reset(&self, scheduled: Instant) {
        {
            let mut pool = self.pool.lock();
            let restored = self.capacity - pool.available;
            pool.available = self.capacity;
            pool.anchor = scheduled;
            pool.resets += 1;
            debug!(restored, resets = pool.resets, "Rate window reset");
        }
        self.wakeup.notify_waiters();
    }

    fn close(&self) {
        self.pool.lock().closed = true;
        self.wakeup.notify_waiters();
    }

    fn available(&self) -> usize {
        self.pool.lock().available
    }
}

/// Counting gate shared by all submitters in the process.
///
/// Share it behind an `Arc`. Dropping the last handle stops the reset task.
#[derive(Debug)]
pub struct RateLimiter {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Creates a limiter granting `capacity` permits per `window` and starts
    /// its reset task on the current Tokio runtime.
    pub fn new(capacity: usize, window: Duration) -> Result<Self> {
        if capacity == 0 {
            return Err(AppError::InvalidConfiguration(
                "rate limit capacity must be at least 1".into(),
            ));
        }
        if window.is_zero() {
            return Err(AppError::InvalidConfiguration(
                "rate window must be longer than zero".into(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            AppError::InvalidConfiguration(format!("rate limiter needs a Tokio runtime: {}", e))
        })?;

        let anchor = Instant::now();
        let shared = Arc::new(Shared {
            capacity,
            window_duration: window,
            pool: Mutex::new(Pool {
                available: capacity,
                anchor,
                resets: 0,
                closed: false,
            }),
            wakeup: Notify::new(),
        });

        let shutdown = CancellationToken::new();
        let task = runtime.spawn(run_reset_loop(
            shared.clone(),
            anchor + window,
            shutdown.clone(),
        ));

        info!(capacity, window_ms = window.as_millis() as u64, "Rate limiter started");

        Ok(Self {
            shared,
            shutdown,
            reset_task: Mutex::new(Some(task)),
        })
    }

    /// `capacity` permits per single `unit`.
    pub fn per_time_unit(unit: TimeUnit, capacity: usize) -> Result<Self> {
        Self::new(capacity, unit.as_duration())
    }

    /// Waits until a permit is available and takes it.
    ///
    /// Dropping the returned future abandons the wait without consuming a
    /// permit. Fails with [`AppError::Cancelled`] once the limiter is shut down.
    pub async fn acquire(&self) -> Result<RatePermit<'_>> {
        loop {
            // Register before checking so a release or reset between the check
            // and the await still wakes us.
            let notified = self.shared.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.take()? {
                return Ok(RatePermit::new(self));
            }
            notified.await;
        }
    }

    /// Like [`acquire`](Self::acquire), bounded by `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<RatePermit<'_>> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(permit) => permit,
            Err(_) => Err(AppError::AcquireTimeout(timeout)),
        }
    }

    /// Like [`acquire`](Self::acquire), abandoned as soon as `cancel` fires.
    pub async fn acquire_with_cancel(&self, cancel: &CancellationToken) -> Result<RatePermit<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled("caller cancelled permit wait".into())),
            permit = self.acquire() => permit,
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<RatePermit<'_>> {
        match self.shared.take() {
            Ok(true) => Some(RatePermit::new(self)),
            _ => None,
        }
    }

    /// Returns one permit to the pool, never raising it above capacity.
    ///
    /// Safe to call without a matching acquire.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Stops the reset task and closes the pool. Waiting and future
    /// acquirers get [`AppError::Cancelled`].
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.shared.close();
        if let Some(task) = self.reset_task.lock().take() {
            task.abort();
        }
        info!("Rate limiter shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn window(&self) -> Duration {
        self.shared.window_duration
    }

    pub fn available_permits(&self) -> usize {
        self.shared.available()
    }

    pub fn state(&self) -> WindowState {
        WindowState::of(self.available_permits())
    }

    /// Instant of the last reset, or construction time before the first one.
    pub fn window_anchor(&self) -> Instant {
        self.shared.pool.lock().anchor
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let pool = self.shared.pool.lock();
        LimiterSnapshot {
            capacity: self.shared.capacity,
            available: pool.available,
            window: self.shared.window_duration,
            window_anchor: pool.anchor,
            resets: pool.resets,
            state: WindowState::of(pool.available),
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_reset_loop(shared: Arc<Shared>, first_reset: Instant, shutdown: CancellationToken) {
    let mut ticker = interval_at(first_reset, shared.window_duration);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Rate window reset task stopping");
                break;
            }
            scheduled = ticker.tick() => {
                shared.reset(scheduled);
            }
        }
    }
}

/// One granted permit.
///
/// Dropping the guard returns the permit to the pool. Call
/// [`forget`](Self::forget) to keep it consumed until the next window reset.
#[must_use = "dropping a permit releases it immediately"]
#[derive(Debug)]
pub struct RatePermit<'a> {
    limiter: &'a RateLimiter,
    armed: bool,
}

impl<'a> RatePermit<'a> {
    fn new(limiter: &'a RateLimiter) -> Self {
        Self { limiter, armed: true }
    }

    /// Leaves the permit consumed; the next window reset reclaims it.
    pub fn forget(mut self) {
        self.armed = false;
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.limiter.release();
        }
    }
}
