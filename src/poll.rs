//! Bounded retry/poll primitive.
//!
//! A [`Poller`] hands out attempt numbers, sleeping on a [`Clock`] between
//! attempts, until either the attempt budget or the deadline runs out. The
//! caller owns the probe, so probes may borrow a browser session mutably:
//!
//! ```ignore
//! let mut poller = Poller::new(clock, policy);
//! while let Some(attempt) = poller.next().await {
//!     if session.is_visible("#ready").await? {
//!         return Ok(attempt);
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    /// Calendar time, for identifiers and timestamps shown to people.
    fn wall_time(&self) -> DateTime<Utc>;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: sleeping advances time instantly and is recorded.
/// Wall time starts at [`ManualClock::WALL_ORIGIN`], 2024-01-01T00:00:00Z.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Unix seconds of the wall time a fresh clock reports.
    pub const WALL_ORIGIN: i64 = 1_704_067_200;

    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += duration;
    }

    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).elapsed
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sleeps
            .clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn wall_time(&self) -> DateTime<Utc> {
        let origin = DateTime::from_timestamp(Self::WALL_ORIGIN, 0).unwrap_or_default();
        origin + TimeDelta::from_std(self.elapsed()).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub interval: Duration,
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each attempt; 1 keeps it fixed.
    pub backoff_factor: u32,
    pub max_interval: Duration,
    /// No attempt starts at or after this instant.
    pub deadline: Option<Instant>,
}

impl RetryPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff_factor: 1,
            max_interval: interval,
            deadline: None,
        }
    }

    pub fn exponential(initial: Duration, max_interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval: initial,
            max_attempts,
            backoff_factor: 2,
            max_interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    AttemptsExhausted,
    DeadlineReached,
}

pub struct Poller<'a> {
    clock: &'a dyn Clock,
    policy: RetryPolicy,
    attempts: u32,
    delay: Duration,
    stopped: Option<StopReason>,
}

impl<'a> Poller<'a> {
    pub fn new(clock: &'a dyn Clock, policy: RetryPolicy) -> Self {
        let delay = policy.interval;
        Self {
            clock,
            policy,
            attempts: 0,
            delay,
            stopped: None,
        }
    }

    /// Waits for the next attempt slot and returns its 1-based number,
    /// or `None` once the policy is exhausted.
    pub async fn next(&mut self) -> Option<u32> {
        if self.stopped.is_some() {
            return None;
        }
        if self.attempts >= self.policy.max_attempts {
            self.stopped = Some(StopReason::AttemptsExhausted);
            return None;
        }
        if self.attempts > 0 {
            self.clock.sleep(self.delay).await;
            let grown = self.delay.saturating_mul(self.policy.backoff_factor.max(1));
            self.delay = grown.min(self.policy.max_interval.max(self.policy.interval));
        }
        if let Some(deadline) = self.policy.deadline
            && self.clock.now() >= deadline
        {
            self.stopped = Some(StopReason::DeadlineReached);
            return None;
        }
        self.attempts += 1;
        Some(self.attempts)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }
}
