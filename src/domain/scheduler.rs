//! Refresh scheduler. Coalesces refresh triggers into at most one active
//! fleet refresh plus at most one follow-up.
//!
//! ```text
//!   Idle ──trigger──▶ Refreshing ──trigger──▶ PendingRefresh
//!    ▲                  │    ▲                     │
//!    └──── done ────────┘    └──────── done ───────┘
//! ```
//!
//! A single driver task runs refreshes back to back while one is pending.
//! `reset()` aborts the driver and the periodic timer; whatever the aborted
//! generation was doing is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::fleet_aggregator::FleetAggregator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Refreshing,
    PendingRefresh,
}

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Startup,
    Periodic,
    Manual,
    PostMutation,
}

struct Inner {
    state: SchedulerState,
    driver: Option<JoinHandle<()>>,
    ticker: Option<JoinHandle<()>>,
    /// Bumped by every reset. A driver only touches `state` and `driver`
    /// while the epoch it was spawned in is still current.
    epoch: u64,
}

struct Shared {
    aggregator: Arc<FleetAggregator>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SchedulerState>,
    completed: AtomicU64,
}

pub struct RefreshScheduler {
    shared: Arc<Shared>,
}

impl RefreshScheduler {
    pub fn new(aggregator: Arc<FleetAggregator>) -> Self {
        let (state_tx, _rx) = watch::channel(SchedulerState::Idle);
        Self {
            shared: Arc::new(Shared {
                aggregator,
                inner: Mutex::new(Inner {
                    state: SchedulerState::Idle,
                    driver: None,
                    ticker: None,
                    epoch: 0,
                }),
                state_tx,
                completed: AtomicU64::new(0),
            }),
        }
    }

    /// Request a refresh. Never cancels an in-flight refresh; returns the
    /// state after the trigger was applied. Must be called within a tokio
    /// runtime.
    pub fn trigger(&self, reason: RefreshTrigger) -> SchedulerState {
        self.shared.trigger(reason)
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.lock().state
    }

    pub fn watch_state(&self) -> watch::Receiver<SchedulerState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of refreshes that ran to completion.
    pub fn refreshes_completed(&self) -> u64 {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Resolve once no refresh is running or pending.
    pub async fn wait_idle(&self) {
        let mut rx = self.watch_state();
        // The sender lives in `shared`, which outlives this borrow.
        let _ = rx.wait_for(|s| *s == SchedulerState::Idle).await;
    }

    /// Trigger a refresh every `interval`, starting immediately. Replaces any
    /// previous timer.
    pub fn start_periodic(&self, interval: Duration) {
        let shared = self.shared.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut first = true;
            loop {
                interval.tick().await;
                let reason = if first {
                    RefreshTrigger::Startup
                } else {
                    RefreshTrigger::Periodic
                };
                first = false;
                shared.trigger(reason);
            }
        });

        let mut inner = self.shared.lock();
        if let Some(previous) = inner.ticker.replace(ticker) {
            previous.abort();
        }
        info!(interval_secs = interval.as_secs_f64(), "periodic fleet refresh started");
    }

    /// Stop the timer, abandon any in-flight refresh and return to `Idle`.
    pub fn reset(&self) {
        let mut inner = self.shared.lock();
        if let Some(ticker) = inner.ticker.take() {
            ticker.abort();
        }
        let aborted = match inner.driver.take() {
            Some(driver) => {
                driver.abort();
                true
            }
            None => false,
        };
        inner.epoch += 1;
        inner.state = SchedulerState::Idle;
        self.shared.state_tx.send_replace(SchedulerState::Idle);
        info!(aborted_refresh = aborted, "refresh scheduler reset");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.reset();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a holder panicked; the state is a
        // plain enum plus handles and stays usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, inner: &mut Inner, state: SchedulerState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn trigger(self: &Arc<Self>, reason: RefreshTrigger) -> SchedulerState {
        let mut inner = self.lock();
        match inner.state {
            SchedulerState::Idle => {
                debug!(?reason, "starting fleet refresh");
                self.set_state(&mut inner, SchedulerState::Refreshing);
                let epoch = inner.epoch;
                inner.driver = Some(tokio::spawn(self.clone().drive(epoch)));
            }
            SchedulerState::Refreshing => {
                debug!(?reason, "refresh in flight, queueing one follow-up");
                self.set_state(&mut inner, SchedulerState::PendingRefresh);
            }
            SchedulerState::PendingRefresh => {
                debug!(?reason, "follow-up refresh already queued");
            }
        }
        inner.state
    }

    /// Driver loop: refresh, then either go idle or run the queued follow-up.
    async fn drive(self: Arc<Self>, epoch: u64) {
        loop {
            let outcome = self.aggregator.refresh().await;
            debug!(
                generation = outcome.generation,
                published = outcome.published,
                nodes = outcome.node_count,
                registry_error = ?outcome.registry_error,
                "scheduled refresh finished"
            );
            if !self.finish_refresh(epoch) {
                break;
            }
        }
    }

    /// Settle the state after a driver's refresh. Returns whether the driver
    /// should run the queued follow-up. A driver from before the last reset
    /// leaves everything to the current one.
    fn finish_refresh(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(epoch, current = inner.epoch, "refresh finished after a reset, ignoring");
            return false;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if inner.state == SchedulerState::PendingRefresh {
            self.set_state(&mut inner, SchedulerState::Refreshing);
            true
        } else {
            self.set_state(&mut inner, SchedulerState::Idle);
            inner.driver = None;
            false
        }
    }
}
