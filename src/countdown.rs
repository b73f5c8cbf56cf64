//! Sender-side countdown for a displayed code.
//!
//! Each displayed code lives in a slot with exactly one countdown task. The
//! countdown is display state only; whether a payload is still valid is
//! always decided by comparing `expiresAt` against the clock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{QrError, Result};
use crate::types::IssuedCode;

/// Below this many seconds the display switches to its warning style.
pub const LOW_TIME_SECS: i64 = 30;

/// Expired slots are kept this long so a display can still show `0:00`,
/// then dropped the next time a code is presented.
pub const SLOT_GRACE_SECS: i64 = 60;

const DEFAULT_TICK: StdDuration = StdDuration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Active { remaining_secs: i64 },
    Expired,
    Cancelled,
}

impl CountdownState {
    pub fn label(&self) -> &'static str {
        match self {
            CountdownState::Active { .. } => "active",
            CountdownState::Expired => "expired",
            CountdownState::Cancelled => "cancelled",
        }
    }
}

/// Whole seconds left, rounded up; never negative.
pub fn seconds_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let ms = (expires_at - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms + 999) / 1000
    }
}

/// `m:ss`, e.g. `4:59`.
pub fn format_mm_ss(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn state_at(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> CountdownState {
    match seconds_remaining(expires_at, now) {
        0 => CountdownState::Expired,
        remaining_secs => CountdownState::Active { remaining_secs },
    }
}

/// Cancellable countdown handle. Must be started inside a tokio runtime.
/// Dropping the handle cancels the countdown.
pub struct Countdown {
    expires_at: DateTime<Utc>,
    state: Arc<watch::Sender<CountdownState>>,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn start(expires_at: DateTime<Utc>, clock: Arc<dyn Clock>) -> Self {
        Self::start_with_tick(expires_at, clock, DEFAULT_TICK)
    }

    pub fn start_with_tick(expires_at: DateTime<Utc>, clock: Arc<dyn Clock>, tick: StdDuration) -> Self {
        let initial = state_at(expires_at, clock.now());
        let (tx, _) = watch::channel(initial);
        let state = Arc::new(tx);
        let task = match initial {
            CountdownState::Active { .. } => Some(tokio::spawn(run(expires_at, clock, tick, state.clone()))),
            _ => None,
        };
        Self { expires_at, state, task }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn state(&self) -> CountdownState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CountdownState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the countdown. Safe to call more than once.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_if_modified(|s| {
            if matches!(s, CountdownState::Active { .. }) {
                *s = CountdownState::Cancelled;
                true
            } else {
                false
            }
        });
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run(
    expires_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    tick: StdDuration,
    state: Arc<watch::Sender<CountdownState>>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        interval.tick().await;
        let next = state_at(expires_at, clock.now());
        let mut cancelled = false;
        state.send_if_modified(|s| {
            // an abort can race with this tick; never overwrite a cancel
            if *s == CountdownState::Cancelled {
                cancelled = true;
                return false;
            }
            if *s == next {
                return false;
            }
            *s = next;
            true
        });
        if cancelled || next == CountdownState::Expired {
            debug!(%expires_at, cancelled, "countdown finished");
            break;
        }
    }
}

struct DisplaySlot {
    code: IssuedCode,
    countdown: Countdown,
}

fn evict_stale(slots: &mut HashMap<Uuid, DisplaySlot>, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::seconds(SLOT_GRACE_SECS);
    let before = slots.len();
    slots.retain(|_, s| s.countdown.expires_at() > cutoff);
    let evicted = before - slots.len();
    if evicted > 0 {
        debug!(evicted, "evicted expired display slots");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub state: CountdownState,
    pub seconds_remaining: i64,
    pub label: String,
    pub low_time: bool,
    pub expires_at: DateTime<Utc>,
}

/// One countdown per displayed code.
pub struct SlotRegistry {
    clock: Arc<dyn Clock>,
    tick: StdDuration,
    slots: Mutex<HashMap<Uuid, DisplaySlot>>,
}

impl SlotRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_tick(clock, DEFAULT_TICK)
    }

    pub fn with_tick(clock: Arc<dyn Clock>, tick: StdDuration) -> Self {
        Self { clock, tick, slots: Mutex::new(HashMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, DisplaySlot>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Shows `code` in `slot`, replacing whatever was there. The previous
    /// countdown is cancelled before the new one is armed. Slots expired for
    /// longer than `SLOT_GRACE_SECS` are evicted on the way.
    pub fn present(&self, slot: Uuid, code: IssuedCode) {
        let mut slots = self.lock();
        if let Some(mut previous) = slots.remove(&slot) {
            previous.countdown.cancel();
            debug!(%slot, nonce = %previous.code.payload.nonce, "replaced displayed code");
        }
        evict_stale(&mut slots, self.clock.now());
        let countdown = Countdown::start_with_tick(code.expires_at, self.clock.clone(), self.tick);
        slots.insert(slot, DisplaySlot { code, countdown });
    }

    pub fn current(&self, slot: Uuid) -> Result<IssuedCode> {
        self.lock().get(&slot).map(|s| s.code.clone()).ok_or(QrError::UnknownSlot)
    }

    pub fn subscribe(&self, slot: Uuid) -> Result<watch::Receiver<CountdownState>> {
        self.lock().get(&slot).map(|s| s.countdown.subscribe()).ok_or(QrError::UnknownSlot)
    }

    pub fn status(&self, slot: Uuid) -> Result<SlotStatus> {
        let slots = self.lock();
        let entry = slots.get(&slot).ok_or(QrError::UnknownSlot)?;
        let expires_at = entry.countdown.expires_at();
        // recomputed from the clock, not taken from the last tick
        let remaining = seconds_remaining(expires_at, self.clock.now());
        let state = match entry.countdown.state() {
            CountdownState::Cancelled => CountdownState::Cancelled,
            _ if remaining == 0 => CountdownState::Expired,
            _ => CountdownState::Active { remaining_secs: remaining },
        };
        Ok(SlotStatus {
            state,
            seconds_remaining: remaining,
            label: format_mm_ss(remaining),
            low_time: remaining < LOW_TIME_SECS,
            expires_at,
        })
    }

    /// Stops the slot's countdown and forgets it.
    pub fn close(&self, slot: Uuid) -> Result<()> {
        let mut removed = self.lock().remove(&slot).ok_or(QrError::UnknownSlot)?;
        removed.countdown.cancel();
        debug!(%slot, "closed display slot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
