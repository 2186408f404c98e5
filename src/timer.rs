//! Cancellable countdown clock for challenge attempts.
//!
//! One ticker task at a time: starting a new countdown always cancels the
//! prior one first, and each task carries a generation stamp so a tick that
//! slips through mid-cancellation cannot touch the next attempt's clock.
//! Time spent accumulates independently of the countdown so statistics work
//! even when the timer feature is disabled for the attempt (stopwatch mode).

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TIMER_TICK_MILLIS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
  Idle,
  Running,
  Paused,
  Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerMode {
  /// Counts remaining down to zero, then expires
  Countdown,
  /// Accumulates spent only; never expires
  Stopwatch,
}

#[derive(Debug)]
struct Shared {
  remaining: u32,
  spent: u32,
  state: TimerState,
  mode: TimerMode,
  /// Bumped on every (re)start; stale ticker slices compare against it
  generation: u64,
}

/// Internal event from the ticker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
  Expired,
}

pub struct TimerEngine {
  shared: Arc<Mutex<Shared>>,
  handle: Option<JoinHandle<()>>,
  events_tx: mpsc::UnboundedSender<TimerEvent>,
  events_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl Default for TimerEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl TimerEngine {
  pub fn new() -> Self {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    Self {
      shared: Arc::new(Mutex::new(Shared {
        remaining: 0,
        spent: 0,
        state: TimerState::Idle,
        mode: TimerMode::Stopwatch,
        generation: 0,
      })),
      handle: None,
      events_tx,
      events_rx,
    }
  }

  /// Begin a countdown from `duration_secs`. Any prior ticker is fully
  /// cancelled first.
  pub fn start(&mut self, duration_secs: u32) {
    self.begin(TimerMode::Countdown, duration_secs, 0, TimerState::Running);
  }

  /// Accumulate time spent without a countdown (timer feature disabled)
  pub fn start_stopwatch(&mut self) {
    self.begin(TimerMode::Stopwatch, 0, 0, TimerState::Running);
  }

  /// Seed a rehydrated attempt's clock. Starts paused; a resumed attempt
  /// never auto-starts its countdown. Zero remaining lands directly in
  /// `Expired` with no ticker.
  pub fn resume_at(&mut self, remaining_secs: u32, spent_secs: u32) {
    if remaining_secs == 0 {
      self.cancel_task();
      let mut shared = self.shared.lock().expect("timer lock poisoned");
      shared.generation += 1;
      shared.remaining = 0;
      shared.spent = spent_secs;
      shared.mode = TimerMode::Countdown;
      shared.state = TimerState::Expired;
      return;
    }
    self.begin(TimerMode::Countdown, remaining_secs, spent_secs, TimerState::Paused);
  }

  fn begin(&mut self, mode: TimerMode, remaining: u32, spent: u32, state: TimerState) {
    self.cancel_task();
    self.drain_events();

    let generation = {
      let mut shared = self.shared.lock().expect("timer lock poisoned");
      shared.generation += 1;
      shared.remaining = remaining;
      shared.spent = spent;
      shared.mode = mode;
      shared.state = state;
      shared.generation
    };

    let shared = Arc::clone(&self.shared);
    let events_tx = self.events_tx.clone();
    // The interval is anchored here, not inside the task, so the first
    // tick lands one full period after start
    let period = Duration::from_millis(TIMER_TICK_MILLIS);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    self.handle = Some(tokio::spawn(async move {
      loop {
        ticker.tick().await;
        let expired = {
          let mut shared = shared.lock().expect("timer lock poisoned");
          if shared.generation != generation {
            // A newer countdown owns the clock now
            break;
          }
          if shared.state != TimerState::Running {
            continue;
          }
          shared.spent += 1;
          if shared.mode == TimerMode::Countdown {
            shared.remaining = shared.remaining.saturating_sub(1);
            if shared.remaining == 0 {
              shared.state = TimerState::Expired;
              true
            } else {
              false
            }
          } else {
            false
          }
        };
        if expired {
          let _ = events_tx.send(TimerEvent::Expired);
          break;
        }
      }
    }));
  }

  /// Set the counters without starting a ticker, for an attempt that is
  /// loaded but not yet entered (e.g. waiting out a session conflict)
  pub fn seed(&mut self, remaining_secs: u32, spent_secs: u32) {
    self.cancel_task();
    self.drain_events();
    let mut shared = self.shared.lock().expect("timer lock poisoned");
    shared.generation += 1;
    shared.remaining = remaining_secs;
    shared.spent = spent_secs;
    shared.mode = TimerMode::Countdown;
    shared.state = TimerState::Idle;
  }

  /// Stop ticking without losing elapsed state
  pub fn pause(&mut self) {
    let mut shared = self.shared.lock().expect("timer lock poisoned");
    if shared.state == TimerState::Running {
      shared.state = TimerState::Paused;
    }
  }

  pub fn resume(&mut self) {
    let mut shared = self.shared.lock().expect("timer lock poisoned");
    if shared.state == TimerState::Paused {
      shared.state = TimerState::Running;
    }
  }

  /// Idempotent; safe to call from any state
  pub fn stop(&mut self) {
    self.cancel_task();
    let mut shared = self.shared.lock().expect("timer lock poisoned");
    shared.generation += 1;
    shared.state = TimerState::Idle;
  }

  /// Drain the expiry signal; true when the countdown hit zero since the
  /// last poll
  pub fn poll_expired(&mut self) -> bool {
    let mut expired = false;
    while let Ok(event) = self.events_rx.try_recv() {
      if event == TimerEvent::Expired {
        expired = true;
      }
    }
    expired
  }

  pub fn remaining(&self) -> u32 {
    self.shared.lock().expect("timer lock poisoned").remaining
  }

  pub fn spent(&self) -> u32 {
    self.shared.lock().expect("timer lock poisoned").spent
  }

  pub fn state(&self) -> TimerState {
    self.shared.lock().expect("timer lock poisoned").state
  }

  fn cancel_task(&mut self) {
    if let Some(handle) = self.handle.take() {
      handle.abort();
    }
  }

  fn drain_events(&mut self) {
    while self.events_rx.try_recv().is_ok() {}
  }
}

impl Drop for TimerEngine {
  fn drop(&mut self) {
    self.cancel_task();
  }
}
