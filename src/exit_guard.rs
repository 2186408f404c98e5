//! Navigation interception while a challenge is in flight.
//!
//! Leaving mid-challenge counts as a wrong answer, so every exit path is
//! funnelled through a confirmation step: stay, or leave after cleanup.
//! UI views declare their safe exit targets up front; the guard never
//! infers intent from rendered text.
//!
//! At most one confirmation flow runs at a time, and the deferred
//! navigation callback fires exactly once, strictly after cleanup.

use std::collections::HashSet;

use crate::coordinator::ChallengeCoordinator;
use crate::domain::ChallengeState;

/// Guard's answer to an exit attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitDecision {
  /// Navigation may proceed immediately
  Allow,
  /// Navigation deferred; show the confirmation dialog
  Confirm,
}

#[derive(Default)]
pub struct ExitGuard {
  safe_targets: HashSet<String>,
  pending_target: Option<String>,
  /// Re-entrant guard: true from the moment a leave starts until the
  /// deferred navigation has run
  executing: bool,
}

impl ExitGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declare a target that never needs confirmation (e.g. the results
  /// page the flow itself navigates to)
  pub fn register_safe_target(&mut self, target: &str) {
    self.safe_targets.insert(target.to_string());
  }

  /// Called for every navigation attempt. Defers it while the challenge
  /// flow is live, unless the target was declared safe or a leave is
  /// already executing.
  pub fn intercept(&mut self, state: ChallengeState, target: &str) -> ExitDecision {
    if self.executing || !state.is_in_flow() || self.safe_targets.contains(target) {
      return ExitDecision::Allow;
    }
    // First intent wins while the dialog is open
    if self.pending_target.is_none() {
      self.pending_target = Some(target.to_string());
    }
    ExitDecision::Confirm
  }

  /// The user chose to stay; drop the pending navigation
  pub fn stay(&mut self) {
    self.pending_target = None;
  }

  pub fn pending_target(&self) -> Option<&str> {
    self.pending_target.as_deref()
  }

  /// The user chose to leave anyway. Runs cleanup through the coordinator
  /// (cancel mid-challenge, or delete the take's attempts from the
  /// feedback screen), then performs the deferred navigation exactly once.
  /// Returns false when a leave is already in progress.
  pub async fn leave<F>(&mut self, coordinator: &mut ChallengeCoordinator, nav: F) -> bool
  where
    F: FnOnce(Option<String>),
  {
    if self.executing {
      return false;
    }
    self.executing = true;

    match coordinator.state() {
      ChallengeState::Submitted => {
        // Abandoning from the feedback screen discards the whole take
        coordinator.abandon_take().await;
      }
      ChallengeState::Active | ChallengeState::Resumed | ChallengeState::Expired => {
        if let Err(e) = coordinator.cancel().await {
          tracing::warn!("Cancel during exit failed: {}", e);
        }
      }
      ChallengeState::Loading => {}
    }

    // Cleanup is done; navigation runs exactly once, and only now
    let target = self.pending_target.take();
    nav(target);
    self.executing = false;
    true
  }

  /// Browser-level unload warning. Synchronous and fire-and-forget: no
  /// network call accompanies it; abandoned locks expire server-side.
  pub fn unload_message(&self, state: ChallengeState) -> Option<&'static str> {
    if state.is_in_flow() && !self.executing {
      Some(crate::config::UNLOAD_WARNING)
    } else {
      None
    }
  }
}
