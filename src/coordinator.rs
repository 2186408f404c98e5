//! Challenge session coordinator: the state machine governing one challenge
//! attempt at a time.
//!
//! Owns the attempt record exclusively. The timer engine, hint ledger,
//! session registry, and adaptive policy are composed here; UI layers and
//! the exit guard only ever request transitions through these operations.
//!
//! States: `Loading -> Active -> {Submitted | Expired}`, plus
//! `Active -> Resumed` on cancel and `{Resumed, Expired} -> Submitted`
//! (always scored failed). `Loading` is the re-entry point after
//! `Submitted` once the take advances.

use std::sync::Arc;

use crate::adaptive::AdaptivePolicy;
use crate::api::{AttemptData, CancelData, ChallengeApi, ChallengeStatistics};
use crate::config::DEFAULT_TIMER_DURATION_SECS;
use crate::domain::{
  AdaptiveFeatures, Answer, AttemptSession, ChallengeState, OtherActiveSession, TakeProgress,
};
use crate::hints::HintLedger;
use crate::marker::{MarkerStore, SessionMarker};
use crate::registry::{Activation, SessionRegistry, SessionValidity};
use crate::timer::TimerEngine;
use crate::validation::validate_challenge;

/// User-visible failure from a coordinator operation
#[derive(Debug)]
pub enum CoordinatorError {
  /// Session lock lost while the attempt was live; the user must restart
  SessionExpired(String),
  /// Operation called in a state that cannot honor it
  InvariantViolation(String),
  /// The challenge could not be loaded (malformed payload, lock failure)
  LoadFailed(String),
}

impl std::fmt::Display for CoordinatorError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CoordinatorError::SessionExpired(m) => write!(f, "Session expired: {}. Please restart the challenge.", m),
      CoordinatorError::InvariantViolation(m) => write!(f, "Unable to proceed: {}", m),
      CoordinatorError::LoadFailed(m) => write!(f, "Failed to load challenge: {}", m),
    }
  }
}

impl std::error::Error for CoordinatorError {}

/// Result of a load request
#[derive(Debug)]
pub enum LoadOutcome {
  /// A challenge is ready; state is Active or Resumed
  Loaded,
  /// The take is finished; navigate to results
  TakeComplete,
  /// Another session holds the lock; resolve before retrying
  Conflict(Vec<OtherActiveSession>),
}

/// Feedback for the UI after a submission lands
#[derive(Debug, Clone)]
pub struct SubmitFeedback {
  pub is_successful: bool,
  pub points: u32,
  pub feedback: String,
  pub time_spent: u32,
  pub hints_used: u32,
  /// The attempt had been cancelled earlier and was scored failed for it
  pub was_cancelled: bool,
  /// The timer ran out before submission
  pub was_expired: bool,
}

#[derive(Debug)]
pub enum SubmitOutcome {
  Submitted(SubmitFeedback),
  /// Duplicate submit (already submitted or mid-submit); nothing happened
  Ignored,
}

/// How to arm the clock once the session lock is granted
#[derive(Debug, Clone, Copy)]
struct EntryPlan {
  rehydrated: bool,
  remaining: u32,
  spent: u32,
}

pub struct ChallengeCoordinator {
  api: Arc<dyn ChallengeApi>,
  registry: SessionRegistry,
  policy: AdaptivePolicy,
  markers: MarkerStore,
  user_id: i64,
  subtopic_id: i64,
  take: TakeProgress,
  attempt: Option<AttemptSession>,
  entry: Option<EntryPlan>,
  hints: HintLedger,
  timer: TimerEngine,
  expiry_warning: bool,
  pending_conflicts: Vec<OtherActiveSession>,
  last_error: Option<String>,
  finalized: bool,
}

impl ChallengeCoordinator {
  pub fn new(
    api: Arc<dyn ChallengeApi>,
    markers: MarkerStore,
    user_id: i64,
    subtopic_id: i64,
    account_adaptive: bool,
  ) -> Self {
    Self {
      registry: SessionRegistry::new(Arc::clone(&api)),
      policy: AdaptivePolicy::new(Arc::clone(&api), account_adaptive),
      api,
      markers,
      user_id,
      subtopic_id,
      take: TakeProgress::default(),
      attempt: None,
      entry: None,
      hints: HintLedger::default(),
      timer: TimerEngine::new(),
      expiry_warning: false,
      pending_conflicts: Vec::new(),
      last_error: None,
      finalized: false,
    }
  }

  /// Seed take progress from the backend and load the first challenge
  pub async fn start(&mut self) -> Result<LoadOutcome, CoordinatorError> {
    match self.api.attempt_count(self.user_id, self.subtopic_id).await {
      Ok(count) => self.take.attempt_count_total = count,
      Err(e) => {
        // Non-fatal: a fresh count of 0 still lets the take proceed
        tracing::warn!("Failed to load attempt count: {}", e);
        self.take.attempt_count_total = 0;
      }
    }
    self.load_next().await
  }

  /// Load the next challenge, or finalize the take after the fifth attempt
  pub async fn load_next(&mut self) -> Result<LoadOutcome, CoordinatorError> {
    if self.take.is_take_complete() {
      self.finalize_take().await;
      return Ok(LoadOutcome::TakeComplete);
    }

    // A stale tick from the previous attempt must never touch this one
    self.timer.stop();
    self.attempt = None;
    self.entry = None;
    self.hints = HintLedger::default();
    self.expiry_warning = false;
    self.pending_conflicts.clear();
    self.last_error = None;

    let next = match self.api.next_challenge(self.user_id, self.subtopic_id).await {
      Ok(next) => next,
      Err(crate::api::ApiError::Decode(e)) => {
        // Malformed payload is fatal to this attempt, not to the flow
        self.last_error = Some(format!("Failed to load challenge: {}", e));
        return Err(CoordinatorError::LoadFailed(e));
      }
      Err(e) => {
        // Graceful degradation: failing to load one challenge should not
        // block finishing the take
        tracing::warn!("Challenge load failed, advancing to results: {}", e);
        self.finalize_take().await;
        return Ok(LoadOutcome::TakeComplete);
      }
    };

    let instance = next.challenge;
    let user_challenge_id = next.user_challenge_id;
    let status = next.user_challenge_status.as_deref().unwrap_or("active").to_string();
    let rehydrated = status == "cancelled";

    let plan = if rehydrated {
      // Resumed attempts keep the challenge's original settings; the
      // adaptive policy applies to fresh attempts only
      let snapshot = match self.api.user_challenge(self.user_id, instance.id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
          tracing::warn!("Failed to fetch cancelled attempt state: {}", e);
          crate::api::UserChallengeSnapshot::default()
        }
      };

      let duration = if instance.timer_duration > 0 {
        instance.timer_duration
      } else {
        DEFAULT_TIMER_DURATION_SECS
      };
      let remaining = duration.saturating_sub(snapshot.time_spent);

      self.hints = HintLedger::replay(&instance, instance.hints_available(), snapshot.hints_used);

      let mut session = AttemptSession::new(instance, user_challenge_id, AdaptiveFeatures::all_enabled());
      session.time_remaining = remaining;
      session.time_spent = snapshot.time_spent;
      session.hints_used = snapshot.hints_used;
      session.answer = snapshot.partial_answer.as_deref().and_then(Answer::from_partial_json);
      self.attempt = Some(session);

      EntryPlan { rehydrated: true, remaining, spent: snapshot.time_spent }
    } else {
      let features = self
        .policy
        .evaluate(self.user_id, self.subtopic_id, self.take.current_take_attempts)
        .await;

      self.hints = HintLedger::new(if features.hints_enabled {
        instance.hints_available()
      } else {
        0
      });

      let duration = if instance.timer_duration > 0 {
        instance.timer_duration
      } else {
        DEFAULT_TIMER_DURATION_SECS
      };
      let remaining = if features.timer_enabled { duration } else { 0 };
      let mut session = AttemptSession::new(instance, user_challenge_id, features);
      session.time_remaining = remaining;
      self.attempt = Some(session);

      EntryPlan { rehydrated: false, remaining, spent: 0 }
    };

    // Snapshots taken before entry (e.g. during a session conflict) must
    // show this attempt's clock, not the previous one's
    self.timer.seed(plan.remaining, plan.spent);

    self.write_marker(&status);

    let challenge_id = self.attempt.as_ref().map(|a| a.instance.id).unwrap_or_default();
    match self.registry.activate(self.user_id, challenge_id).await {
      Activation::Granted { token } => {
        if let Some(attempt) = self.attempt.as_mut() {
          attempt.session_token = Some(token);
        }
        self.enter_attempt(plan);
        Ok(LoadOutcome::Loaded)
      }
      Activation::Conflict { sessions } => {
        // Halt in Loading until the user resolves the other session
        self.entry = Some(plan);
        self.pending_conflicts = sessions.clone();
        Ok(LoadOutcome::Conflict(sessions))
      }
      Activation::Failed => {
        let message = "Failed to start challenge session. Please try again.".to_string();
        self.last_error = Some(message.clone());
        Err(CoordinatorError::LoadFailed(message))
      }
    }
  }

  /// "Close other tabs": release every session held elsewhere, then retry
  /// activation for the already-loaded challenge
  pub async fn force_release_and_retry(&mut self) -> Result<LoadOutcome, CoordinatorError> {
    let Some(plan) = self.entry else {
      return Err(CoordinatorError::InvariantViolation(
        "no challenge waiting on a session conflict".to_string(),
      ));
    };

    self.registry.force_release_all(self.user_id).await;

    let challenge_id = self.attempt.as_ref().map(|a| a.instance.id).unwrap_or_default();
    match self.registry.activate(self.user_id, challenge_id).await {
      Activation::Granted { token } => {
        if let Some(attempt) = self.attempt.as_mut() {
          attempt.session_token = Some(token);
        }
        self.pending_conflicts.clear();
        self.enter_attempt(plan);
        Ok(LoadOutcome::Loaded)
      }
      Activation::Conflict { sessions } => {
        self.pending_conflicts = sessions.clone();
        Ok(LoadOutcome::Conflict(sessions))
      }
      Activation::Failed => {
        let message = "Failed to start challenge session. Please try again.".to_string();
        self.last_error = Some(message.clone());
        Err(CoordinatorError::LoadFailed(message))
      }
    }
  }

  fn enter_attempt(&mut self, plan: EntryPlan) {
    self.entry = None;
    let Some(attempt) = self.attempt.as_mut() else {
      return;
    };
    if plan.rehydrated {
      // A resumed attempt never auto-starts its clock
      self.timer.resume_at(plan.remaining, plan.spent);
      attempt.state = ChallengeState::Resumed;
    } else {
      if attempt.features.timer_enabled {
        self.timer.start(plan.remaining);
      } else {
        self.timer.start_stopwatch();
      }
      attempt.state = ChallengeState::Active;
    }
  }

  /// Drain timer events. An expiry while Active moves the attempt to
  /// Expired; the warning flag is raised only when the timer feature was
  /// armed for this attempt. Expiry never auto-submits.
  pub fn poll_timer(&mut self) {
    if !self.timer.poll_expired() {
      return;
    }
    let Some(attempt) = self.attempt.as_mut() else {
      return;
    };
    if attempt.state == ChallengeState::Active {
      attempt.state = ChallengeState::Expired;
      if attempt.features.timer_enabled {
        self.expiry_warning = true;
      }
    }
  }

  /// Reveal the next hint; no state transition
  pub fn use_hint(&mut self) -> Option<String> {
    let attempt = self.attempt.as_ref()?;
    self
      .hints
      .reveal(&attempt.instance, attempt.state)
      .map(str::to_string)
  }

  /// Record the user's in-progress answer (persisted on cancel)
  pub fn set_answer(&mut self, answer: Answer) {
    if let Some(attempt) = self.attempt.as_mut() {
      attempt.answer = Some(answer);
    }
  }

  /// Submit the current attempt. Resumed and expired attempts are always
  /// scored failed regardless of the stored answer.
  pub async fn submit(&mut self) -> Result<SubmitOutcome, CoordinatorError> {
    self.poll_timer();

    let Some(attempt) = self.attempt.as_ref() else {
      let message = "challenge not properly initialized".to_string();
      self.last_error = Some(message.clone());
      return Err(CoordinatorError::InvariantViolation(message));
    };

    if attempt.state == ChallengeState::Submitted || attempt.is_submitting {
      return Ok(SubmitOutcome::Ignored);
    }
    if attempt.state == ChallengeState::Loading {
      let message = "challenge session not yet started".to_string();
      self.last_error = Some(message.clone());
      return Err(CoordinatorError::InvariantViolation(message));
    }

    let was = attempt.state;
    let challenge_id = attempt.instance.id;
    let token = attempt.session_token.clone();

    // Synchronous guard before the first await: a second rapid submit
    // must see it already set
    if let Some(attempt) = self.attempt.as_mut() {
      attempt.is_submitting = true;
    }

    // Only a live attempt holds a lock worth checking; Resumed/Expired
    // submissions proceed without one
    if was == ChallengeState::Active {
      match self.registry.validate(self.user_id, challenge_id, token.as_deref()).await {
        SessionValidity::Valid => {}
        SessionValidity::Invalid { reason } => {
          if let Some(attempt) = self.attempt.as_mut() {
            attempt.is_submitting = false;
          }
          self.last_error = Some(format!("Session expired: {}", reason));
          return Err(CoordinatorError::SessionExpired(reason));
        }
      }
    }

    self.timer.stop();
    let spent = self.timer.spent();
    let hints_used = self.hints.used();

    let attempt = self.attempt.as_ref().expect("attempt present through submit");
    let features = attempt.features;
    let result = validate_challenge(attempt.answer.as_ref(), &attempt.instance);

    let forced = was.forces_failure();
    let is_successful = !forced && result.is_correct;
    let points = if forced { 0 } else { result.points };

    // Disabled features report zero in the persisted record
    let time_spent = if features.timer_enabled { spent } else { 0 };
    let hints_spent = if features.hints_enabled { hints_used } else { 0 };

    let data = AttemptData {
      user_challenge_id: attempt.user_challenge_id,
      user_answer: attempt.answer.as_ref().map(Answer::to_json).unwrap_or_default(),
      time_spent,
      hints_used: hints_spent,
      is_successful,
      points,
      timer_enabled: features.timer_enabled,
      hints_enabled: features.hints_enabled,
    };
    let mode = attempt.instance.mode;
    let user_challenge_id = attempt.user_challenge_id;

    if let Err(e) = self.api.submit_attempt(&data).await {
      tracing::warn!("Attempt submission failed, retrying with fallback record: {}", e);
      let fallback = AttemptData {
        user_challenge_id,
        user_answer: String::new(),
        time_spent,
        hints_used: hints_spent,
        is_successful: false,
        points: 0,
        timer_enabled: features.timer_enabled,
        hints_enabled: features.hints_enabled,
      };
      if let Err(e) = self.api.submit_attempt(&fallback).await {
        // Surface the error but still advance; the user must never be
        // stuck on the submission screen
        tracing::warn!("Fallback attempt submission also failed: {}", e);
        self.last_error = Some("Failed to record attempt. Your progress may be incomplete.".to_string());
      }
    }

    let stats = ChallengeStatistics {
      mode: mode.as_str().to_string(),
      is_correct: is_successful,
      time_spent,
      completed_type: true,
    };
    if let Err(e) = self.api.record_statistics(&stats).await {
      tracing::warn!("Statistics update failed (non-fatal): {}", e);
    }

    // Resumed/expired attempts never held a live lock
    if was == ChallengeState::Active {
      self.registry.deactivate(self.user_id, challenge_id).await;
    }

    self.remove_marker();

    if let Some(attempt) = self.attempt.as_mut() {
      attempt.state = ChallengeState::Submitted;
      attempt.is_submitting = false;
      attempt.session_token = None;
      attempt.time_spent = spent;
      attempt.hints_used = hints_used;
    }
    self.expiry_warning = false;

    // The next load must re-evaluate against fresh history
    self
      .policy
      .invalidate(self.user_id, self.subtopic_id, self.take.current_take_attempts);

    let feedback = SubmitFeedback {
      is_successful,
      points,
      feedback: if was == ChallengeState::Resumed {
        "This challenge was marked as incorrect because you cancelled it earlier. Leaving a \
         challenge counts as a wrong answer regardless of your progress."
          .to_string()
      } else if was == ChallengeState::Expired {
        "This challenge was marked as incorrect because you ran out of time. When the timer \
         expires, your answer counts as wrong regardless of your progress."
          .to_string()
      } else {
        result.feedback
      },
      time_spent: spent,
      hints_used,
      was_cancelled: was == ChallengeState::Resumed,
      was_expired: was == ChallengeState::Expired,
    };

    Ok(SubmitOutcome::Submitted(feedback))
  }

  /// Count the submission toward the take and move on: load the next
  /// challenge, or finalize after the fifth
  pub async fn advance_after_feedback(&mut self) -> Result<LoadOutcome, CoordinatorError> {
    if let Ok(count) = self.api.attempt_count(self.user_id, self.subtopic_id).await {
      self.take.attempt_count_total = count;
    }
    self.take.current_take_attempts += 1;
    self.load_next().await
  }

  /// Persist partial progress as a cancellation marker and park the
  /// attempt in Resumed. A later load for this subtopic rehydrates it.
  pub async fn cancel(&mut self) -> Result<(), CoordinatorError> {
    self.poll_timer();
    self.timer.stop();

    let Some(attempt) = self.attempt.as_ref() else {
      return Ok(());
    };
    if !matches!(
      attempt.state,
      ChallengeState::Active | ChallengeState::Resumed | ChallengeState::Expired
    ) {
      return Ok(());
    }

    let was = attempt.state;
    let challenge_id = attempt.instance.id;
    let user_challenge_id = attempt.user_challenge_id;
    let features = attempt.features;
    let spent = self.timer.spent();
    let hints_used = self.hints.used();
    let partial_answer = attempt.answer.as_ref().map(Answer::to_json);
    let mode = attempt.instance.mode;

    let cancel = CancelData {
      time_spent: spent,
      hints_used,
      partial_answer,
      timer_enabled: features.timer_enabled,
      hints_enabled: features.hints_enabled,
    };

    if let Err(e) = self.api.cancel_challenge(self.user_id, challenge_id, &cancel).await {
      tracing::warn!("Cancellation failed, recording fallback attempt: {}", e);
      let fallback = AttemptData {
        user_challenge_id,
        user_answer: String::new(),
        time_spent: spent,
        hints_used,
        is_successful: false,
        points: 0,
        timer_enabled: features.timer_enabled,
        hints_enabled: features.hints_enabled,
      };
      if let Err(e) = self.api.submit_attempt(&fallback).await {
        tracing::warn!("Fallback attempt record also failed: {}", e);
        self.last_error = Some("Failed to record cancellation.".to_string());
      }
    }

    let stats = ChallengeStatistics {
      mode: mode.as_str().to_string(),
      is_correct: false,
      time_spent: spent,
      completed_type: false,
    };
    if let Err(e) = self.api.record_statistics(&stats).await {
      tracing::warn!("Statistics update failed (non-fatal): {}", e);
    }

    if was == ChallengeState::Active {
      self.registry.deactivate(self.user_id, challenge_id).await;
    }

    self.write_marker("cancelled");

    if let Some(attempt) = self.attempt.as_mut() {
      attempt.state = ChallengeState::Resumed;
      attempt.session_token = None;
      attempt.time_spent = spent;
      attempt.hints_used = hints_used;
    }
    self.expiry_warning = false;

    Ok(())
  }

  /// Delete every attempt recorded in this take (abandoning from the
  /// feedback screen) and reset. Best-effort.
  pub async fn abandon_take(&mut self) {
    self.timer.stop();
    if let Err(e) = self.api.delete_take_attempts(self.user_id, self.subtopic_id).await {
      tracing::warn!("Failed to delete take attempts: {}", e);
    }
    self.remove_marker();
    self.attempt = None;
    self.entry = None;
    self.hints = HintLedger::default();
  }

  /// Explicit lifecycle reset, invoked by the owning session manager on
  /// logout or teardown
  pub async fn dispose(&mut self) {
    self.timer.stop();
    if let Some(attempt) = self.attempt.as_ref() {
      if attempt.session_token.is_some() {
        self.registry.deactivate(self.user_id, attempt.instance.id).await;
      }
    }
    self.remove_marker();
    self.attempt = None;
    self.entry = None;
    self.hints = HintLedger::default();
    self.pending_conflicts.clear();
    self.expiry_warning = false;
    self.last_error = None;
    self.policy.clear();
  }

  async fn finalize_take(&mut self) {
    if self.finalized {
      return;
    }
    self.finalized = true;
    self.timer.stop();
    if let Err(e) = self
      .api
      .complete_subtopic_component(self.user_id, self.subtopic_id)
      .await
    {
      // Still navigate to results; completion is retried on a later visit
      tracing::warn!("Failed to mark subtopic challenge component complete: {}", e);
    }
    self.remove_marker();
    self.attempt = None;
    self.entry = None;
    self.hints = HintLedger::default();
  }

  fn write_marker(&self, status: &str) {
    let Some(attempt) = self.attempt.as_ref() else {
      return;
    };
    let marker = SessionMarker {
      user_id: self.user_id,
      subtopic_id: self.subtopic_id,
      challenge_id: attempt.instance.id,
      user_challenge_id: attempt.user_challenge_id,
      status: status.to_string(),
      start_time: chrono::Utc::now(),
    };
    if let Err(e) = self.markers.put(&marker) {
      tracing::warn!("Failed to write session marker: {}", e);
    }
  }

  fn remove_marker(&self) {
    if let Err(e) = self.markers.remove(self.user_id, self.subtopic_id) {
      tracing::warn!("Failed to remove session marker: {}", e);
    }
  }

  // ---- read model ----

  pub fn state(&self) -> ChallengeState {
    self
      .attempt
      .as_ref()
      .map(|a| a.state)
      .unwrap_or(ChallengeState::Loading)
  }

  /// Snapshot of the live attempt with clock and ledger values merged in
  pub fn session(&self) -> Option<AttemptSession> {
    self.attempt.as_ref().map(|a| {
      let mut snapshot = a.clone();
      snapshot.time_remaining = self.timer.remaining();
      snapshot.time_spent = self.timer.spent();
      snapshot.hints_used = self.hints.used();
      snapshot.revealed_hints = self.hints.revealed().to_vec();
      snapshot
    })
  }

  pub fn take_progress(&self) -> TakeProgress {
    self.take
  }

  pub fn is_take_finalized(&self) -> bool {
    self.finalized
  }

  /// Conflicting sessions blocking activation, if any
  pub fn other_sessions(&self) -> &[OtherActiveSession] {
    &self.pending_conflicts
  }

  /// True once the countdown expired while the timer feature was armed;
  /// cleared by acknowledgement or the next load
  pub fn expiry_warning(&self) -> bool {
    self.expiry_warning
  }

  pub fn acknowledge_expiry_warning(&mut self) {
    self.expiry_warning = false;
  }

  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }

  pub fn pause_timer(&mut self) {
    self.timer.pause();
  }

  pub fn resume_timer(&mut self) {
    self.timer.resume();
  }
}
