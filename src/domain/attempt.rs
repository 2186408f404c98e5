use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Answer, ChallengeInstance};

/// Lifecycle state of one challenge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
  Loading,
  Active,
  /// Entered after a cancel; later reloaded with partial state restored
  Resumed,
  Expired,
  Submitted,
}

impl ChallengeState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Loading => "loading",
      Self::Active => "active",
      Self::Resumed => "resumed",
      Self::Expired => "expired",
      Self::Submitted => "submitted",
    }
  }

  /// True while the user is still inside the challenge flow, feedback
  /// screen included. The exit guard intercepts navigation in these states.
  pub fn is_in_flow(&self) -> bool {
    matches!(self, Self::Active | Self::Resumed | Self::Expired | Self::Submitted)
  }

  /// Terminal submission paths from these states are always scored failed
  pub fn forces_failure(&self) -> bool {
    matches!(self, Self::Resumed | Self::Expired)
  }
}

/// Per-attempt feature flags decided by the adaptive policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdaptiveFeatures {
  pub timer_enabled: bool,
  pub hints_enabled: bool,
}

impl AdaptiveFeatures {
  pub fn all_enabled() -> Self {
    Self { timer_enabled: true, hints_enabled: true }
  }

  pub fn all_disabled() -> Self {
    Self::default()
  }
}

/// One row of attempt history, as returned by the last-attempts endpoint.
/// Ordered oldest-first within the window so trailing streaks fall out of a
/// simple fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptOutcome {
  pub is_successful: bool,
  #[serde(default)]
  pub points: u32,
  #[serde(default)]
  pub time_spent: u32,
}

/// Conflicting session held elsewhere, surfaced when activation is denied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherActiveSession {
  pub challenge_id: i64,
  pub subtopic_id: i64,
  pub subtopic_name: String,
  pub started_at: DateTime<Utc>,
}

/// Progress through the fixed-size batch of challenges per subtopic visit
#[derive(Debug, Clone, Copy, Default)]
pub struct TakeProgress {
  /// Lifetime attempt count from the backend, seeds the adaptive policy
  pub attempt_count_total: u32,
  /// Attempts completed in the current take, 0..=CHALLENGES_PER_TAKE
  pub current_take_attempts: u32,
}

impl TakeProgress {
  pub fn is_take_complete(&self) -> bool {
    self.current_take_attempts >= crate::config::CHALLENGES_PER_TAKE
  }
}

/// Mutable record of solving one ChallengeInstance. Owned exclusively by
/// the coordinator; other components only ever request transitions through
/// the coordinator's operations.
#[derive(Debug, Clone)]
pub struct AttemptSession {
  pub instance: ChallengeInstance,
  /// Server-assigned correlation id for this user/challenge pairing
  pub user_challenge_id: i64,
  pub state: ChallengeState,
  /// Lock token issued by the session registry; None when no session held
  pub session_token: Option<String>,
  pub time_remaining: u32,
  pub time_spent: u32,
  pub hints_used: u32,
  pub revealed_hints: Vec<String>,
  pub answer: Option<Answer>,
  /// Guards against duplicate concurrent submits
  pub is_submitting: bool,
  pub features: AdaptiveFeatures,
}

impl AttemptSession {
  pub fn new(instance: ChallengeInstance, user_challenge_id: i64, features: AdaptiveFeatures) -> Self {
    let time_remaining = if features.timer_enabled { instance.timer_duration } else { 0 };
    Self {
      instance,
      user_challenge_id,
      state: ChallengeState::Loading,
      session_token: None,
      time_remaining,
      time_spent: 0,
      hints_used: 0,
      revealed_hints: Vec::new(),
      answer: None,
      is_submitting: false,
      features,
    }
  }
}
