//! Backend contract for the challenge flow.
//!
//! The coordinator is a pure consumer of a REST backend; this trait is the
//! seam. Production uses [`http::HttpChallengeApi`]; tests use the
//! in-memory fake in `crate::testing`.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{AttemptOutcome, ChallengeInstance, OtherActiveSession};

/// Error from a backend call
#[derive(Debug)]
pub enum ApiError {
  /// Request reached the server but came back non-2xx
  Http { status: u16, message: String },
  /// Request never completed (DNS, connect, timeout)
  Network(String),
  /// Response body did not match the expected shape
  Decode(String),
}

impl std::fmt::Display for ApiError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ApiError::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
      ApiError::Network(e) => write!(f, "Network error: {}", e),
      ApiError::Decode(e) => write!(f, "Decode error: {}", e),
    }
  }
}

impl std::error::Error for ApiError {}

/// Response of the next-challenge endpoint. A `cancelled` status signals a
/// resumable attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextChallenge {
  pub challenge: ChallengeInstance,
  pub user_challenge_id: i64,
  #[serde(default)]
  pub user_challenge_status: Option<String>,
}

/// Server-persisted partial state of a cancelled attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChallengeSnapshot {
  #[serde(default)]
  pub time_spent: u32,
  #[serde(default)]
  pub hints_used: u32,
  #[serde(default)]
  pub partial_answer: Option<String>,
}

/// Outcome of a session activation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionActivation {
  pub success: bool,
  #[serde(default)]
  pub session_token: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  /// Sessions held in other subtopics that block this activation
  #[serde(default)]
  pub existing_sessions: Vec<OtherActiveSession>,
}

/// Outcome of a session validation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheck {
  pub valid: bool,
  #[serde(default)]
  pub message: Option<String>,
}

/// Terminal attempt record persisted on submit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptData {
  pub user_challenge_id: i64,
  pub user_answer: String,
  pub time_spent: u32,
  pub hints_used: u32,
  pub is_successful: bool,
  pub points: u32,
  pub timer_enabled: bool,
  pub hints_enabled: bool,
}

/// Cancellation marker persisted when the user leaves mid-challenge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelData {
  pub time_spent: u32,
  pub hints_used: u32,
  pub partial_answer: Option<String>,
  pub timer_enabled: bool,
  pub hints_enabled: bool,
}

/// Per-mode statistics payload recorded after submit and cancel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeStatistics {
  #[serde(rename = "type")]
  pub mode: String,
  pub is_correct: bool,
  pub time_spent: u32,
  /// True when the challenge reached submission, false when cancelled
  pub completed_type: bool,
}

/// REST operations the coordinator invokes. Implementations must not panic
/// on backend failures; every fallible call returns `ApiError`.
#[async_trait]
pub trait ChallengeApi: Send + Sync {
  /// Fetch the next challenge for this user and subtopic
  async fn next_challenge(&self, user_id: i64, subtopic_id: i64) -> Result<NextChallenge, ApiError>;

  /// Fetch persisted partial state for a cancelled attempt
  async fn user_challenge(
    &self,
    user_id: i64,
    challenge_id: i64,
  ) -> Result<UserChallengeSnapshot, ApiError>;

  async fn activate_session(
    &self,
    user_id: i64,
    challenge_id: i64,
  ) -> Result<SessionActivation, ApiError>;

  async fn validate_session(
    &self,
    user_id: i64,
    challenge_id: i64,
    session_token: &str,
  ) -> Result<SessionCheck, ApiError>;

  async fn deactivate_session(&self, user_id: i64, challenge_id: i64) -> Result<(), ApiError>;

  async fn force_deactivate_all(&self, user_id: i64) -> Result<(), ApiError>;

  async fn submit_attempt(&self, attempt: &AttemptData) -> Result<(), ApiError>;

  async fn cancel_challenge(
    &self,
    user_id: i64,
    challenge_id: i64,
    cancel: &CancelData,
  ) -> Result<(), ApiError>;

  /// Lifetime attempt counter for this user and subtopic
  async fn attempt_count(&self, user_id: i64, subtopic_id: i64) -> Result<u32, ApiError>;

  /// Most recent attempts, oldest-first within the window
  async fn last_attempts(
    &self,
    user_id: i64,
    subtopic_id: i64,
    limit: u32,
  ) -> Result<Vec<AttemptOutcome>, ApiError>;

  /// Mark the subtopic's challenge component finished
  async fn complete_subtopic_component(
    &self,
    user_id: i64,
    subtopic_id: i64,
  ) -> Result<(), ApiError>;

  /// Delete every attempt recorded for the current take (abandon from the
  /// feedback screen)
  async fn delete_take_attempts(&self, user_id: i64, subtopic_id: i64) -> Result<u32, ApiError>;

  /// Record per-mode statistics; callers treat failures as non-fatal
  async fn record_statistics(&self, stats: &ChallengeStatistics) -> Result<(), ApiError>;
}
