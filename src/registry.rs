//! Session registry client: one exclusively-held token per user prevents
//! concurrent attempts across tabs.
//!
//! All backend failures are converted to safe result variants at this
//! boundary; nothing here propagates an error into the coordinator.

use std::sync::Arc;

use crate::api::ChallengeApi;
use crate::domain::OtherActiveSession;

/// Outcome of requesting the lock
#[derive(Debug, Clone)]
pub enum Activation {
  Granted { token: String },
  /// Another session is active in a different subtopic; the user must
  /// resolve it before this attempt can start
  Conflict { sessions: Vec<OtherActiveSession> },
  /// The request itself failed; treated as a load error by the caller
  Failed,
}

/// Outcome of checking the lock before submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidity {
  Valid,
  Invalid { reason: String },
}

pub struct SessionRegistry {
  api: Arc<dyn ChallengeApi>,
}

impl SessionRegistry {
  pub fn new(api: Arc<dyn ChallengeApi>) -> Self {
    Self { api }
  }

  pub async fn activate(&self, user_id: i64, challenge_id: i64) -> Activation {
    match self.api.activate_session(user_id, challenge_id).await {
      Ok(response) => {
        if response.success {
          match response.session_token {
            Some(token) => Activation::Granted { token },
            None => {
              tracing::warn!("Session activation succeeded without a token");
              Activation::Failed
            }
          }
        } else if !response.existing_sessions.is_empty() {
          Activation::Conflict { sessions: response.existing_sessions }
        } else {
          tracing::warn!(
            "Session activation denied: {}",
            response.message.as_deref().unwrap_or("no reason given")
          );
          Activation::Failed
        }
      }
      Err(e) => {
        tracing::warn!("Session activation failed: {}", e);
        Activation::Failed
      }
    }
  }

  /// Check a held token before submission. A missing token is invalid
  /// without a network round-trip.
  pub async fn validate(
    &self,
    user_id: i64,
    challenge_id: i64,
    token: Option<&str>,
  ) -> SessionValidity {
    let Some(token) = token else {
      return SessionValidity::Invalid { reason: "No active session".to_string() };
    };

    match self.api.validate_session(user_id, challenge_id, token).await {
      Ok(check) if check.valid => SessionValidity::Valid,
      Ok(check) => SessionValidity::Invalid {
        reason: check.message.unwrap_or_else(|| "Invalid session token".to_string()),
      },
      Err(e) => {
        tracing::warn!("Session validation failed: {}", e);
        SessionValidity::Invalid { reason: "Session validation failed".to_string() }
      }
    }
  }

  /// Release the lock after a terminal transition. Best-effort: the lock
  /// expires server-side anyway, so failures are swallowed.
  pub async fn deactivate(&self, user_id: i64, challenge_id: i64) {
    if let Err(e) = self.api.deactivate_session(user_id, challenge_id).await {
      tracing::debug!("Session deactivation failed (non-fatal): {}", e);
    }
  }

  /// Administrative override for "close other tabs"
  pub async fn force_release_all(&self, user_id: i64) -> bool {
    match self.api.force_deactivate_all(user_id).await {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!("Force session release failed: {}", e);
        false
      }
    }
  }
}
