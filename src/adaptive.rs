//! Adaptive feature policy: decides per attempt whether the timer and hint
//! features are armed, from the trailing success/failure streak in the last
//! two attempts for the subtopic.
//!
//! Non-adaptive accounts always get both features. The first challenge of a
//! fresh take gets neither (cold start). Network failure fails safe: both
//! disabled, error recorded, caller unaffected.

use std::collections::HashMap;
use std::sync::Arc;

use crate::api::ChallengeApi;
use crate::config::{ADAPTIVE_HISTORY_WINDOW, ADAPTIVE_STREAK_THRESHOLD};
use crate::domain::{AdaptiveFeatures, AttemptOutcome};

/// Trailing streak counters over an attempt window. Each outcome resets the
/// opposite counter, so the final values after the fold are the streaks at
/// the most recent end of the window (input is oldest-first).
pub fn compute_streaks(attempts: &[AttemptOutcome]) -> (u32, u32) {
  let mut correct = 0;
  let mut incorrect = 0;
  for attempt in attempts {
    if attempt.is_successful {
      correct += 1;
      incorrect = 0;
    } else {
      incorrect += 1;
      correct = 0;
    }
  }
  (correct, incorrect)
}

/// Pure flag decision from streak counters
pub fn features_for_streaks(correct: u32, incorrect: u32) -> AdaptiveFeatures {
  if correct >= ADAPTIVE_STREAK_THRESHOLD {
    // Reward mastery with pressure, remove the crutch
    AdaptiveFeatures { timer_enabled: true, hints_enabled: false }
  } else if incorrect >= ADAPTIVE_STREAK_THRESHOLD {
    // Remove pressure, add support
    AdaptiveFeatures { timer_enabled: false, hints_enabled: true }
  } else {
    AdaptiveFeatures::all_disabled()
  }
}

type CacheKey = (i64, i64, u32);

pub struct AdaptivePolicy {
  api: Arc<dyn ChallengeApi>,
  /// True when the account participates in adaptive difficulty
  account_adaptive: bool,
  cache: HashMap<CacheKey, AdaptiveFeatures>,
  last_error: Option<String>,
}

impl AdaptivePolicy {
  pub fn new(api: Arc<dyn ChallengeApi>, account_adaptive: bool) -> Self {
    Self { api, account_adaptive, cache: HashMap::new(), last_error: None }
  }

  /// Decide the feature flags for the next attempt. Cached per exact
  /// `(user, subtopic, current_take_attempts)` key until invalidated.
  pub async fn evaluate(
    &mut self,
    user_id: i64,
    subtopic_id: i64,
    current_take_attempts: u32,
  ) -> AdaptiveFeatures {
    self.last_error = None;

    if !self.account_adaptive {
      return AdaptiveFeatures::all_enabled();
    }

    if current_take_attempts == 0 {
      // Cold start of a new take
      return AdaptiveFeatures::all_disabled();
    }

    let key = (user_id, subtopic_id, current_take_attempts);
    if let Some(cached) = self.cache.get(&key) {
      return *cached;
    }

    let features = match self
      .api
      .last_attempts(user_id, subtopic_id, ADAPTIVE_HISTORY_WINDOW)
      .await
    {
      Ok(attempts) => {
        let (correct, incorrect) = compute_streaks(&attempts);
        features_for_streaks(correct, incorrect)
      }
      Err(e) => {
        tracing::warn!("Adaptive history fetch failed, disabling features: {}", e);
        self.last_error = Some(e.to_string());
        AdaptiveFeatures::all_disabled()
      }
    };

    self.cache.insert(key, features);
    features
  }

  /// Drop one cached decision; called after a submission so the next load
  /// re-evaluates against fresh history
  pub fn invalidate(&mut self, user_id: i64, subtopic_id: i64, current_take_attempts: u32) {
    self.cache.remove(&(user_id, subtopic_id, current_take_attempts));
  }

  /// Drop everything; called when the subtopic changes
  pub fn clear(&mut self) {
    self.cache.clear();
    self.last_error = None;
  }

  /// Non-fatal error from the most recent evaluation, if any
  pub fn last_error(&self) -> Option<&str> {
    self.last_error.as_deref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::InMemoryApi;

  fn outcome(is_successful: bool) -> AttemptOutcome {
    AttemptOutcome { is_successful, points: 0, time_spent: 0 }
  }

  #[test]
  fn test_streaks_two_failures() {
    let (correct, incorrect) = compute_streaks(&[outcome(false), outcome(false)]);
    assert_eq!((correct, incorrect), (0, 2));
  }

  #[test]
  fn test_streaks_two_successes() {
    let (correct, incorrect) = compute_streaks(&[outcome(true), outcome(true)]);
    assert_eq!((correct, incorrect), (2, 0));
  }

  #[test]
  fn test_streaks_mixed_resets_opposite_counter() {
    // success then fail: trailing failure streak of 1
    assert_eq!(compute_streaks(&[outcome(true), outcome(false)]), (0, 1));
    // fail then success: trailing success streak of 1
    assert_eq!(compute_streaks(&[outcome(false), outcome(true)]), (1, 0));
  }

  #[test]
  fn test_streaks_empty_history() {
    assert_eq!(compute_streaks(&[]), (0, 0));
  }

  #[test]
  fn test_flag_table() {
    assert_eq!(
      features_for_streaks(2, 0),
      AdaptiveFeatures { timer_enabled: true, hints_enabled: false }
    );
    assert_eq!(
      features_for_streaks(0, 2),
      AdaptiveFeatures { timer_enabled: false, hints_enabled: true }
    );
    assert_eq!(features_for_streaks(1, 0), AdaptiveFeatures::all_disabled());
    assert_eq!(features_for_streaks(0, 1), AdaptiveFeatures::all_disabled());
    assert_eq!(features_for_streaks(0, 0), AdaptiveFeatures::all_disabled());
  }

  #[tokio::test]
  async fn test_non_adaptive_account_gets_everything() {
    let api = Arc::new(InMemoryApi::new());
    api.set_last_attempts(vec![outcome(false), outcome(false)]);
    let mut policy = AdaptivePolicy::new(api, false);

    // History says "struggling", but the account-level flag wins
    let features = policy.evaluate(1, 10, 3).await;
    assert_eq!(features, AdaptiveFeatures::all_enabled());
    // Cold-start rule does not apply either
    let features = policy.evaluate(1, 10, 0).await;
    assert_eq!(features, AdaptiveFeatures::all_enabled());
  }

  #[tokio::test]
  async fn test_cold_start_disables_both() {
    let api = Arc::new(InMemoryApi::new());
    api.set_last_attempts(vec![outcome(true), outcome(true)]);
    let mut policy = AdaptivePolicy::new(api, true);

    let features = policy.evaluate(1, 10, 0).await;
    assert_eq!(features, AdaptiveFeatures::all_disabled());
  }

  #[tokio::test]
  async fn test_failure_streak_enables_hints() {
    let api = Arc::new(InMemoryApi::new());
    api.set_last_attempts(vec![outcome(false), outcome(false)]);
    let mut policy = AdaptivePolicy::new(api, true);

    let features = policy.evaluate(1, 10, 2).await;
    assert_eq!(features, AdaptiveFeatures { timer_enabled: false, hints_enabled: true });
  }

  #[tokio::test]
  async fn test_result_cached_until_invalidated() {
    let api = Arc::new(InMemoryApi::new());
    api.set_last_attempts(vec![outcome(true), outcome(true)]);
    let mut policy = AdaptivePolicy::new(Arc::clone(&api) as Arc<dyn ChallengeApi>, true);

    let first = policy.evaluate(1, 10, 1).await;
    assert!(first.timer_enabled);

    // History changes, but the cached decision stands
    api.set_last_attempts(vec![outcome(false), outcome(false)]);
    let second = policy.evaluate(1, 10, 1).await;
    assert_eq!(second, first);

    // Invalidation forces a re-fetch
    policy.invalidate(1, 10, 1);
    let third = policy.evaluate(1, 10, 1).await;
    assert_eq!(third, AdaptiveFeatures { timer_enabled: false, hints_enabled: true });
  }

  #[tokio::test]
  async fn test_fetch_failure_fails_safe() {
    let api = Arc::new(InMemoryApi::new());
    api.fail_next("last_attempts");
    let mut policy = AdaptivePolicy::new(api, true);

    let features = policy.evaluate(1, 10, 1).await;
    assert_eq!(features, AdaptiveFeatures::all_disabled());
    assert!(policy.last_error().is_some());
  }
}
