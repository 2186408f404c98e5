//! End-to-end scenarios for the challenge session coordinator, driven
//! against the in-memory backend fake.

use std::sync::Arc;
use std::time::Duration;

use clove_challenges::api::{ChallengeApi, UserChallengeSnapshot};
use clove_challenges::coordinator::{
  ChallengeCoordinator, CoordinatorError, LoadOutcome, SubmitOutcome,
};
use clove_challenges::domain::{Answer, AttemptOutcome, ChallengeMode, ChallengeState, OtherActiveSession};
use clove_challenges::exit_guard::{ExitDecision, ExitGuard};
use clove_challenges::marker::MarkerStore;
use clove_challenges::testing::{InMemoryApi, sample_challenge};

const USER: i64 = 1;
const SUBTOPIC: i64 = 10;

fn coordinator(api: Arc<InMemoryApi>, adaptive: bool) -> ChallengeCoordinator {
  ChallengeCoordinator::new(
    api,
    MarkerStore::open_in_memory().expect("in-memory marker store"),
    USER,
    SUBTOPIC,
    adaptive,
  )
}

fn correct_answer() -> Answer {
  Answer::Code("public class Main { int x = 5; }".to_string())
}

async fn advance_secs(secs: u64) {
  tokio::time::advance(Duration::from_secs(secs)).await;
  // A single yield only lets the ticker task process up to tokio's
  // cooperative-scheduling budget (128) of the pending per-second ticks,
  // so a large paused-time advance needs several turns to fully drain.
  for _ in 0..8 {
    tokio::task::yield_now().await;
  }
}

#[tokio::test]
async fn happy_path_cold_start_to_submitted() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");
  api.set_attempt_count(0);

  let mut coordinator = coordinator(Arc::clone(&api), true);
  let outcome = coordinator.start().await.expect("load succeeds");
  assert!(matches!(outcome, LoadOutcome::Loaded));
  assert_eq!(coordinator.state(), ChallengeState::Active);

  // Cold start of an adaptive account: no timer, no hints
  let session = coordinator.session().expect("session loaded");
  assert!(!session.features.timer_enabled);
  assert!(!session.features.hints_enabled);
  assert!(session.session_token.is_some());

  // Hints are unavailable this attempt
  assert!(coordinator.use_hint().is_none());

  coordinator.set_answer(correct_answer());
  let outcome = coordinator.submit().await.expect("submit succeeds");
  let SubmitOutcome::Submitted(feedback) = outcome else {
    panic!("expected a submission");
  };
  assert!(feedback.is_successful);
  assert_eq!(feedback.points, 10);
  assert_eq!(coordinator.state(), ChallengeState::Submitted);

  let submitted = api.submitted();
  assert_eq!(submitted.len(), 1);
  assert!(submitted[0].is_successful);
  assert_eq!(submitted[0].points, 10);
  assert!(!submitted[0].timer_enabled);
  // Disabled timer reports zero time in the persisted record
  assert_eq!(submitted[0].time_spent, 0);

  // The take advances to the next attempt
  api.push_next_challenge(sample_challenge(101, ChallengeMode::CodeFixer), 501, "active");
  let outcome = coordinator.advance_after_feedback().await.expect("next load succeeds");
  assert!(matches!(outcome, LoadOutcome::Loaded));
  assert_eq!(coordinator.take_progress().current_take_attempts, 1);
}

#[tokio::test]
async fn duplicate_submit_is_ignored() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), true);
  coordinator.start().await.expect("load succeeds");
  coordinator.set_answer(correct_answer());

  let first = coordinator.submit().await.expect("submit succeeds");
  assert!(matches!(first, SubmitOutcome::Submitted(_)));
  let second = coordinator.submit().await.expect("no error on duplicate");
  assert!(matches!(second, SubmitOutcome::Ignored));

  assert_eq!(api.submitted().len(), 1);
}

#[tokio::test]
async fn resumed_submission_is_always_scored_failed() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");

  // The stored answer is objectively correct, but cancelling first means
  // the submission must score failed anyway
  coordinator.set_answer(correct_answer());
  coordinator.cancel().await.expect("cancel succeeds");
  assert_eq!(coordinator.state(), ChallengeState::Resumed);

  let outcome = coordinator.submit().await.expect("submit succeeds");
  let SubmitOutcome::Submitted(feedback) = outcome else {
    panic!("expected a submission");
  };
  assert!(!feedback.is_successful);
  assert_eq!(feedback.points, 0);
  assert!(feedback.was_cancelled);

  let submitted = api.submitted();
  assert_eq!(submitted.len(), 1);
  assert!(!submitted[0].is_successful);
  assert_eq!(submitted[0].points, 0);
}

#[tokio::test(start_paused = true)]
async fn timer_expiry_forces_failure_without_auto_submit() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  // Non-adaptive account gets the timer armed unconditionally
  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");
  let session = coordinator.session().expect("session loaded");
  assert!(session.features.timer_enabled);
  assert_eq!(session.time_remaining, 300);

  advance_secs(300).await;
  coordinator.poll_timer();

  assert_eq!(coordinator.state(), ChallengeState::Expired);
  assert!(coordinator.expiry_warning());
  // Expiry never submits on its own
  assert!(api.submitted().is_empty());

  coordinator.set_answer(correct_answer());
  let outcome = coordinator.submit().await.expect("submit succeeds");
  let SubmitOutcome::Submitted(feedback) = outcome else {
    panic!("expected a submission");
  };
  assert!(!feedback.is_successful);
  assert_eq!(feedback.points, 0);
  assert!(feedback.was_expired);
}

#[tokio::test(start_paused = true)]
async fn cancel_persists_partial_state_and_resume_rehydrates() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");

  advance_secs(42).await;
  assert!(coordinator.use_hint().is_some());
  coordinator.set_answer(Answer::Code("int x =".to_string()));
  coordinator.cancel().await.expect("cancel succeeds");

  assert_eq!(coordinator.state(), ChallengeState::Resumed);
  let cancelled = api.cancelled();
  assert_eq!(cancelled.len(), 1);
  assert_eq!(cancelled[0].2.time_spent, 42);
  assert_eq!(cancelled[0].2.hints_used, 1);
  assert!(cancelled[0].2.partial_answer.is_some());

  // Next visit: the backend reports the attempt as cancelled and serves
  // the persisted partial state back
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "cancelled");
  api.set_user_challenge(UserChallengeSnapshot {
    time_spent: 42,
    hints_used: 1,
    partial_answer: Some("\"int x =\"".to_string()),
  });

  let mut revisit = coordinator_for_revisit(Arc::clone(&api));
  let outcome = revisit.start().await.expect("load succeeds");
  assert!(matches!(outcome, LoadOutcome::Loaded));
  assert_eq!(revisit.state(), ChallengeState::Resumed);

  let session = revisit.session().expect("session loaded");
  assert_eq!(session.time_spent, 42);
  assert_eq!(session.time_remaining, 300 - 42);
  assert_eq!(session.revealed_hints.len(), 1);
  assert_eq!(session.answer, Some(Answer::Code("int x =".to_string())));

  // The rehydrated clock stays paused until explicitly resumed
  advance_secs(10).await;
  let session = revisit.session().expect("session loaded");
  assert_eq!(session.time_remaining, 258);
}

fn coordinator_for_revisit(api: Arc<InMemoryApi>) -> ChallengeCoordinator {
  ChallengeCoordinator::new(
    api,
    MarkerStore::open_in_memory().expect("in-memory marker store"),
    USER,
    SUBTOPIC,
    false,
  )
}

#[tokio::test]
async fn session_conflict_blocks_activation_until_force_release() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");
  api.set_conflicts(vec![OtherActiveSession {
    challenge_id: 77,
    subtopic_id: 11,
    subtopic_name: "Loops".to_string(),
    started_at: chrono::Utc::now(),
  }]);

  let mut coordinator = coordinator(Arc::clone(&api), false);
  let outcome = coordinator.start().await.expect("load reports conflict");
  let LoadOutcome::Conflict(sessions) = outcome else {
    panic!("expected a conflict");
  };
  assert_eq!(sessions.len(), 1);
  assert_eq!(sessions[0].subtopic_name, "Loops");
  // The coordinator must not have entered Active
  assert_eq!(coordinator.state(), ChallengeState::Loading);
  assert_eq!(coordinator.other_sessions().len(), 1);

  // "Close other tabs" releases the lock and retries
  let outcome = coordinator.force_release_and_retry().await.expect("retry succeeds");
  assert!(matches!(outcome, LoadOutcome::Loaded));
  assert_eq!(coordinator.state(), ChallengeState::Active);
  assert!(coordinator.other_sessions().is_empty());
}

#[tokio::test]
async fn session_expired_at_submit_blocks_active_submission() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");

  // Another tab force-released every session; the held token is now stale
  api.force_deactivate_all(USER).await.expect("release succeeds");

  coordinator.set_answer(correct_answer());
  let result = coordinator.submit().await;
  assert!(matches!(result, Err(CoordinatorError::SessionExpired(_))));
  // The attempt is still live; nothing was persisted
  assert_eq!(coordinator.state(), ChallengeState::Active);
  assert!(api.submitted().is_empty());
}

#[tokio::test]
async fn take_completes_exactly_once_after_five_submissions() {
  let api = Arc::new(InMemoryApi::new());
  for i in 0..5 {
    api.push_next_challenge(sample_challenge(100 + i, ChallengeMode::CodeFixer), 500 + i, "active");
  }

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("first load succeeds");

  for round in 0..5 {
    coordinator.set_answer(correct_answer());
    coordinator.submit().await.expect("submit succeeds");
    let outcome = coordinator.advance_after_feedback().await.expect("advance succeeds");
    if round < 4 {
      assert!(matches!(outcome, LoadOutcome::Loaded), "round {}", round);
    } else {
      assert!(matches!(outcome, LoadOutcome::TakeComplete), "round {}", round);
    }
  }

  assert!(coordinator.is_take_finalized());
  assert_eq!(api.completed_subtopics().len(), 1);

  // A sixth load request must not fetch another challenge or re-finalize
  let outcome = coordinator.load_next().await.expect("idempotent finalize");
  assert!(matches!(outcome, LoadOutcome::TakeComplete));
  assert_eq!(api.completed_subtopics().len(), 1);
}

#[tokio::test]
async fn load_failure_degrades_toward_results() {
  let api = Arc::new(InMemoryApi::new());
  api.fail_next("next_challenge");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  let outcome = coordinator.start().await.expect("degrades without error");
  assert!(matches!(outcome, LoadOutcome::TakeComplete));
}

#[tokio::test]
async fn submit_failure_retries_fallback_and_still_advances() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");
  coordinator.set_answer(correct_answer());

  // Primary record fails; the fallback minimal record lands instead
  api.fail_next("submit_attempt");
  coordinator.submit().await.expect("submit completes");
  assert_eq!(coordinator.state(), ChallengeState::Submitted);

  let submitted = api.submitted();
  assert_eq!(submitted.len(), 1);
  assert!(!submitted[0].is_successful);
  assert_eq!(submitted[0].user_answer, "");
}

#[tokio::test]
async fn submit_double_failure_surfaces_error_but_advances() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");
  coordinator.set_answer(correct_answer());

  api.fail_times("submit_attempt", 2);
  coordinator.submit().await.expect("submit completes");

  // Both attempts to persist failed, but the user is not stuck
  assert_eq!(coordinator.state(), ChallengeState::Submitted);
  assert!(coordinator.last_error().is_some());
  assert!(api.submitted().is_empty());
}

#[tokio::test]
async fn streak_driven_features_apply_after_cold_start() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");
  api.push_next_challenge(sample_challenge(101, ChallengeMode::CodeFixer), 501, "active");
  api.set_last_attempts(vec![
    AttemptOutcome { is_successful: false, points: 0, time_spent: 30 },
    AttemptOutcome { is_successful: false, points: 0, time_spent: 45 },
  ]);

  let mut coordinator = coordinator(Arc::clone(&api), true);
  coordinator.start().await.expect("load succeeds");

  // First attempt of the take: cold start
  let session = coordinator.session().expect("session loaded");
  assert!(!session.features.timer_enabled);
  assert!(!session.features.hints_enabled);

  coordinator.set_answer(correct_answer());
  coordinator.submit().await.expect("submit succeeds");
  coordinator.advance_after_feedback().await.expect("advance succeeds");

  // Second attempt: two trailing failures enable hints, not the timer
  let session = coordinator.session().expect("session loaded");
  assert!(!session.features.timer_enabled);
  assert!(session.features.hints_enabled);
}

#[tokio::test]
async fn exit_guard_cancel_then_navigate_exactly_once() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");
  coordinator.set_answer(Answer::Code("int x =".to_string()));

  let mut guard = ExitGuard::new();
  assert_eq!(guard.intercept(coordinator.state(), "/dashboard"), ExitDecision::Confirm);

  let mut navigations: Vec<Option<String>> = Vec::new();
  let left = guard
    .leave(&mut coordinator, |target| navigations.push(target))
    .await;
  assert!(left);

  // Cleanup ran before navigation: the cancellation is already persisted
  assert_eq!(api.cancelled().len(), 1);
  assert_eq!(navigations, vec![Some("/dashboard".to_string())]);
  assert_eq!(coordinator.state(), ChallengeState::Resumed);

  // After the leave completes the guard accepts a new flow
  assert_eq!(guard.intercept(coordinator.state(), "/progress"), ExitDecision::Confirm);
}

#[tokio::test]
async fn exit_guard_from_feedback_screen_deletes_take_attempts() {
  let api = Arc::new(InMemoryApi::new());
  api.push_next_challenge(sample_challenge(100, ChallengeMode::CodeFixer), 500, "active");

  let mut coordinator = coordinator(Arc::clone(&api), false);
  coordinator.start().await.expect("load succeeds");
  coordinator.set_answer(correct_answer());
  coordinator.submit().await.expect("submit succeeds");
  assert_eq!(coordinator.state(), ChallengeState::Submitted);

  let mut guard = ExitGuard::new();
  guard.intercept(coordinator.state(), "/my-deck");

  let mut navigated = 0;
  guard.leave(&mut coordinator, |_| navigated += 1).await;

  assert_eq!(navigated, 1);
  assert_eq!(api.deleted_takes().len(), 1);
  assert!(api.submitted().is_empty());
}
