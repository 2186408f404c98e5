//! Test utilities: an in-memory backend fake with scripted responses.
//!
//! Mirrors the real backend contract closely enough to drive the
//! coordinator through full scenarios (conflicts, cancellations, failure
//! injection) without a network.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use crate::api::{
    ApiError, AttemptData, CancelData, ChallengeApi, ChallengeStatistics, NextChallenge,
    SessionActivation, SessionCheck, UserChallengeSnapshot,
};
use crate::domain::{AttemptOutcome, ChallengeInstance, ChallengeMode, OtherActiveSession};

/// Build a minimal challenge instance for tests
pub fn sample_challenge(id: i64, mode: ChallengeMode) -> ChallengeInstance {
    let mut hints = BTreeMap::new();
    hints.insert("1".to_string(), "Look at the variable declaration".to_string());
    hints.insert("2".to_string(), "Check the semicolon".to_string());
    hints.insert("3".to_string(), "Compare against the expected type".to_string());

    ChallengeInstance {
        id,
        mode,
        scenario: "A broken inventory counter".to_string(),
        initial_code: Some("public class Main { int x = 5 }".to_string()),
        solution_code: Some("public class Main { int x = 5; }".to_string()),
        completion_slots: vec![],
        choices: vec![],
        expected_output: vec![],
        hints,
        points: 10,
        timer_duration: 300,
    }
}

#[derive(Default)]
struct Inner {
    next_challenges: VecDeque<NextChallenge>,
    user_challenge: UserChallengeSnapshot,
    active_token: Option<String>,
    conflict_sessions: Vec<OtherActiveSession>,
    attempt_count: u32,
    last_attempts: Vec<AttemptOutcome>,
    /// Remaining failure count per operation name
    failures: HashMap<String, u32>,
    submitted: Vec<AttemptData>,
    cancelled: Vec<(i64, i64, CancelData)>,
    completed_subtopics: Vec<(i64, i64)>,
    deleted_takes: Vec<(i64, i64)>,
    statistics: Vec<ChallengeStatistics>,
}

/// In-memory `ChallengeApi` with scripted responses and failure injection
#[derive(Default)]
pub struct InMemoryApi {
    inner: Mutex<Inner>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a challenge for the next-challenge endpoint
    pub fn push_next_challenge(&self, challenge: ChallengeInstance, user_challenge_id: i64, status: &str) {
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        inner.next_challenges.push_back(NextChallenge {
            challenge,
            user_challenge_id,
            user_challenge_status: Some(status.to_string()),
        });
    }

    /// Set the partial state returned for cancelled attempts
    pub fn set_user_challenge(&self, snapshot: UserChallengeSnapshot) {
        self.inner.lock().expect("fake lock poisoned").user_challenge = snapshot;
    }

    /// Script an activation conflict; cleared by force_deactivate_all
    pub fn set_conflicts(&self, sessions: Vec<OtherActiveSession>) {
        self.inner.lock().expect("fake lock poisoned").conflict_sessions = sessions;
    }

    pub fn set_attempt_count(&self, count: u32) {
        self.inner.lock().expect("fake lock poisoned").attempt_count = count;
    }

    pub fn set_last_attempts(&self, attempts: Vec<AttemptOutcome>) {
        self.inner.lock().expect("fake lock poisoned").last_attempts = attempts;
    }

    /// Make the named operation fail once with a network error
    pub fn fail_next(&self, op: &str) {
        self.fail_times(op, 1);
    }

    /// Make the named operation fail the next `times` calls
    pub fn fail_times(&self, op: &str, times: u32) {
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        *inner.failures.entry(op.to_string()).or_insert(0) += times;
    }

    pub fn submitted(&self) -> Vec<AttemptData> {
        self.inner.lock().expect("fake lock poisoned").submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<(i64, i64, CancelData)> {
        self.inner.lock().expect("fake lock poisoned").cancelled.clone()
    }

    pub fn completed_subtopics(&self) -> Vec<(i64, i64)> {
        self.inner.lock().expect("fake lock poisoned").completed_subtopics.clone()
    }

    pub fn deleted_takes(&self) -> Vec<(i64, i64)> {
        self.inner.lock().expect("fake lock poisoned").deleted_takes.clone()
    }

    pub fn statistics(&self) -> Vec<ChallengeStatistics> {
        self.inner.lock().expect("fake lock poisoned").statistics.clone()
    }

    pub fn active_token(&self) -> Option<String> {
        self.inner.lock().expect("fake lock poisoned").active_token.clone()
    }

    fn check_failure(&self, op: &str) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        if let Some(remaining) = inner.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::Network(format!("scripted failure: {}", op)));
            }
        }
        Ok(())
    }

    fn mint_token() -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        let suffix: String = (0..16)
            .map(|_| {
                let idx = rng.random_range(0..36);
                if idx < 10 {
                    (b'0' + idx) as char
                } else {
                    (b'a' + idx - 10) as char
                }
            })
            .collect();
        format!("ch_sess_{}", suffix)
    }
}

#[async_trait]
impl ChallengeApi for InMemoryApi {
    async fn next_challenge(&self, _user_id: i64, _subtopic_id: i64) -> Result<NextChallenge, ApiError> {
        self.check_failure("next_challenge")?;
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        inner.next_challenges.pop_front().ok_or(ApiError::Http {
            status: 404,
            message: "No challenges remaining".to_string(),
        })
    }

    async fn user_challenge(
        &self,
        _user_id: i64,
        _challenge_id: i64,
    ) -> Result<UserChallengeSnapshot, ApiError> {
        self.check_failure("user_challenge")?;
        Ok(self.inner.lock().expect("fake lock poisoned").user_challenge.clone())
    }

    async fn activate_session(
        &self,
        _user_id: i64,
        _challenge_id: i64,
    ) -> Result<SessionActivation, ApiError> {
        self.check_failure("activate_session")?;
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        if !inner.conflict_sessions.is_empty() {
            return Ok(SessionActivation {
                success: false,
                session_token: None,
                message: Some(
                    "You are currently answering challenges in another subtopic.".to_string(),
                ),
                existing_sessions: inner.conflict_sessions.clone(),
            });
        }
        let token = Self::mint_token();
        inner.active_token = Some(token.clone());
        Ok(SessionActivation {
            success: true,
            session_token: Some(token),
            message: None,
            existing_sessions: vec![],
        })
    }

    async fn validate_session(
        &self,
        _user_id: i64,
        _challenge_id: i64,
        session_token: &str,
    ) -> Result<SessionCheck, ApiError> {
        self.check_failure("validate_session")?;
        let inner = self.inner.lock().expect("fake lock poisoned");
        if inner.active_token.as_deref() == Some(session_token) {
            Ok(SessionCheck { valid: true, message: None })
        } else {
            Ok(SessionCheck {
                valid: false,
                message: Some("Invalid session token".to_string()),
            })
        }
    }

    async fn deactivate_session(&self, _user_id: i64, _challenge_id: i64) -> Result<(), ApiError> {
        self.check_failure("deactivate_session")?;
        self.inner.lock().expect("fake lock poisoned").active_token = None;
        Ok(())
    }

    async fn force_deactivate_all(&self, _user_id: i64) -> Result<(), ApiError> {
        self.check_failure("force_deactivate_all")?;
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        inner.conflict_sessions.clear();
        inner.active_token = None;
        Ok(())
    }

    async fn submit_attempt(&self, attempt: &AttemptData) -> Result<(), ApiError> {
        self.check_failure("submit_attempt")?;
        self.inner.lock().expect("fake lock poisoned").submitted.push(attempt.clone());
        Ok(())
    }

    async fn cancel_challenge(
        &self,
        user_id: i64,
        challenge_id: i64,
        cancel: &CancelData,
    ) -> Result<(), ApiError> {
        self.check_failure("cancel_challenge")?;
        self.inner
            .lock()
            .expect("fake lock poisoned")
            .cancelled
            .push((user_id, challenge_id, cancel.clone()));
        Ok(())
    }

    async fn attempt_count(&self, _user_id: i64, _subtopic_id: i64) -> Result<u32, ApiError> {
        self.check_failure("attempt_count")?;
        Ok(self.inner.lock().expect("fake lock poisoned").attempt_count)
    }

    async fn last_attempts(
        &self,
        _user_id: i64,
        _subtopic_id: i64,
        limit: u32,
    ) -> Result<Vec<AttemptOutcome>, ApiError> {
        self.check_failure("last_attempts")?;
        let inner = self.inner.lock().expect("fake lock poisoned");
        let attempts = &inner.last_attempts;
        let start = attempts.len().saturating_sub(limit as usize);
        Ok(attempts[start..].to_vec())
    }

    async fn complete_subtopic_component(
        &self,
        user_id: i64,
        subtopic_id: i64,
    ) -> Result<(), ApiError> {
        self.check_failure("complete_subtopic_component")?;
        self.inner
            .lock()
            .expect("fake lock poisoned")
            .completed_subtopics
            .push((user_id, subtopic_id));
        Ok(())
    }

    async fn delete_take_attempts(&self, user_id: i64, subtopic_id: i64) -> Result<u32, ApiError> {
        self.check_failure("delete_take_attempts")?;
        let mut inner = self.inner.lock().expect("fake lock poisoned");
        inner.deleted_takes.push((user_id, subtopic_id));
        let deleted = inner.submitted.len() as u32;
        inner.submitted.clear();
        Ok(deleted)
    }

    async fn record_statistics(&self, stats: &ChallengeStatistics) -> Result<(), ApiError> {
        self.check_failure("record_statistics")?;
        self.inner.lock().expect("fake lock poisoned").statistics.push(stats.clone());
        Ok(())
    }
}
