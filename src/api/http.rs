//! reqwest implementation of the backend contract.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
  ApiError, AttemptData, CancelData, ChallengeApi, ChallengeStatistics, NextChallenge,
  SessionActivation, SessionCheck, UserChallengeSnapshot,
};
use crate::domain::AttemptOutcome;

/// HTTP client for the Clove backend
#[derive(Clone)]
pub struct HttpChallengeApi {
  client: reqwest::Client,
  base_url: String,
}

impl HttpChallengeApi {
  pub fn new(base_url: String) -> Result<Self, ApiError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .map_err(|e| ApiError::Network(e.to_string()))?;
    Ok(Self { client, base_url })
  }

  /// Construct against the configured base URL (config.toml > env > default)
  pub fn from_config() -> Result<Self, ApiError> {
    Self::new(crate::config::load_backend_base_url())
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url, path)
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let res = self
      .client
      .get(self.url(path))
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;
    Self::decode(res).await
  }

  async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ApiError> {
    let res = self
      .client
      .post(self.url(path))
      .header(CONTENT_TYPE, "application/json")
      .json(body)
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;
    Self::decode(res).await
  }

  async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    self.post_json(path, &serde_json::json!({})).await
  }

  async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ApiError> {
    if !res.status().is_success() {
      let status = res.status().as_u16();
      let message = res.text().await.unwrap_or_default();
      return Err(ApiError::Http { status, message });
    }
    res.json().await.map_err(|e| ApiError::Decode(e.to_string()))
  }
}

/// Wrapper shapes for endpoints that nest their payload
#[derive(Deserialize)]
struct CountResponse {
  count: u32,
}

#[derive(Deserialize)]
struct DeletedResponse {
  #[serde(default)]
  deleted_count: u32,
}

#[async_trait]
impl ChallengeApi for HttpChallengeApi {
  async fn next_challenge(&self, user_id: i64, subtopic_id: i64) -> Result<NextChallenge, ApiError> {
    self
      .get_json(&format!(
        "/challenges/next/user/{}/subtopic/{}",
        user_id, subtopic_id
      ))
      .await
  }

  async fn user_challenge(
    &self,
    user_id: i64,
    challenge_id: i64,
  ) -> Result<UserChallengeSnapshot, ApiError> {
    self
      .get_json(&format!(
        "/user_challenges/user/{}/challenge/{}",
        user_id, challenge_id
      ))
      .await
  }

  async fn activate_session(
    &self,
    user_id: i64,
    challenge_id: i64,
  ) -> Result<SessionActivation, ApiError> {
    self
      .post_empty(&format!(
        "/challenge_attempts/activate-session/user/{}/challenge/{}",
        user_id, challenge_id
      ))
      .await
  }

  async fn validate_session(
    &self,
    user_id: i64,
    challenge_id: i64,
    session_token: &str,
  ) -> Result<SessionCheck, ApiError> {
    self
      .post_json(
        &format!(
          "/challenge_attempts/validate-session/user/{}/challenge/{}",
          user_id, challenge_id
        ),
        &serde_json::json!({ "session_token": session_token }),
      )
      .await
  }

  async fn deactivate_session(&self, user_id: i64, challenge_id: i64) -> Result<(), ApiError> {
    let _: serde_json::Value = self
      .post_empty(&format!(
        "/challenge_attempts/deactivate-session/user/{}/challenge/{}",
        user_id, challenge_id
      ))
      .await?;
    Ok(())
  }

  async fn force_deactivate_all(&self, user_id: i64) -> Result<(), ApiError> {
    let _: serde_json::Value = self
      .post_empty(&format!(
        "/challenge_attempts/force-deactivate-all-sessions/user/{}",
        user_id
      ))
      .await?;
    Ok(())
  }

  async fn submit_attempt(&self, attempt: &AttemptData) -> Result<(), ApiError> {
    let _: serde_json::Value = self.post_json("/challenge_attempts/", attempt).await?;
    Ok(())
  }

  async fn cancel_challenge(
    &self,
    user_id: i64,
    challenge_id: i64,
    cancel: &CancelData,
  ) -> Result<(), ApiError> {
    let _: serde_json::Value = self
      .post_json(
        &format!(
          "/challenge_attempts/cancel/user/{}/challenge/{}",
          user_id, challenge_id
        ),
        cancel,
      )
      .await?;
    Ok(())
  }

  async fn attempt_count(&self, user_id: i64, subtopic_id: i64) -> Result<u32, ApiError> {
    let res: CountResponse = self
      .get_json(&format!(
        "/challenge_attempts/count/user/{}/subtopic/{}",
        user_id, subtopic_id
      ))
      .await?;
    Ok(res.count)
  }

  async fn last_attempts(
    &self,
    user_id: i64,
    subtopic_id: i64,
    limit: u32,
  ) -> Result<Vec<AttemptOutcome>, ApiError> {
    self
      .get_json(&format!(
        "/challenge_attempts/last-attempts/user/{}/subtopic/{}?limit={}",
        user_id, subtopic_id, limit
      ))
      .await
  }

  async fn complete_subtopic_component(
    &self,
    user_id: i64,
    subtopic_id: i64,
  ) -> Result<(), ApiError> {
    let _: serde_json::Value = self
      .post_json(
        &format!("/user_subtopics/user/{}/subtopic/{}/complete", user_id, subtopic_id),
        &serde_json::json!({ "component": "challenge" }),
      )
      .await?;
    Ok(())
  }

  async fn delete_take_attempts(&self, user_id: i64, subtopic_id: i64) -> Result<u32, ApiError> {
    let res = self
      .client
      .delete(self.url(&format!(
        "/challenge_attempts/user/{}/subtopic/{}",
        user_id, subtopic_id
      )))
      .send()
      .await
      .map_err(|e| ApiError::Network(e.to_string()))?;
    let res: DeletedResponse = Self::decode(res).await?;
    Ok(res.deleted_count)
  }

  async fn record_statistics(&self, stats: &ChallengeStatistics) -> Result<(), ApiError> {
    let _: serde_json::Value = self.post_json("/statistics/challenge", stats).await?;
    Ok(())
  }
}
