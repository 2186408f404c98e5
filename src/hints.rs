//! Hint budget tracking for one challenge attempt.
//!
//! Reveals are irreversible within an attempt; resuming a cancelled attempt
//! replays the first N hints from the instance's hint map.

use crate::domain::{ChallengeInstance, ChallengeState};

#[derive(Debug, Clone, Default)]
pub struct HintLedger {
  available: u32,
  used: u32,
  revealed: Vec<String>,
}

impl HintLedger {
  /// Fixed budget at challenge load time; 0 when the hints feature is
  /// disabled for this attempt
  pub fn new(available: u32) -> Self {
    Self { available, used: 0, revealed: Vec::new() }
  }

  /// Reveal the next hint. No-op returning None when the budget is spent,
  /// the attempt isn't active, or the instance has no text for the next key.
  pub fn reveal(&mut self, instance: &ChallengeInstance, state: ChallengeState) -> Option<&str> {
    if state != ChallengeState::Active || self.used >= self.available {
      return None;
    }
    let number = self.used + 1;
    let text = instance.hint_text(number)?;
    self.used = number;
    self.revealed.push(format!("Hint {}: {}", number, text));
    self.revealed.last().map(String::as_str)
  }

  /// Reconstruct the first `used` reveals for a rehydrated attempt
  pub fn replay(instance: &ChallengeInstance, available: u32, used: u32) -> Self {
    let mut revealed = Vec::new();
    for number in 1..=used {
      if let Some(text) = instance.hint_text(number) {
        revealed.push(format!("Hint {}: {}", number, text));
      }
    }
    Self { available, used, revealed }
  }

  pub fn available(&self) -> u32 {
    self.available
  }

  pub fn used(&self) -> u32 {
    self.used
  }

  pub fn revealed(&self) -> &[String] {
    &self.revealed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ChallengeMode;
  use std::collections::BTreeMap;

  fn instance_with_hints(n: u32) -> ChallengeInstance {
    let mut hints = BTreeMap::new();
    for i in 1..=n {
      hints.insert(i.to_string(), format!("clue {}", i));
    }
    ChallengeInstance {
      id: 1,
      mode: ChallengeMode::CodeFixer,
      scenario: String::new(),
      initial_code: None,
      solution_code: None,
      completion_slots: vec![],
      choices: vec![],
      expected_output: vec![],
      hints,
      points: 10,
      timer_duration: 300,
    }
  }

  #[test]
  fn test_reveal_increments_and_formats() {
    let instance = instance_with_hints(3);
    let mut ledger = HintLedger::new(3);

    let first = ledger.reveal(&instance, ChallengeState::Active).map(str::to_string);
    assert_eq!(first.as_deref(), Some("Hint 1: clue 1"));
    assert_eq!(ledger.used(), 1);

    ledger.reveal(&instance, ChallengeState::Active);
    assert_eq!(ledger.revealed().len(), 2);
    assert_eq!(ledger.revealed()[1], "Hint 2: clue 2");
  }

  #[test]
  fn test_exhaustion_is_a_noop() {
    let instance = instance_with_hints(1);
    let mut ledger = HintLedger::new(1);

    assert!(ledger.reveal(&instance, ChallengeState::Active).is_some());
    assert!(ledger.reveal(&instance, ChallengeState::Active).is_none());
    assert_eq!(ledger.used(), 1);
    assert_eq!(ledger.revealed().len(), 1);
  }

  #[test]
  fn test_reveal_requires_active_state() {
    let instance = instance_with_hints(2);
    let mut ledger = HintLedger::new(2);

    assert!(ledger.reveal(&instance, ChallengeState::Resumed).is_none());
    assert!(ledger.reveal(&instance, ChallengeState::Expired).is_none());
    assert!(ledger.reveal(&instance, ChallengeState::Submitted).is_none());
    assert_eq!(ledger.used(), 0);
  }

  #[test]
  fn test_zero_budget_when_feature_disabled() {
    let instance = instance_with_hints(3);
    let mut ledger = HintLedger::new(0);

    assert!(ledger.reveal(&instance, ChallengeState::Active).is_none());
  }

  #[test]
  fn test_replay_reconstructs_in_order() {
    let instance = instance_with_hints(3);
    let ledger = HintLedger::replay(&instance, 3, 2);

    assert_eq!(ledger.used(), 2);
    assert_eq!(ledger.revealed(), &["Hint 1: clue 1", "Hint 2: clue 2"]);

    // Replayed ledger continues from where it left off
    let mut ledger = ledger;
    assert_eq!(
      ledger.reveal(&instance, ChallengeState::Active),
      Some("Hint 3: clue 3")
    );
  }
}
