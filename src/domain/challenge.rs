use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMode {
  CodeFixer,
  OutputTracing,
  CodeCompletion,
}

impl ChallengeMode {
  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "code_fixer" => Some(Self::CodeFixer),
      "output_tracing" => Some(Self::OutputTracing),
      "code_completion" => Some(Self::CodeCompletion),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::CodeFixer => "code_fixer",
      Self::OutputTracing => "output_tracing",
      Self::CodeCompletion => "code_completion",
    }
  }
}

/// One fill-in slot of a code-completion challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSlot {
  /// Slot identifier referenced by the user's answer (e.g. "slot_1")
  pub id: String,
  pub correct_answer: String,
}

/// Mode-dependent answer payload.
///
/// Serialized to JSON when persisting partial progress and parsed back on
/// resume, so the wire form must stay stable: a bare string for code-fixer,
/// an object for completion slots, an array for selected outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
  /// Full edited source for a code-fixer challenge
  Code(String),
  /// Chosen label per slot id for a code-completion challenge
  Slots(BTreeMap<String, String>),
  /// Selected output lines for an output-tracing challenge
  Outputs(BTreeSet<String>),
}

impl Answer {
  /// True when the answer carries no content worth persisting
  pub fn is_empty(&self) -> bool {
    match self {
      Self::Code(code) => code.trim().is_empty(),
      Self::Slots(slots) => slots.is_empty(),
      Self::Outputs(outputs) => outputs.is_empty(),
    }
  }

  /// Parse a persisted partial answer. Unparseable or empty payloads
  /// resolve to None rather than an error so a corrupt record never
  /// blocks resuming the attempt.
  pub fn from_partial_json(raw: &str) -> Option<Self> {
    let answer: Answer = serde_json::from_str(raw).ok()?;
    if answer.is_empty() { None } else { Some(answer) }
  }

  pub fn to_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }
}

/// Immutable description of one challenge to solve. Fetched once per
/// attempt, never mutated client-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeInstance {
  pub id: i64,
  pub mode: ChallengeMode,
  pub scenario: String,
  /// Starting code shown in the editor (code-fixer, code-completion)
  #[serde(default)]
  pub initial_code: Option<String>,
  /// Reference solution for code-fixer validation
  #[serde(default)]
  pub solution_code: Option<String>,
  /// Fill-in slots for code-completion validation
  #[serde(default)]
  pub completion_slots: Vec<CompletionSlot>,
  /// Choice pool offered to the user (code-completion, output-tracing)
  #[serde(default)]
  pub choices: Vec<String>,
  /// Outputs the program actually prints (output-tracing)
  #[serde(default)]
  pub expected_output: Vec<String>,
  /// Hint text keyed "1", "2", ... in reveal order
  #[serde(default)]
  pub hints: BTreeMap<String, String>,
  #[serde(default = "default_points")]
  pub points: u32,
  /// Configured countdown duration in seconds
  #[serde(default = "default_timer_duration")]
  pub timer_duration: u32,
}

fn default_points() -> u32 {
  crate::config::DEFAULT_CHALLENGE_POINTS
}

fn default_timer_duration() -> u32 {
  crate::config::DEFAULT_TIMER_DURATION_SECS
}

impl ChallengeInstance {
  /// Number of hints this challenge ships with
  pub fn hints_available(&self) -> u32 {
    self.hints.len() as u32
  }

  /// Hint text for the given 1-based hint number
  pub fn hint_text(&self, number: u32) -> Option<&str> {
    self.hints.get(&number.to_string()).map(String::as_str)
  }
}
