//! Answer validation for the three challenge modes.
//!
//! Pure functions over the immutable challenge instance and the user's
//! answer; the coordinator applies its own forced-failure policy on top of
//! these results for resumed and expired attempts.
//!
//! - Code fixer: normalized full-code comparison (comments and formatting
//!   ignored) plus a shallow syntax gate. All-or-nothing points.
//! - Code completion: per-slot comparison, proportional points.
//! - Output tracing: exact set match, all-or-nothing points.

use std::collections::BTreeMap;

use crate::domain::{Answer, ChallengeInstance, ChallengeMode};

/// Result of validating one answer against one challenge
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
  pub is_correct: bool,
  /// Percentage score, 0-100
  pub score: u32,
  /// Points earned out of the challenge's point value
  pub points: u32,
  pub feedback: String,
}

impl ValidationResult {
  fn incorrect(feedback: &str) -> Self {
    Self { is_correct: false, score: 0, points: 0, feedback: feedback.to_string() }
  }
}

/// Strip `//` and `/* */` comments and collapse all whitespace runs so
/// formatting differences don't fail a correct fix
pub fn normalize_code(code: &str) -> String {
  let mut out = String::with_capacity(code.len());
  let mut chars = code.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '/' {
      match chars.peek() {
        Some('/') => {
          // Line comment: skip to end of line
          for c in chars.by_ref() {
            if c == '\n' {
              out.push('\n');
              break;
            }
          }
          continue;
        }
        Some('*') => {
          // Block comment: skip to closing */
          chars.next();
          let mut prev = '\0';
          for c in chars.by_ref() {
            if prev == '*' && c == '/' {
              break;
            }
            prev = c;
          }
          continue;
        }
        _ => {}
      }
    }
    out.push(c);
  }

  out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shallow structural check: class declaration present, braces and
/// parentheses balanced. Not a parser; catches the obvious breakage the
/// challenges are built around.
pub fn check_syntax(code: &str) -> bool {
  if !code.contains("public class") {
    return false;
  }
  let opens = code.matches('{').count();
  let closes = code.matches('}').count();
  if opens != closes {
    return false;
  }
  let opens = code.matches('(').count();
  let closes = code.matches(')').count();
  opens == closes
}

pub fn validate_code_fixer(user_code: &str, challenge: &ChallengeInstance) -> ValidationResult {
  let Some(solution) = challenge.solution_code.as_deref() else {
    return ValidationResult::incorrect("Challenge data error: solution code not found.");
  };

  if user_code.trim().is_empty() {
    return ValidationResult::incorrect("No code submitted. Challenge marked as incorrect.");
  }

  let code_matches = normalize_code(user_code) == normalize_code(solution);
  let syntax_valid = check_syntax(user_code);
  let is_correct = code_matches && syntax_valid;

  if is_correct {
    ValidationResult {
      is_correct: true,
      score: 100,
      points: challenge.points,
      feedback: "Code fixed successfully! All syntax errors have been corrected.".to_string(),
    }
  } else if !code_matches {
    ValidationResult::incorrect(
      "Your code doesn't match the expected solution. Check for missing semicolons, variable \
       declarations, or incorrect syntax.",
    )
  } else {
    ValidationResult::incorrect(
      "Your code has syntax errors. Check for balanced braces, parentheses, and proper Java \
       syntax.",
    )
  }
}

pub fn validate_code_completion(
  choices: &BTreeMap<String, String>,
  challenge: &ChallengeInstance,
) -> ValidationResult {
  let slots = &challenge.completion_slots;
  if slots.is_empty() {
    return ValidationResult::incorrect("Challenge data error: no completion slots found.");
  }

  if choices.is_empty() {
    return ValidationResult::incorrect("No answers submitted. Challenge marked as incorrect.");
  }

  let total = slots.len() as u32;
  let correct = slots
    .iter()
    .filter(|slot| choices.get(&slot.id).is_some_and(|c| *c == slot.correct_answer))
    .count() as u32;

  let score = correct * 100 / total;
  let points = (f64::from(score) / 100.0 * f64::from(challenge.points)).round() as u32;
  let is_correct = correct == total;

  let feedback = if is_correct {
    "Perfect! All choices are correct.".to_string()
  } else if correct == 0 {
    "None of the choices are correct. Make sure you select the right answers for each slot."
      .to_string()
  } else {
    format!(
      "{}/{} choices are correct. You need to select the correct answer for all slots to \
       complete the challenge.",
      correct, total
    )
  };

  ValidationResult { is_correct, score, points: if is_correct { challenge.points } else { points }, feedback }
}

pub fn validate_output_tracing(
  selections: &std::collections::BTreeSet<String>,
  challenge: &ChallengeInstance,
) -> ValidationResult {
  let expected = &challenge.expected_output;
  if expected.is_empty() {
    return ValidationResult::incorrect("Challenge data error: expected outputs not found.");
  }

  if selections.is_empty() {
    return ValidationResult::incorrect("No outputs selected. Challenge marked as incorrect.");
  }

  let all_correct_selected = expected.iter().all(|e| selections.contains(e));
  let nothing_extra = selections.iter().all(|s| expected.contains(s));
  let is_correct = all_correct_selected && nothing_extra;

  if is_correct {
    ValidationResult {
      is_correct: true,
      score: 100,
      points: challenge.points,
      feedback: "Perfect! You selected all correct outputs.".to_string(),
    }
  } else if selections.len() > expected.len() {
    ValidationResult::incorrect(
      "You selected too many outputs. Select exactly the outputs the program displays, no more \
       and no less.",
    )
  } else {
    ValidationResult::incorrect(
      "Incorrect. Trace through the code carefully to identify exactly the outputs that will be \
       displayed.",
    )
  }
}

/// Dispatch on mode. A missing or mode-mismatched answer is an incorrect
/// (but never panicking) submission; empty submissions are allowed and
/// simply score zero.
pub fn validate_challenge(answer: Option<&Answer>, challenge: &ChallengeInstance) -> ValidationResult {
  match (challenge.mode, answer) {
    (ChallengeMode::CodeFixer, Some(Answer::Code(code))) => validate_code_fixer(code, challenge),
    (ChallengeMode::CodeCompletion, Some(Answer::Slots(choices))) => {
      validate_code_completion(choices, challenge)
    }
    (ChallengeMode::OutputTracing, Some(Answer::Outputs(selections))) => {
      validate_output_tracing(selections, challenge)
    }
    (_, None) => ValidationResult::incorrect("No answer submitted. Challenge marked as incorrect."),
    _ => ValidationResult::incorrect("Answer does not match the challenge mode."),
  }
}
