pub mod attempt;
pub mod challenge;

pub use attempt::{
  AdaptiveFeatures, AttemptOutcome, AttemptSession, ChallengeState, OtherActiveSession,
  TakeProgress,
};
pub use challenge::{Answer, ChallengeInstance, ChallengeMode, CompletionSlot};
