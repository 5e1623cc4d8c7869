//! Inference over a knowledge-base snapshot.
//!
//! Both engines share the same leaves: a [`FactStore`] for working memory, a
//! [`RuleIndex`] to find candidate rules, the condition evaluator and the
//! certainty algebra on [`crate::Certainty`]. Backward chaining suspends to ask
//! questions and is driven through [`SessionManager`]; forward chaining runs to
//! a fixpoint in a single call.

pub mod backward;
pub mod condition;
pub mod facts;
pub mod forward;
pub mod index;
pub mod session;

pub use backward::{BackwardChainer, BackwardStep, Question, Verdict, WhyContext};
pub use condition::{ConditionOutcome, evaluate};
pub use facts::{Contribution, Fact, FactSource, FactStore};
pub use forward::{ForwardChainer, ForwardOutcome};
pub use index::RuleIndex;
pub use session::{Answer, ConsultSession, SessionManager, SessionReply, SessionState};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tunables shared by both engines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Forward-chaining pass cap before reporting non-convergence.
    pub max_passes: usize,
    /// How rule conclusions interact with user-asserted facts.
    pub user_fact_policy: UserFactPolicy,
    /// Certainty changes below this are treated as no change.
    pub convergence_epsilon: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_passes: 64,
            user_fact_policy: UserFactPolicy::default(),
            convergence_epsilon: 1e-9,
        }
    }
}

/// Whether rules may add certainty to a fact the user asserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserFactPolicy {
    /// Rule conclusions for the same value accumulate with the user's certainty.
    #[default]
    Accumulate,
    /// User answers are final; rules never touch them.
    Locked,
}

impl fmt::Display for UserFactPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulate => f.write_str("accumulate"),
            Self::Locked => f.write_str("locked"),
        }
    }
}

impl FromStr for UserFactPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accumulate" => Ok(Self::Accumulate),
            "locked" => Ok(Self::Locked),
            _ => Err(format!(
                "Invalid user fact policy: {s}. Valid options: accumulate, locked"
            )),
        }
    }
}
