//! Sabio core: knowledge bases of typed variables and certainty-factor rules,
//! queried through backward (goal-driven) and forward (data-driven) chaining.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::unimplemented,
    clippy::todo
)]
#![deny(clippy::unwrap_in_result, clippy::panic_in_result_fn)]

pub mod error;
pub mod inference;
pub mod kb;
pub mod registry;
pub mod types;

pub use error::{InferenceError, KbError};
pub use inference::{
    Answer, BackwardChainer, BackwardStep, ConditionOutcome, ConsultSession, Contribution, Fact,
    FactSource, FactStore, ForwardChainer, ForwardOutcome, InferenceConfig, Question, RuleIndex,
    SessionManager, SessionReply, SessionState, UserFactPolicy, Verdict, WhyContext,
};
pub use kb::{
    Conclusion, Condition, KnowledgeBase, NumericRange, Operator, Rule, Variable, VariableKind,
};
pub use registry::{InMemoryKbStore, KbRegistry, KbStore, StoreError};
pub use types::{KbName, KbNameError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Certainty factor attached to a fact or a rule conclusion.
///
/// Values are always constrained to the 0..=1 range. Conjunction takes the
/// minimum, a rule scales its antecedent certainty by its declared factor, and
/// independent evidence for the same conclusion accumulates MYCIN-style.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Certainty(#[serde(deserialize_with = "validate_certainty")] f64);

impl Certainty {
    /// Complete certainty (1.0).
    pub const CERTAIN: Self = Self(1.0);
    /// No supporting evidence (0.0).
    pub const NONE: Self = Self(0.0);

    /// Creates a certainty, clamping into 0..=1. NaN maps to zero.
    #[must_use]
    pub const fn exact(value: f64) -> Self {
        let clamped = if value.is_nan() || value < 0.0 {
            0.0
        } else if value > 1.0 {
            1.0
        } else {
            value
        };
        Self(clamped)
    }

    /// Alias for [`Certainty::exact`].
    #[must_use]
    pub const fn from_raw(value: f64) -> Self {
        Self::exact(value)
    }

    /// Raw value in 0..=1.
    #[must_use]
    pub const fn raw(self) -> f64 {
        self.0
    }

    /// Conjunction: the weakest condition bounds the antecedent.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }

    /// Contribution of a rule: antecedent certainty times the rule's factor.
    #[must_use]
    pub const fn scaled(self, factor: Self) -> Self {
        Self::exact(self.0 * factor.0)
    }

    /// Accumulates independent same-sign evidence: `a + b(1 - a)`.
    ///
    /// Commutative, associative, has `NONE` as identity and `CERTAIN` as
    /// absorbing element, and never decreases either operand.
    #[must_use]
    pub const fn accumulate(self, other: Self) -> Self {
        Self::exact(self.0 + other.0 * (1.0 - self.0))
    }

    /// Conjunction over any number of condition certainties.
    ///
    /// An empty antecedent is vacuously true.
    #[must_use]
    pub fn conjunction<I>(certainties: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        certainties.into_iter().fold(Self::CERTAIN, Self::and)
    }

    /// Accumulation over any number of independent contributions.
    #[must_use]
    pub fn accumulate_all<I>(certainties: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        certainties.into_iter().fold(Self::NONE, Self::accumulate)
    }

    /// True when the two values differ by less than `epsilon`.
    #[must_use]
    pub fn approx_eq(self, other: Self, epsilon: f64) -> bool {
        (self.0 - other.0).abs() < epsilon
    }

    /// True when some evidence supports the value.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.0 > 0.0
    }
}

impl Default for Certainty {
    fn default() -> Self {
        Self::CERTAIN
    }
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

impl TryFrom<f64> for Certainty {
    type Error = f64;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(value)
        }
    }
}

// Keep the [0,1] invariant for values coming off the wire.
fn validate_certainty<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(serde::de::Error::custom(format!(
            "Certainty value {value} is outside valid range [0,1]"
        )));
    }
    Ok(value)
}
