//! Error types for knowledge-base management and inference.
//!
//! Every error names the knowledge base, variable, rule or session involved so
//! callers can render a user-facing message without extra lookups. None of them
//! are transient: they describe logic or input problems and are never retried.

use thiserror::Error;

use crate::inference::ForwardOutcome;
use crate::registry::StoreError;
use crate::types::{KbName, KbNameError};

/// Errors raised by knowledge-base lookups and CRUD operations.
#[derive(Debug, Error)]
pub enum KbError {
    /// Knowledge-base name failed validation.
    #[error(transparent)]
    InvalidName(#[from] KbNameError),

    /// Knowledge base is not registered.
    #[error(
        "Knowledge base '{kb}' not found\n  Expected: a knowledge base created with create_kb\n  Suggestion: List the available knowledge bases first"
    )]
    UnknownKb {
        /// Name that was looked up.
        kb: KbName,
    },

    /// A knowledge base with this name already exists.
    #[error("Knowledge base '{kb}' already exists")]
    KbAlreadyExists {
        /// Conflicting name.
        kb: KbName,
    },

    /// Variable is not declared in the knowledge base.
    #[error(
        "Variable '{variable}' not found in knowledge base '{kb}'\n  Expected: a declared variable name\n  Suggestion: Create the variable before referencing it"
    )]
    UnknownVariable {
        /// Knowledge base searched.
        kb: KbName,
        /// Variable that was looked up.
        variable: String,
    },

    /// Variable name already taken.
    #[error("Variable '{variable}' already exists in knowledge base '{kb}'")]
    VariableAlreadyExists {
        /// Knowledge base.
        kb: KbName,
        /// Conflicting variable name.
        variable: String,
    },

    /// Variable edits keep the original name.
    #[error(
        "Variable '{from}' cannot be renamed to '{to}'\n  Expected: the update payload to keep the name '{from}'\n  Suggestion: Create a new variable and migrate the rules that use '{from}'"
    )]
    VariableRename {
        /// Existing name.
        from: String,
        /// Name found in the update payload.
        to: String,
    },

    /// Variable is still referenced by a rule.
    #[error(
        "Variable '{variable}' is used by rule '{rule}' and cannot be deleted\n  Suggestion: Delete or edit rule '{rule}' first"
    )]
    VariableInUse {
        /// Variable that was to be deleted.
        variable: String,
        /// First rule referencing it.
        rule: String,
    },

    /// Rule is not part of the knowledge base.
    #[error("Rule '{rule}' not found in knowledge base '{kb}'")]
    UnknownRule {
        /// Knowledge base searched.
        kb: KbName,
        /// Rule that was looked up.
        rule: String,
    },

    /// Rule name already taken.
    #[error("Rule '{rule}' already exists in knowledge base '{kb}'")]
    RuleAlreadyExists {
        /// Knowledge base.
        kb: KbName,
        /// Conflicting rule name.
        rule: String,
    },

    /// Malformed variable or rule definition.
    #[error("Invalid definition for '{subject}': {reason}")]
    Validation {
        /// Variable or rule being validated.
        subject: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Storage contract failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl KbError {
    pub(crate) fn validation(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while evaluating rules or driving a consultation.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Goal, condition or fact names a variable the knowledge base lacks.
    #[error("Variable '{variable}' is not declared in the knowledge base")]
    UnknownVariable {
        /// Missing variable.
        variable: String,
    },

    /// A numeric variable was compared with a literal that is not a number.
    #[error(
        "Literal '{literal}' for numeric variable '{variable}' is not a number\n  Expected: decimal text such as '18' or '37.5'\n  Suggestion: Fix the rule definition"
    )]
    InvalidLiteral {
        /// Numeric variable.
        variable: String,
        /// Offending literal or stored value.
        literal: String,
    },

    /// Ordering operator used on a categorical variable.
    #[error(
        "Operator '{operator}' cannot be applied to categorical variable '{variable}'\n  Expected: '==' or '!=' for categorical variables"
    )]
    InvalidOperator {
        /// Categorical variable.
        variable: String,
        /// Rejected operator symbol.
        operator: String,
    },

    /// Supplied value does not fit the variable's domain or range.
    #[error("Value '{value}' is not valid for variable '{variable}': {reason}")]
    InvalidAnswer {
        /// Variable being answered.
        variable: String,
        /// Rejected value.
        value: String,
        /// Domain or range violation.
        reason: String,
    },

    /// Answer names a variable other than the pending question.
    #[error(
        "Stale answer for session {session_id}: expected '{}', got '{received}'",
        expected.as_deref().unwrap_or("<no pending question>")
    )]
    StaleSessionAnswer {
        /// Session identifier.
        session_id: String,
        /// Variable the session is waiting for, if any.
        expected: Option<String>,
        /// Variable named by the rejected answer.
        received: String,
    },

    /// No session with this identifier.
    #[error("Consultation session not found: {session_id}")]
    SessionNotFound {
        /// Session identifier.
        session_id: String,
    },

    /// Forward chaining hit its pass cap without reaching a fixpoint.
    #[error(
        "Forward chaining did not converge after {passes} passes\n  Expected: a rule set that reaches a fixpoint\n  Suggestion: Look for rules that keep raising each other's certainty"
    )]
    NonConvergence {
        /// Passes executed before giving up.
        passes: usize,
        /// Facts and fired rules derived so far.
        partial: Box<ForwardOutcome>,
    },
}

/// Result alias for knowledge-base operations.
pub type KbResult<T> = std::result::Result<T, KbError>;

/// Result alias for inference operations.
pub type InferenceResult<T> = std::result::Result<T, InferenceError>;
