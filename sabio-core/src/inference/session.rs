//! Consultation sessions for interactive backward chaining.
//!
//! A session pins the knowledge-base snapshot it started with, the goal and
//! the answers given so far. Each accepted answer replays the proof over that
//! snapshot, so edits to the knowledge base never leak into a running
//! consultation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{BackwardChainer, BackwardStep, InferenceConfig};
use crate::Certainty;
use crate::error::{InferenceError, InferenceResult};
use crate::kb::KnowledgeBase;
use crate::kb::validation::validate_value;
use crate::types::KbName;

/// Idle time after which a session may be reclaimed.
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// One accepted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Variable answered.
    pub variable: String,
    /// Value given.
    pub value: String,
    /// Certainty the user attached to the value.
    pub certainty: Certainty,
}

/// Where a consultation stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the user to answer about `variable`.
    AskingUser {
        /// Pending variable.
        variable: String,
    },
    /// The proof finished; further answers are stale.
    Concluded,
}

/// Backward-chaining consultation over a pinned snapshot.
#[derive(Debug)]
pub struct ConsultSession {
    id: String,
    kb: Arc<KnowledgeBase>,
    goal: String,
    config: InferenceConfig,
    answers: Vec<Answer>,
    step: BackwardStep,
    created_at: DateTime<Utc>,
    last_activity: Instant,
}

impl ConsultSession {
    /// Start proving `goal` and stop at the first question or result.
    ///
    /// # Arguments
    ///
    /// * `id` - Session identifier
    /// * `kb` - Snapshot the whole consultation runs against
    /// * `goal` - Variable to establish
    /// * `config` - Engine tunables
    ///
    /// # Errors
    ///
    /// Fails on an undeclared goal or a misconfigured rule met on the way.
    pub fn start(
        id: String,
        kb: Arc<KnowledgeBase>,
        goal: &str,
        config: InferenceConfig,
    ) -> InferenceResult<Self> {
        let step = BackwardChainer::new(&kb, config).prove(goal, [])?;
        Ok(Self {
            id,
            kb,
            goal: goal.to_string(),
            config,
            answers: Vec::new(),
            step,
            created_at: Utc::now(),
            last_activity: Instant::now(),
        })
    }

    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Knowledge base the session is pinned to.
    #[must_use]
    pub fn kb_name(&self) -> &KbName {
        self.kb.name()
    }

    /// Goal variable.
    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Answers accepted so far, in order.
    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Latest question or result.
    #[must_use]
    pub const fn step(&self) -> &BackwardStep {
        &self.step
    }

    /// Coarse state derived from the latest step.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.step {
            BackwardStep::Question(question) => SessionState::AskingUser {
                variable: question.variable.clone(),
            },
            BackwardStep::Result(_) => SessionState::Concluded,
        }
    }

    /// Wall-clock creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the session has been untouched for longer than `timeout`.
    #[must_use]
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// Accept an answer to the pending question and advance the proof.
    ///
    /// The session is left exactly as it was when this returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::StaleSessionAnswer`] when `variable` is not
    /// the pending question (or the session already concluded),
    /// [`InferenceError::InvalidAnswer`] when the value does not fit the
    /// variable, and any fault raised while replaying the proof.
    pub fn answer(
        &mut self,
        variable: &str,
        value: &str,
        certainty: Certainty,
    ) -> InferenceResult<&BackwardStep> {
        let expected = self.step.pending_variable();
        if expected != Some(variable) {
            warn!(
                session = %self.id,
                expected = ?expected,
                received = variable,
                "stale answer rejected"
            );
            return Err(InferenceError::StaleSessionAnswer {
                session_id: self.id.clone(),
                expected: expected.map(str::to_string),
                received: variable.to_string(),
            });
        }
        let declared =
            self.kb
                .variable(variable)
                .ok_or_else(|| InferenceError::UnknownVariable {
                    variable: variable.to_string(),
                })?;
        validate_value(declared, value)?;

        let mut answers = self.answers.clone();
        answers.push(Answer {
            variable: variable.to_string(),
            value: value.to_string(),
            certainty,
        });
        let step = BackwardChainer::new(&self.kb, self.config).prove(
            &self.goal,
            answers
                .iter()
                .map(|a| (a.variable.as_str(), a.value.as_str(), a.certainty)),
        )?;

        debug!(session = %self.id, variable, value, "answer accepted");
        self.answers = answers;
        self.step = step;
        self.last_activity = Instant::now();
        Ok(&self.step)
    }
}

/// Session identifier plus the step the caller should act on next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReply {
    /// Session identifier for follow-up answers.
    pub session_id: String,
    /// Knowledge base consulted.
    pub kb: KbName,
    /// Next question or final result.
    #[serde(flatten)]
    pub step: BackwardStep,
}

impl SessionReply {
    fn from_session(session: &ConsultSession) -> Self {
        Self {
            session_id: session.id.clone(),
            kb: session.kb_name().clone(),
            step: session.step.clone(),
        }
    }
}

/// Concurrent store of running consultations.
///
/// Sessions are independent of each other; answers to one session are
/// serialized through its own lock.
#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<ConsultSession>>>,
    config: InferenceConfig,
    timeout: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(InferenceConfig::default())
    }
}

impl SessionManager {
    /// Manager with the default idle timeout.
    #[must_use]
    pub fn new(config: InferenceConfig) -> Self {
        Self::with_timeout(config, DEFAULT_SESSION_TIMEOUT)
    }

    /// Manager with a custom idle timeout.
    #[must_use]
    pub fn with_timeout(config: InferenceConfig, timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            timeout,
        }
    }

    /// Idle timeout applied by [`Self::cleanup_idle_sessions`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Open a consultation for `goal` against `kb`.
    ///
    /// # Errors
    ///
    /// Fails when the goal is undeclared or the first proof attempt faults; no
    /// session is created in that case.
    pub fn start(&self, kb: Arc<KnowledgeBase>, goal: &str) -> InferenceResult<SessionReply> {
        let id = uuid::Uuid::new_v4().to_string();
        let kb_name = kb.name().clone();
        let session = ConsultSession::start(id.clone(), kb, goal, self.config)?;
        let reply = SessionReply::from_session(&session);
        self.sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        info!(session = %id, kb = %kb_name, goal, "consultation started");
        Ok(reply)
    }

    /// Answer the pending question of a session.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session to advance
    /// * `variable` - Variable being answered; must match the pending question
    /// * `value` - Value given
    /// * `certainty` - User certainty, 1.0 when omitted
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::SessionNotFound`] for unknown ids and
    /// whatever [`ConsultSession::answer`] rejects.
    pub fn answer(
        &self,
        session_id: &str,
        variable: &str,
        value: &str,
        certainty: Option<Certainty>,
    ) -> InferenceResult<SessionReply> {
        let session = self.session(session_id)?;
        let mut session = session.lock();
        session.answer(variable, value, certainty.unwrap_or(Certainty::CERTAIN))?;
        if session.state() == SessionState::Concluded {
            info!(session = %session_id, goal = %session.goal(), "consultation concluded");
        }
        Ok(SessionReply::from_session(&session))
    }

    /// Latest step of a session without changing it.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::SessionNotFound`] for unknown ids.
    pub fn current(&self, session_id: &str) -> InferenceResult<SessionReply> {
        let session = self.session(session_id)?;
        let session = session.lock();
        Ok(SessionReply::from_session(&session))
    }

    /// Discard a session.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::SessionNotFound`] for unknown ids.
    pub fn close(&self, session_id: &str) -> InferenceResult<()> {
        self.sessions
            .remove(session_id)
            .map(|_| debug!(session = %session_id, "consultation closed"))
            .ok_or_else(|| InferenceError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Drop sessions idle for longer than the timeout; returns how many.
    pub fn cleanup_idle_sessions(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.lock().is_idle(self.timeout));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "reclaimed idle consultations");
        }
        removed
    }

    /// Number of live sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session(&self, session_id: &str) -> InferenceResult<Arc<Mutex<ConsultSession>>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| InferenceError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }
}
