//! HTTP API over the knowledge-base registry and the inference engines.
//!
//! Knowledge-base CRUD lives under `/api/v1/kbs`; consultations are created
//! per knowledge base and then addressed by session id alone.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRequest, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
};
use sabio_core::{
    Certainty, ForwardChainer, ForwardOutcome, InferenceConfig, InferenceError, KbError, KbName,
    KbRegistry, Rule, SessionManager, Variable,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    /// Knowledge-base catalog.
    pub registry: Arc<KbRegistry>,
    /// Running consultations.
    pub sessions: Arc<SessionManager>,
    /// Tunables for forward runs.
    pub inference: InferenceConfig,
}

impl ApiState {
    /// State over an existing registry and session manager.
    #[must_use]
    pub const fn new(
        registry: Arc<KbRegistry>,
        sessions: Arc<SessionManager>,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            registry,
            sessions,
            inference,
        }
    }

    /// Empty in-memory registry with default session handling.
    #[must_use]
    pub fn in_memory(inference: InferenceConfig) -> Self {
        Self::new(
            Arc::new(KbRegistry::in_memory()),
            Arc::new(SessionManager::new(inference)),
            inference,
        )
    }
}

/// JSON body extractor whose rejections use the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Body of `POST /api/v1/kbs`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateKbRequest {
    /// New knowledge-base name.
    pub name: String,
}

/// Body of `POST /api/v1/kbs/{kb}/consultations`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartConsultationRequest {
    /// Variable to establish.
    pub goal: String,
}

/// Body of `POST /api/v1/consultations/{id}/answer`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// Variable being answered; must be the pending question.
    pub variable: String,
    /// Value given.
    pub value: String,
    /// User certainty in 0..=1, 1.0 when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
}

/// Body of `POST /api/v1/kbs/{kb}/forward`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ForwardRequest {
    /// Initial facts, variable to value, each with certainty 1.0.
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
}

/// Liveness probe used by the CLI.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "sabio",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn kb_name(raw: &str) -> Result<KbName, ApiError> {
    KbName::new(raw).map_err(|err| ApiError::InvalidInput(err.to_string()))
}

/// List knowledge-base names.
pub async fn list_kbs(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let kbs: Vec<String> = state
        .registry
        .list_kbs()?
        .into_iter()
        .map(String::from)
        .collect();
    Ok(Json(json!({ "kbs": kbs })))
}

/// Create an empty knowledge base.
pub async fn create_kb(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<CreateKbRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = kb_name(&request.name)?;
    let created = state.registry.create_kb(&name).await?;
    Ok((StatusCode::CREATED, Json(json!({ "name": created.name() }))))
}

/// Full knowledge base: variables and rules.
pub async fn get_kb(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.snapshot(&kb_name(&kb)?)?;
    Ok(Json(snapshot.as_ref().clone()))
}

/// Delete a knowledge base.
pub async fn delete_kb(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete_kb(&kb_name(&kb)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Variables ordered by name.
pub async fn list_variables(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let variables = state.registry.list_variables(&kb_name(&kb)?)?;
    Ok(Json(json!({ "variables": variables })))
}

/// Declare a variable.
pub async fn create_variable(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
    ApiJson(variable): ApiJson<Variable>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state
        .registry
        .create_variable(&kb_name(&kb)?, variable)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// One variable.
pub async fn get_variable(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.registry.get_variable(&kb_name(&kb)?, &name)?))
}

/// Replace a variable definition.
pub async fn update_variable(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
    ApiJson(variable): ApiJson<Variable>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .registry
        .update_variable(&kb_name(&kb)?, &name, variable)
        .await?;
    Ok(Json(updated))
}

/// Delete an unreferenced variable.
pub async fn delete_variable(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registry
        .delete_variable(&kb_name(&kb)?, &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rules in declaration order.
pub async fn list_rules(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let rules = state.registry.list_rules(&kb_name(&kb)?)?;
    Ok(Json(json!({ "rules": rules })))
}

/// Append a rule.
pub async fn create_rule(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
    ApiJson(rule): ApiJson<Rule>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.registry.create_rule(&kb_name(&kb)?, rule).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// One rule.
pub async fn get_rule(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.registry.get_rule(&kb_name(&kb)?, &name)?))
}

/// Replace a rule in place; the body may carry a new name.
pub async fn update_rule(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
    ApiJson(rule): ApiJson<Rule>,
) -> Result<impl IntoResponse, ApiError> {
    let updated = state
        .registry
        .update_rule(&kb_name(&kb)?, &name, rule)
        .await?;
    Ok(Json(updated))
}

/// Delete a rule.
pub async fn delete_rule(
    State(state): State<ApiState>,
    Path((kb, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    state.registry.delete_rule(&kb_name(&kb)?, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Open a backward-chaining consultation on the current snapshot.
pub async fn start_consultation(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
    ApiJson(request): ApiJson<StartConsultationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.snapshot(&kb_name(&kb)?)?;
    let reply = state.sessions.start(snapshot, &request.goal)?;
    Ok((StatusCode::CREATED, Json(reply)))
}

/// Latest step of a consultation.
pub async fn get_consultation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.sessions.current(&id)?))
}

/// Answer the pending question.
pub async fn answer_consultation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let certainty = request
        .certainty
        .map(Certainty::try_from)
        .transpose()
        .map_err(|value| {
            ApiError::InvalidInput(format!("Certainty {value} is outside valid range [0,1]"))
        })?;
    let reply = state
        .sessions
        .answer(&id, &request.variable, &request.value, certainty)?;
    Ok(Json(reply))
}

/// Discard a consultation.
pub async fn close_consultation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.close(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Forward-chain from the given facts to a fixpoint.
pub async fn run_forward(
    State(state): State<ApiState>,
    Path(kb): Path<String>,
    ApiJson(request): ApiJson<ForwardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.registry.snapshot(&kb_name(&kb)?)?;
    let outcome = ForwardChainer::new(&snapshot, state.inference).run(
        request
            .facts
            .iter()
            .map(|(variable, value)| (variable.as_str(), value.as_str())),
    )?;
    Ok(Json(outcome))
}

/// Error response with a stable code per failure kind.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request data (400).
    InvalidInput(String),
    /// Knowledge base, variable, rule or session missing (404).
    NotFound {
        /// Machine-readable kind.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Request clashes with current state (409).
    Conflict {
        /// Machine-readable kind.
        code: &'static str,
        /// Human-readable detail.
        message: String,
    },
    /// Definition or rule configuration rejected (422).
    ValidationError(String),
    /// Forward chaining did not settle; carries what was derived (422).
    NonConvergence {
        /// Human-readable detail.
        message: String,
        /// Partial result.
        partial: Box<ForwardOutcome>,
    },
    /// Unexpected failure (500).
    SystemError(String),
}

impl From<KbError> for ApiError {
    fn from(err: KbError) -> Self {
        let message = err.to_string();
        match err {
            KbError::InvalidName(_) => Self::InvalidInput(message),
            KbError::UnknownKb { .. } => Self::NotFound {
                code: "UNKNOWN_KB",
                message,
            },
            KbError::UnknownVariable { .. } => Self::NotFound {
                code: "UNKNOWN_VARIABLE",
                message,
            },
            KbError::UnknownRule { .. } => Self::NotFound {
                code: "UNKNOWN_RULE",
                message,
            },
            KbError::KbAlreadyExists { .. }
            | KbError::VariableAlreadyExists { .. }
            | KbError::RuleAlreadyExists { .. } => Self::Conflict {
                code: "ALREADY_EXISTS",
                message,
            },
            KbError::VariableInUse { .. } => Self::Conflict {
                code: "VARIABLE_IN_USE",
                message,
            },
            KbError::VariableRename { .. } | KbError::Validation { .. } => {
                Self::ValidationError(message)
            }
            KbError::Store(_) => Self::SystemError(message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        match rejection {
            // Well-formed JSON that does not fit the schema, e.g. a missing
            // field or a certainty outside [0,1].
            JsonRejection::JsonDataError(_) => Self::ValidationError(message),
            _ => Self::InvalidInput(message),
        }
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        let message = err.to_string();
        match err {
            InferenceError::UnknownVariable { .. } => Self::NotFound {
                code: "UNKNOWN_VARIABLE",
                message,
            },
            InferenceError::SessionNotFound { .. } => Self::NotFound {
                code: "SESSION_NOT_FOUND",
                message,
            },
            InferenceError::StaleSessionAnswer { .. } => Self::Conflict {
                code: "STALE_SESSION_ANSWER",
                message,
            },
            InferenceError::InvalidAnswer { .. } => Self::InvalidInput(message),
            InferenceError::InvalidLiteral { .. } | InferenceError::InvalidOperator { .. } => {
                Self::ValidationError(message)
            }
            InferenceError::NonConvergence { partial, .. } => {
                Self::NonConvergence { message, partial }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message, partial) = match self {
            Self::InvalidInput(message) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", message, None),
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message, None),
            Self::Conflict { code, message } => (StatusCode::CONFLICT, code, message, None),
            Self::ValidationError(message) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                message,
                None,
            ),
            Self::NonConvergence { message, partial } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "NON_CONVERGENCE",
                message,
                Some(partial),
            ),
            Self::SystemError(message) => {
                error!(%message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SYSTEM_ERROR",
                    message,
                    None,
                )
            }
        };
        debug!(status = %status, code, "request rejected");

        let mut body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        if let Some(partial) = partial {
            body["partial"] = json!(partial);
        }
        (status, Json(body)).into_response()
    }
}

/// All API routes; attach state with `.with_state(..)`.
pub fn create_api_routes() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/kbs", get(list_kbs).post(create_kb))
        .route("/api/v1/kbs/{kb}", get(get_kb).delete(delete_kb))
        .route(
            "/api/v1/kbs/{kb}/variables",
            get(list_variables).post(create_variable),
        )
        .route(
            "/api/v1/kbs/{kb}/variables/{name}",
            put(update_variable)
                .get(get_variable)
                .delete(delete_variable),
        )
        .route("/api/v1/kbs/{kb}/rules", get(list_rules).post(create_rule))
        .route(
            "/api/v1/kbs/{kb}/rules/{name}",
            put(update_rule).get(get_rule).delete(delete_rule),
        )
        .route("/api/v1/kbs/{kb}/consultations", post(start_consultation))
        .route("/api/v1/kbs/{kb}/forward", post(run_forward))
        .route(
            "/api/v1/consultations/{id}",
            get(get_consultation).delete(close_consultation),
        )
        .route(
            "/api/v1/consultations/{id}/answer",
            post(answer_consultation),
        )
}
