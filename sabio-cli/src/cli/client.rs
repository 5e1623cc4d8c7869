//! Typed HTTP client for the Sabio API.

use anyhow::{Context, Result, anyhow};
use reqwest::{RequestBuilder, StatusCode};
use sabio_core::{ForwardOutcome, KnowledgeBase, Rule, SessionReply, Variable};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;

use super::server::get_server_connection;
use crate::api::{AnswerRequest, ForwardRequest};

#[derive(Deserialize)]
struct KbList {
    kbs: Vec<String>,
}

#[derive(Deserialize)]
struct VariableList {
    variables: Vec<Variable>,
}

#[derive(Deserialize)]
struct RuleList {
    rules: Vec<Rule>,
}

fn format_error(status: StatusCode, body: &str) -> anyhow::Error {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string));
    let body = body.trim();
    match detail {
        Some(detail) => anyhow!("Server responded with status {status}: {detail}"),
        None if !body.is_empty() => anyhow!("Server responded with status {status}: {body}"),
        None => anyhow!("Server responded with status {status}"),
    }
}

/// Client bound to one server.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Client for a server on localhost.
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            http: reqwest::Client::new(),
        }
    }

    /// Client for the server recorded in the PID file.
    ///
    /// # Errors
    ///
    /// Returns error if no healthy server is running.
    pub async fn connect() -> Result<Self> {
        Ok(Self::new(get_server_connection().await?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to {what}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format_error(status, &body));
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to parse response to {what}"))
    }

    async fn send_empty(&self, request: RequestBuilder, what: &str) -> Result<()> {
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to {what}"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format_error(status, &body));
        }
        Ok(())
    }

    /// Server health document.
    pub async fn health(&self) -> Result<Value> {
        self.send(self.http.get(self.url("/health")), "check server health")
            .await
    }

    /// Knowledge-base names.
    pub async fn list_kbs(&self) -> Result<Vec<String>> {
        let list: KbList = self
            .send(self.http.get(self.url("/api/v1/kbs")), "list knowledge bases")
            .await?;
        Ok(list.kbs)
    }

    /// Create an empty knowledge base.
    pub async fn create_kb(&self, name: &str) -> Result<()> {
        let _: Value = self
            .send(
                self.http
                    .post(self.url("/api/v1/kbs"))
                    .json(&json!({ "name": name })),
                "create knowledge base",
            )
            .await?;
        Ok(())
    }

    /// Full knowledge base.
    pub async fn get_kb(&self, name: &str) -> Result<KnowledgeBase> {
        self.send(
            self.http.get(self.url(&format!("/api/v1/kbs/{name}"))),
            "fetch knowledge base",
        )
        .await
    }

    /// Delete a knowledge base.
    pub async fn delete_kb(&self, name: &str) -> Result<()> {
        self.send_empty(
            self.http.delete(self.url(&format!("/api/v1/kbs/{name}"))),
            "delete knowledge base",
        )
        .await
    }

    /// Variables of a knowledge base.
    pub async fn list_variables(&self, kb: &str) -> Result<Vec<Variable>> {
        let list: VariableList = self
            .send(
                self.http.get(self.url(&format!("/api/v1/kbs/{kb}/variables"))),
                "list variables",
            )
            .await?;
        Ok(list.variables)
    }

    /// Declare a variable.
    pub async fn create_variable(&self, kb: &str, variable: &Variable) -> Result<Variable> {
        self.send(
            self.http
                .post(self.url(&format!("/api/v1/kbs/{kb}/variables")))
                .json(variable),
            "create variable",
        )
        .await
    }

    /// Delete a variable.
    pub async fn delete_variable(&self, kb: &str, name: &str) -> Result<()> {
        self.send_empty(
            self.http
                .delete(self.url(&format!("/api/v1/kbs/{kb}/variables/{name}"))),
            "delete variable",
        )
        .await
    }

    /// Rules of a knowledge base.
    pub async fn list_rules(&self, kb: &str) -> Result<Vec<Rule>> {
        let list: RuleList = self
            .send(
                self.http.get(self.url(&format!("/api/v1/kbs/{kb}/rules"))),
                "list rules",
            )
            .await?;
        Ok(list.rules)
    }

    /// Append a rule.
    pub async fn create_rule(&self, kb: &str, rule: &Rule) -> Result<Rule> {
        self.send(
            self.http
                .post(self.url(&format!("/api/v1/kbs/{kb}/rules")))
                .json(rule),
            "create rule",
        )
        .await
    }

    /// Delete a rule.
    pub async fn delete_rule(&self, kb: &str, name: &str) -> Result<()> {
        self.send_empty(
            self.http
                .delete(self.url(&format!("/api/v1/kbs/{kb}/rules/{name}"))),
            "delete rule",
        )
        .await
    }

    /// Open a consultation.
    pub async fn start_consultation(&self, kb: &str, goal: &str) -> Result<SessionReply> {
        self.send(
            self.http
                .post(self.url(&format!("/api/v1/kbs/{kb}/consultations")))
                .json(&json!({ "goal": goal })),
            "start consultation",
        )
        .await
    }

    /// Answer the pending question of a consultation.
    pub async fn answer(
        &self,
        session_id: &str,
        variable: &str,
        value: &str,
        certainty: Option<f64>,
    ) -> Result<SessionReply> {
        let body = AnswerRequest {
            variable: variable.to_string(),
            value: value.to_string(),
            certainty,
        };
        self.send(
            self.http
                .post(self.url(&format!("/api/v1/consultations/{session_id}/answer")))
                .json(&body),
            "answer question",
        )
        .await
    }

    /// Discard a consultation.
    pub async fn close_consultation(&self, session_id: &str) -> Result<()> {
        self.send_empty(
            self.http
                .delete(self.url(&format!("/api/v1/consultations/{session_id}"))),
            "close consultation",
        )
        .await
    }

    /// Forward-chain from `facts`.
    pub async fn forward(
        &self,
        kb: &str,
        facts: BTreeMap<String, String>,
    ) -> Result<ForwardOutcome> {
        self.send(
            self.http
                .post(self.url(&format!("/api/v1/kbs/{kb}/forward")))
                .json(&ForwardRequest { facts }),
            "run forward chaining",
        )
        .await
    }
}
