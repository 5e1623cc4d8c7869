//! Tests for the HTTP API
//!
//! Knowledge-base CRUD, consultations and forward runs end to end through
//! the router, with error codes checked for every rejection path.

#![allow(missing_docs, clippy::unwrap_used)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use sabio_cli::api::{ApiState, create_api_routes};
use sabio_core::InferenceConfig;
use serde_json::{Value, json};
use tower::ServiceExt; // for `oneshot`

fn create_test_router() -> Router {
    create_test_router_with(InferenceConfig::default())
}

fn create_test_router_with(config: InferenceConfig) -> Router {
    create_api_routes().with_state(ApiState::in_memory(config))
}

/// Helper to make HTTP requests
async fn make_request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    let request = if let Some(body) = body {
        request.body(Body::from(body.to_string()))
    } else {
        request.body(Body::empty())
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));

    (status, json)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    make_request(app, Method::POST, uri, Some(body)).await
}

/// Clinic knowledge base: two rules for `gripe`, one chained rule for `repouso`.
async fn seed_clinic(app: &Router) {
    let (status, _) = post(app, "/api/v1/kbs", json!({ "name": "clinic" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let variables = [
        json!({ "name": "febre", "kind": "categorical", "domain": ["sim", "não"],
                "prompt_text": "O paciente tem febre?" }),
        json!({ "name": "tosse", "kind": "categorical", "domain": ["sim", "não"] }),
        json!({ "name": "gripe", "kind": "categorical", "domain": ["sim", "não"] }),
        json!({ "name": "repouso", "kind": "categorical", "domain": ["sim", "não"] }),
        json!({ "name": "idade", "kind": "numeric", "range": { "min": 0.0, "max": 130.0 } }),
    ];
    for variable in variables {
        let (status, body) = post(app, "/api/v1/kbs/clinic/variables", variable).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }

    let rules = [
        json!({ "name": "R1",
                "antecedent": [{ "variable": "febre", "operator": "==", "literal": "sim" }],
                "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 0.8 }] }),
        json!({ "name": "R2",
                "antecedent": [{ "variable": "tosse", "operator": "==", "literal": "sim" }],
                "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 0.5 }] }),
        json!({ "name": "R3",
                "antecedent": [
                    { "variable": "gripe", "operator": "==", "literal": "sim" },
                    { "variable": "idade", "operator": ">", "literal": "18" }
                ],
                "consequent": [{ "variable": "repouso", "literal": "sim", "certainty": 0.9 }] }),
    ];
    for rule in rules {
        let (status, body) = post(app, "/api/v1/kbs/clinic/rules", rule).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
    }
}

fn assert_close(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap();
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_router();
    let (status, body) = make_request(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "sabio");
}

#[tokio::test]
async fn test_knowledge_base_lifecycle() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let (status, body) = make_request(&app, Method::GET, "/api/v1/kbs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kbs"], json!(["clinic"]));

    let (status, body) = post(&app, "/api/v1/kbs", json!({ "name": "clinic" })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");

    let (status, body) = make_request(&app, Method::GET, "/api/v1/kbs/clinic", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "clinic");
    assert_eq!(body["rules"].as_array().unwrap().len(), 3);

    let (status, body) =
        make_request(&app, Method::GET, "/api/v1/kbs/clinic/variables", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["variables"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["febre", "gripe", "idade", "repouso", "tosse"]);

    let (status, body) = make_request(&app, Method::GET, "/api/v1/kbs/clinic/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["R1", "R2", "R3"]);

    let (status, _) = make_request(&app, Method::DELETE, "/api/v1/kbs/clinic", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = make_request(&app, Method::GET, "/api/v1/kbs/clinic", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_KB");
}

#[tokio::test]
async fn test_invalid_kb_name_is_rejected() {
    let app = create_test_router();
    let (status, body) = post(&app, "/api/v1/kbs", json!({ "name": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_variable_in_use_cannot_be_deleted() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let (status, body) = make_request(
        &app,
        Method::DELETE,
        "/api/v1/kbs/clinic/variables/febre",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "VARIABLE_IN_USE");

    let (status, _) =
        make_request(&app, Method::DELETE, "/api/v1/kbs/clinic/rules/R1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = make_request(
        &app,
        Method::DELETE,
        "/api/v1/kbs/clinic/variables/febre",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) =
        make_request(&app, Method::GET, "/api/v1/kbs/clinic/variables/febre", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_VARIABLE");
}

#[tokio::test]
async fn test_invalid_rule_is_rejected() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let ordering_on_categorical = json!({
        "name": "R9",
        "antecedent": [{ "variable": "febre", "operator": ">", "literal": "sim" }],
        "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 0.3 }]
    });
    let (status, body) = post(&app, "/api/v1/kbs/clinic/rules", ordering_on_categorical).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let undeclared = json!({
        "name": "R9",
        "antecedent": [{ "variable": "dor", "operator": "==", "literal": "sim" }],
        "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 0.3 }]
    });
    let (status, body) = post(&app, "/api/v1/kbs/clinic/rules", undeclared).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = make_request(&app, Method::GET, "/api/v1/kbs/clinic/rules", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rules"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_bodies_use_error_envelope() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/kbs/clinic/rules")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, body) = post(
        &app,
        "/api/v1/kbs/clinic/consultations",
        json!({ "goal": "gripe" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let answer_uri = format!(
        "/api/v1/consultations/{}/answer",
        body["session_id"].as_str().unwrap()
    );
    let (status, body) = post(&app, &answer_uri, json!({ "variable": "febre" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("missing field")
    );

    let overconfident = json!({
        "name": "R9",
        "antecedent": [{ "variable": "tosse", "operator": "==", "literal": "sim" }],
        "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 1.5 }]
    });
    let (status, body) = post(&app, "/api/v1/kbs/clinic/rules", overconfident).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("outside valid range")
    );
}

#[tokio::test]
async fn test_rule_update_keeps_position() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let replacement = json!({
        "name": "R1b",
        "antecedent": [{ "variable": "febre", "operator": "==", "literal": "sim" }],
        "consequent": [{ "variable": "gripe", "literal": "sim", "certainty": 0.6 }]
    });
    let (status, body) = make_request(
        &app,
        Method::PUT,
        "/api/v1/kbs/clinic/rules/R1",
        Some(replacement),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (_, body) = make_request(&app, Method::GET, "/api/v1/kbs/clinic/rules", None).await;
    let names: Vec<&str> = body["rules"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["R1b", "R2", "R3"]);
}

#[tokio::test]
async fn test_consultation_flow() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let (status, body) = post(
        &app,
        "/api/v1/kbs/clinic/consultations",
        json!({ "goal": "gripe" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kb"], "clinic");
    assert_eq!(body["state"], "question");
    assert_eq!(body["variable"], "febre");
    assert_eq!(body["prompt_text"], "O paciente tem febre?");
    assert_eq!(body["why"]["rule"], "R1");
    let id = body["session_id"].as_str().unwrap().to_string();
    let answer_uri = format!("/api/v1/consultations/{id}/answer");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "tosse", "value": "sim" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STALE_SESSION_ANSWER");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "febre", "value": "sim" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "question");
    assert_eq!(body["variable"], "tosse");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "tosse", "value": "talvez" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "tosse", "value": "sim", "certainty": 1.5 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "tosse", "value": "sim", "certainty": 0.6 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "result");
    assert_eq!(body["goal"], "gripe");
    assert_eq!(body["value"], "sim");
    // 0.8 + 0.3 * (1 - 0.8)
    assert_close(&body["certainty"], 0.86);
    assert_eq!(body["rules_used"], json!(["R1", "R2"]));

    let session_uri = format!("/api/v1/consultations/{id}");
    let (status, body) = make_request(&app, Method::GET, &session_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "result");

    let (status, body) = post(
        &app,
        &answer_uri,
        json!({ "variable": "febre", "value": "não" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STALE_SESSION_ANSWER");

    let (status, _) = make_request(&app, Method::DELETE, &session_uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = make_request(&app, Method::GET, &session_uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_consultation_for_unknown_goal() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let (status, body) = post(
        &app,
        "/api/v1/kbs/clinic/consultations",
        json!({ "goal": "sarampo" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_VARIABLE");

    let (status, body) = post(
        &app,
        "/api/v1/kbs/missing/consultations",
        json!({ "goal": "gripe" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "UNKNOWN_KB");
}

#[tokio::test]
async fn test_forward_chaining() {
    let app = create_test_router();
    seed_clinic(&app).await;

    let (status, body) = post(
        &app,
        "/api/v1/kbs/clinic/forward",
        json!({ "facts": { "febre": "sim", "idade": "30" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["rules_used"], json!(["R1", "R3"]));

    let facts = body["facts"].as_array().unwrap();
    let repouso = facts.iter().find(|f| f["variable"] == "repouso").unwrap();
    assert_eq!(repouso["value"], "sim");
    assert_close(&repouso["certainty"], 0.72);
    let febre = facts.iter().find(|f| f["variable"] == "febre").unwrap();
    assert_close(&febre["certainty"], 1.0);

    let (status, body) = post(
        &app,
        "/api/v1/kbs/clinic/forward",
        json!({ "facts": { "idade": "duzentos" } }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_forward_non_convergence_reports_partial_result() {
    let app = create_test_router_with(InferenceConfig {
        max_passes: 3,
        ..InferenceConfig::default()
    });
    let (status, _) = post(&app, "/api/v1/kbs", json!({ "name": "loop" })).await;
    assert_eq!(status, StatusCode::CREATED);
    for name in ["a", "b", "c"] {
        let variable = json!({ "name": name, "kind": "categorical", "domain": ["sim"] });
        let (status, _) = post(&app, "/api/v1/kbs/loop/variables", variable).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    for (name, from, to, cf) in [
        ("R0", "c", "a", 0.5),
        ("R1", "a", "b", 0.9),
        ("R2", "b", "a", 0.9),
    ] {
        let rule = json!({
            "name": name,
            "antecedent": [{ "variable": from, "operator": "==", "literal": "sim" }],
            "consequent": [{ "variable": to, "literal": "sim", "certainty": cf }]
        });
        let (status, _) = post(&app, "/api/v1/kbs/loop/rules", rule).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = post(
        &app,
        "/api/v1/kbs/loop/forward",
        json!({ "facts": { "c": "sim" } }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "NON_CONVERGENCE");
    assert_eq!(body["partial"]["passes"], 3);
    assert_eq!(body["partial"]["facts"].as_array().unwrap().len(), 3);
}
