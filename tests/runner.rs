//! Consultation runner: ordering, failure capture, and the result contract.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use consult::consult::{Consultation, ConsultationResult, RunSummary};
use consult::dispatch::{ChatClient, ChatRequest, ChatResponse, GenerationParams, Role};
use consult::error::ConsultError;

/// Scripted client: each model maps to a canned reply or error message.
/// Unknown models fail with an upstream 404.
#[derive(Default)]
struct FakeClient {
    replies: HashMap<String, Result<(String, Option<u64>), String>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl FakeClient {
    fn ok(mut self, model: &str, text: &str, tokens: Option<u64>) -> Self {
        self.replies
            .insert(model.to_string(), Ok((text.to_string(), tokens)));
        self
    }

    fn err(mut self, model: &str, message: &str) -> Self {
        self.replies
            .insert(model.to_string(), Err(message.to_string()));
        self
    }

    fn seen_models(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }
}

#[async_trait]
impl ChatClient for FakeClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, ConsultError> {
        self.seen.lock().unwrap().push(req.clone());
        match self.replies.get(&req.model) {
            Some(Ok((text, tokens))) => Ok(ChatResponse {
                text: text.clone(),
                total_tokens: *tokens,
            }),
            Some(Err(message)) => Err(ConsultError::Other(message.clone())),
            None => Err(ConsultError::Upstream {
                provider: "fake".to_string(),
                message: format!("404: no such model {}", req.model),
                status: Some(404),
            }),
        }
    }
}

fn models(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|m| m.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Two-model scenario: one success, one rate-limit failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_then_failure_in_order() {
    let client = FakeClient::default()
        .ok("m1", "hello", Some(12))
        .err("m2", "rate limited");
    let runner = Consultation::new(client);

    let results = runner
        .run_all(&models(&["m1", "m2"]), "prompt", &GenerationParams::default())
        .await;

    assert_eq!(
        results,
        vec![
            ConsultationResult::success("m1", "hello", Some(12)),
            ConsultationResult::failure("m2", "rate limited"),
        ]
    );
    assert_eq!(runner.client().seen_models(), vec!["m1", "m2"]);
}

#[tokio::test]
async fn failure_does_not_stop_later_models() {
    let client = FakeClient::default()
        .err("a", "auth failed")
        .ok("c", "third", None);
    let runner = Consultation::new(client);

    let ids = models(&["a", "b", "c"]);
    let results = runner
        .run_all(&ids, "prompt", &GenerationParams::default())
        .await;

    assert_eq!(results.len(), 3);
    let order: Vec<&str> = results.iter().map(|r| r.model()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    assert!(!results[0].is_success());
    assert!(!results[1].is_success());
    assert!(results[1].error().unwrap().contains("no such model b"));
    assert!(results[2].is_success());
    assert_eq!(results[2].response(), Some("third"));
}

#[tokio::test]
async fn duplicate_models_are_consulted_twice() {
    let client = FakeClient::default().ok("m", "again", Some(1));
    let runner = Consultation::new(client);

    let results = runner
        .run_all(&models(&["m", "m"]), "prompt", &GenerationParams::default())
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(runner.client().seen_models(), vec!["m", "m"]);
}

#[tokio::test]
async fn empty_model_list_yields_no_results() {
    let runner = Consultation::new(FakeClient::default());
    let results = runner
        .run_all(&[], "prompt", &GenerationParams::default())
        .await;
    assert!(results.is_empty());
    assert!(runner.client().seen_models().is_empty());
}

// ---------------------------------------------------------------------------
// Single consultation contract
// ---------------------------------------------------------------------------

#[tokio::test]
async fn consult_sends_single_user_message_with_params() {
    let runner = Consultation::new(FakeClient::default().ok("m", "ok", None));
    let params = GenerationParams {
        max_tokens: 321,
        temperature: 0.25,
    };

    runner.consult("m", "the question", &params).await;

    let seen = runner.client().seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let req = &seen[0];
    assert_eq!(req.messages.len(), 1);
    assert_eq!(req.messages[0].role, Role::User);
    assert_eq!(req.messages[0].content, "the question");
    assert_eq!(req.max_tokens, 321);
    assert_eq!(req.temperature, 0.25);
}

#[tokio::test]
async fn success_without_usage_has_no_tokens() {
    let runner = Consultation::new(FakeClient::default().ok("m", "text", None));
    let result = runner
        .consult("m", "q", &GenerationParams::default())
        .await;
    assert!(result.is_success());
    assert_eq!(result.response(), Some("text"));
    assert_eq!(result.tokens(), None);
    assert_eq!(result.error(), None);
}

#[tokio::test]
async fn failure_has_error_and_no_response() {
    let runner = Consultation::new(FakeClient::default().err("m", "network down"));
    let result = runner
        .consult("m", "q", &GenerationParams::default())
        .await;
    assert!(!result.is_success());
    assert_eq!(result.error(), Some("network down"));
    assert_eq!(result.response(), None);

    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("response").is_none());
    assert!(json.get("tokens").is_none());
}

#[tokio::test]
async fn empty_error_message_is_replaced() {
    let runner = Consultation::new(FakeClient::default().err("m", ""));
    let result = runner
        .consult("m", "q", &GenerationParams::default())
        .await;
    assert!(!result.is_success());
    assert!(!result.error().unwrap().is_empty());
}

#[tokio::test]
async fn blank_model_id_fails_without_calling_client() {
    let runner = Consultation::new(FakeClient::default());
    let result = runner
        .consult("  ", "q", &GenerationParams::default())
        .await;
    assert!(!result.is_success());
    assert!(result.error().unwrap().contains("invalid model identifier"));
    assert!(runner.client().seen_models().is_empty());
}

// ---------------------------------------------------------------------------
// Result record (de)serialization and summary
// ---------------------------------------------------------------------------

#[test]
fn result_round_trips_through_json() {
    let ok = ConsultationResult::success("m1", "hello", Some(12));
    let failed = ConsultationResult::failure("m2", "rate limited");
    let json = serde_json::to_string(&vec![ok.clone(), failed.clone()]).unwrap();
    let parsed: Vec<ConsultationResult> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, vec![ok, failed]);
}

#[test]
fn failed_record_with_response_is_rejected() {
    let json = r#"{"model":"m","success":false,"response":"x","tokens":null}"#;
    let err = serde_json::from_str::<ConsultationResult>(json).unwrap_err();
    assert!(err.to_string().contains("must have `error`"), "{err}");
}

#[test]
fn contradictory_records_are_rejected() {
    for json in [
        r#"{"model":"m","success":true,"error":"boom"}"#,
        r#"{"model":"m","success":true,"response":"x","error":"boom"}"#,
        r#"{"model":"m","success":false,"error":"boom","tokens":null}"#,
        r#"{"model":"m","success":false}"#,
        r#"{"model":"m","success":true,"response":"x","extra":1}"#,
    ] {
        assert!(
            serde_json::from_str::<ConsultationResult>(json).is_err(),
            "accepted {json}"
        );
    }
}

#[test]
fn success_record_without_tokens_key_is_accepted() {
    let parsed: ConsultationResult =
        serde_json::from_str(r#"{"model":"m","success":true,"response":"x"}"#).unwrap();
    assert_eq!(parsed, ConsultationResult::success("m", "x", None));
    assert!(parsed.is_success());
}

#[test]
fn summary_counts_outcomes() {
    let results = vec![
        ConsultationResult::success("a", "x", None),
        ConsultationResult::failure("b", "y"),
        ConsultationResult::success("c", "z", Some(4)),
    ];
    let summary = RunSummary::from_results(&results);
    assert_eq!(
        summary,
        RunSummary {
            total: 3,
            succeeded: 2,
            failed: 1
        }
    );
}
