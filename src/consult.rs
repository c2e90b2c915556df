use serde::{Deserialize, Serialize};

use crate::dispatch::{ChatClient, ChatRequest, ChatResponse, GenerationParams};
use crate::error::ConsultError;

/// Outcome of consulting one model. Serialized as
/// `{"model", "success", "response", "tokens"}` or `{"model", "success", "error"}`.
///
/// `success` is derived from the outcome, so a failed record can never carry
/// a response. Deserialization rejects records whose fields disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "ResultRecord", try_from = "ResultRecord")]
pub struct ConsultationResult {
    model: String,
    outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        response: String,
        /// `null` in JSON when the backend does not report usage.
        tokens: Option<u64>,
    },
    Failure {
        error: String,
    },
}

impl ConsultationResult {
    pub fn success(
        model: impl Into<String>,
        response: impl Into<String>,
        tokens: Option<u64>,
    ) -> Self {
        Self {
            model: model.into(),
            outcome: Outcome::Success {
                response: response.into(),
                tokens,
            },
        }
    }

    pub fn failure(model: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            outcome: Outcome::Failure {
                error: error.into(),
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn response(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { response, .. } => Some(response),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn tokens(&self) -> Option<u64> {
        match &self.outcome {
            Outcome::Success { tokens, .. } => *tokens,
            Outcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { .. } => None,
            Outcome::Failure { error } => Some(error),
        }
    }
}

/// Wire shape of a result record. `tokens` is doubly optional so a present
/// `null` (success without usage) is distinguishable from an absent key.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResultRecord {
    model: String,
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    tokens: Option<Option<u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

impl From<ConsultationResult> for ResultRecord {
    fn from(result: ConsultationResult) -> Self {
        match result.outcome {
            Outcome::Success { response, tokens } => Self {
                model: result.model,
                success: true,
                response: Some(response),
                tokens: Some(tokens),
                error: None,
            },
            Outcome::Failure { error } => Self {
                model: result.model,
                success: false,
                response: None,
                tokens: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<ResultRecord> for ConsultationResult {
    type Error = String;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        let model = record.model;
        match (record.success, record.response, record.tokens, record.error) {
            (true, Some(response), tokens, None) => {
                Ok(Self::success(model, response, tokens.flatten()))
            }
            (false, None, None, Some(error)) => Ok(Self::failure(model, error)),
            (true, _, _, _) => Err(format!(
                "successful result for {model} must have `response` and no `error`"
            )),
            (false, _, _, _) => Err(format!(
                "failed result for {model} must have `error` and no `response` or `tokens`"
            )),
        }
    }
}

/// Tally of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_results(results: &[ConsultationResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Sends one prompt to a list of models, one at a time, in order.
///
/// Every model yields exactly one [`ConsultationResult`]; client failures are
/// recorded as failed results and never abort the run.
pub struct Consultation<C> {
    client: C,
}

impl<C: ChatClient> Consultation<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub async fn consult(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> ConsultationResult {
        tracing::info!(model, "consulting");

        match self.query(model, prompt, params).await {
            Ok(resp) => {
                tracing::info!(
                    model,
                    chars = resp.text.chars().count(),
                    tokens = ?resp.total_tokens,
                    "response received"
                );
                ConsultationResult::success(model, resp.text, resp.total_tokens)
            }
            Err(e) => {
                tracing::warn!(
                    model,
                    reason = e.reason(),
                    status = ?e.status(),
                    "consultation failed: {e}"
                );
                let mut error = e.to_string();
                if error.trim().is_empty() {
                    error = format!("unknown error ({})", e.reason());
                }
                ConsultationResult::failure(model, error)
            }
        }
    }

    async fn query(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ChatResponse, ConsultError> {
        if model.trim().is_empty() {
            return Err(ConsultError::InvalidModel(model.to_string()));
        }
        let req = ChatRequest::single_turn(model, prompt, params);
        self.client.complete(&req).await
    }

    /// Consult every model in `models`, strictly sequentially.
    pub async fn run_all(
        &self,
        models: &[String],
        prompt: &str,
        params: &GenerationParams,
    ) -> Vec<ConsultationResult> {
        tracing::info!(count = models.len(), models = %models.join(", "), "starting consultation");

        let mut results = Vec::with_capacity(models.len());
        for model in models {
            results.push(self.consult(model, prompt, params).await);
        }

        let summary = RunSummary::from_results(&results);
        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "consultation finished"
        );
        results
    }
}
