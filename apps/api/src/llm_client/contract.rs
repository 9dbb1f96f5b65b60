//! Structured Model Client: turns a provider call into a validated, typed value.
//!
//! Flow: build request → provider call (under timeout) → strip fences →
//! parse JSON → contract validation. On a validation failure the client sends
//! exactly one repair turn containing the rejected reply and the errors, then
//! gives up with `SchemaViolation`.
//!
//! The shape check always runs here, in our code. Nothing the model says about
//! its own output is trusted.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::llm_client::prompts::{repair_prompt, JSON_ONLY_SYSTEM};
use crate::llm_client::{strip_json_fences, ModelMessage, ModelProvider, ModelRequest, ProviderError};

/// Repair turns allowed after the first reply.
const MAX_REPAIRS: u32 = 1;
/// Characters of the offending reply kept for diagnostics.
const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model output violated the '{contract}' contract after {attempts} attempts: {}", errors.join("; "))]
    SchemaViolation {
        contract: &'static str,
        attempts: u32,
        errors: Vec<String>,
        excerpt: String,
    },

    #[error("model provider failed: {0}")]
    Upstream(String),

    #[error("model provider quota exceeded: {0}")]
    QuotaExceeded(String),
}

impl From<ProviderError> for ModelError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::QuotaExceeded(msg) => ModelError::QuotaExceeded(msg),
            other => ModelError::Upstream(other.to_string()),
        }
    }
}

/// A named output shape. `validate` receives whatever JSON the model produced
/// and either builds the typed output or lists every problem it found.
pub trait ModelContract: Send + Sync {
    type Output: Send;

    const NAME: &'static str;

    /// Human-readable shape appended to the system prompt.
    fn schema(&self) -> &'static str;

    fn validate(&self, value: Value) -> Result<Self::Output, Vec<String>>;
}

/// Prompt material for one contract call.
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Clone)]
pub struct StructuredClient {
    provider: Arc<dyn ModelProvider>,
    call_timeout: Duration,
}

impl StructuredClient {
    pub fn new(provider: Arc<dyn ModelProvider>, call_timeout: Duration) -> Self {
        Self {
            provider,
            call_timeout,
        }
    }

    /// Worst-case wall time of one `call`: the first attempt plus the repair.
    pub fn call_budget(&self) -> Duration {
        self.call_timeout * (1 + MAX_REPAIRS)
    }

    pub async fn call<C: ModelContract>(
        &self,
        contract: &C,
        call: ContractCall,
    ) -> Result<C::Output, ModelError> {
        let system = format!(
            "{}\n\n{}\n\nRequired JSON shape:\n{}",
            call.system,
            JSON_ONLY_SYSTEM,
            contract.schema()
        );
        let mut request = ModelRequest {
            system,
            messages: vec![ModelMessage::user(call.prompt)],
            max_tokens: call.max_tokens,
            temperature: call.temperature,
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let reply = self.complete(&request).await?;

            let errors = match decode(contract, &reply) {
                Ok(output) => {
                    if attempts > 1 {
                        info!(contract = C::NAME, attempts, "model output repaired");
                    }
                    return Ok(output);
                }
                Err(errors) => errors,
            };

            if attempts > MAX_REPAIRS {
                let excerpt: String = reply.chars().take(EXCERPT_CHARS).collect();
                error!(
                    contract = C::NAME,
                    attempts,
                    ?errors,
                    %excerpt,
                    "model output still violates contract after repair"
                );
                return Err(ModelError::SchemaViolation {
                    contract: C::NAME,
                    attempts,
                    errors,
                    excerpt,
                });
            }

            warn!(contract = C::NAME, ?errors, "model output violated contract; requesting repair");
            request.messages.push(ModelMessage::assistant(reply));
            request.messages.push(ModelMessage::user(repair_prompt(&errors)));
        }
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        match tokio::time::timeout(self.call_timeout, self.provider.complete(request)).await {
            Ok(result) => result.map_err(ModelError::from),
            Err(_) => Err(ModelError::Upstream(format!(
                "model call timed out after {:?}",
                self.call_timeout
            ))),
        }
    }
}

fn decode<C: ModelContract>(contract: &C, reply: &str) -> Result<C::Output, Vec<String>> {
    let value: Value = serde_json::from_str(strip_json_fences(reply))
        .map_err(|e| vec![format!("reply is not valid JSON: {e}")])?;
    contract.validate(value)
}

// ────────────────────────────────────────────────────────────────────────────
// Shape checking
// ────────────────────────────────────────────────────────────────────────────

/// Field-by-field checker over a JSON object. Each accessor records a problem
/// instead of failing fast, so one repair turn can address all of them.
pub struct ShapeChecker {
    object: Map<String, Value>,
    allowed: &'static [&'static str],
    errors: Vec<String>,
}

impl ShapeChecker {
    pub fn new(value: Value, allowed: &'static [&'static str]) -> Result<Self, Vec<String>> {
        match value {
            Value::Object(object) => Ok(Self {
                object,
                allowed,
                errors: Vec::new(),
            }),
            other => Err(vec![format!(
                "expected a JSON object, got {}",
                type_name(&other)
            )]),
        }
    }

    /// Absent or `null` reads as `None`.
    pub fn optional_string(&mut self, field: &str) -> Option<String> {
        match self.object.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.errors.push(format!(
                    "field '{field}' must be a string or null, got {}",
                    type_name(other)
                ));
                None
            }
        }
    }

    /// Must be present and non-blank.
    pub fn required_string(&mut self, field: &str) -> String {
        match self.object.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) => {
                self.errors.push(format!("field '{field}' must not be empty"));
                String::new()
            }
            None | Some(Value::Null) => {
                self.errors.push(format!("missing required field '{field}'"));
                String::new()
            }
            Some(other) => {
                self.errors.push(format!(
                    "field '{field}' must be a string, got {}",
                    type_name(other)
                ));
                String::new()
            }
        }
    }

    /// Absent or `null` reads as empty. Every item must be a string.
    pub fn string_list(&mut self, field: &str) -> Vec<String> {
        match self.object.get(field) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => self.errors.push(format!(
                            "{field}[{i}] must be a string, got {}",
                            type_name(other)
                        )),
                    }
                }
                out
            }
            Some(other) => {
                self.errors.push(format!(
                    "field '{field}' must be an array of strings, got {}",
                    type_name(other)
                ));
                Vec::new()
            }
        }
    }

    /// Reports unknown fields along with everything collected so far.
    pub fn finish(mut self) -> Result<(), Vec<String>> {
        let mut unknown: Vec<&String> = self
            .object
            .keys()
            .filter(|k| !self.allowed.contains(&k.as_str()))
            .collect();
        unknown.sort();
        let unknown: Vec<String> = unknown
            .into_iter()
            .map(|k| format!("unexpected field '{k}'"))
            .collect();
        self.errors.extend(unknown);

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::testing::ScriptedProvider;
    use crate::llm_client::Role;
    use serde_json::json;

    /// `{ "answer": string, "tags": [string] }`
    struct AnswerContract;

    impl ModelContract for AnswerContract {
        type Output = (String, Vec<String>);
        const NAME: &'static str = "answer";

        fn schema(&self) -> &'static str {
            r#"{"answer": string, "tags": string[]}"#
        }

        fn validate(&self, value: Value) -> Result<Self::Output, Vec<String>> {
            let mut shape = ShapeChecker::new(value, &["answer", "tags"])?;
            let answer = shape.required_string("answer");
            let tags = shape.string_list("tags");
            shape.finish()?;
            Ok((answer, tags))
        }
    }

    fn call() -> ContractCall {
        ContractCall {
            system: "Answer questions.".into(),
            prompt: "What is Rust?".into(),
            max_tokens: 64,
            temperature: 0.0,
        }
    }

    fn client(provider: Arc<ScriptedProvider>) -> StructuredClient {
        StructuredClient::new(provider, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_valid_first_reply_needs_one_call() {
        let provider = Arc::new(ScriptedProvider::new(&[r#"{"answer": "a language", "tags": ["systems"]}"#]));
        let out = client(provider.clone()).call(&AnswerContract, call()).await.unwrap();
        assert_eq!(out, ("a language".to_string(), vec!["systems".to_string()]));
        assert_eq!(provider.calls(), 1);

        let request = &provider.requests()[0];
        assert!(request.system.starts_with("Answer questions."));
        assert!(request.system.contains(JSON_ONLY_SYSTEM));
        assert!(request.system.contains(r#"{"answer": string, "tags": string[]}"#));
    }

    #[tokio::test]
    async fn test_fenced_reply_is_accepted() {
        let provider = Arc::new(ScriptedProvider::new(&["```json\n{\"answer\": \"x\"}\n```"]));
        let (answer, tags) = client(provider).call(&AnswerContract, call()).await.unwrap();
        assert_eq!(answer, "x");
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn test_one_repair_turn_carries_reply_and_errors() {
        let provider = Arc::new(ScriptedProvider::new(&[
            r#"{"answer": 42, "extra": true}"#,
            r#"{"answer": "fixed"}"#,
        ]));
        let (answer, _) = client(provider.clone()).call(&AnswerContract, call()).await.unwrap();
        assert_eq!(answer, "fixed");
        assert_eq!(provider.calls(), 2);

        let repair = &provider.requests()[1];
        assert_eq!(repair.messages.len(), 3);
        assert_eq!(repair.messages[1].role, Role::Assistant);
        assert_eq!(repair.messages[1].content, r#"{"answer": 42, "extra": true}"#);
        assert_eq!(repair.messages[2].role, Role::User);
        assert!(repair.messages[2].content.contains("field 'answer' must be a string, got a number"));
        assert!(repair.messages[2].content.contains("unexpected field 'extra'"));
    }

    #[tokio::test]
    async fn test_second_violation_is_terminal() {
        let provider = Arc::new(ScriptedProvider::new(&[
            "Sure! Here is your answer: Rust.",
            r#"["not", "an", "object"]"#,
            r#"{"answer": "never requested"}"#,
        ]));
        let err = client(provider.clone()).call(&AnswerContract, call()).await.unwrap_err();
        match err {
            ModelError::SchemaViolation {
                contract,
                attempts,
                errors,
                excerpt,
            } => {
                assert_eq!(contract, "answer");
                assert_eq!(attempts, 2);
                assert_eq!(errors, vec!["expected a JSON object, got an array".to_string()]);
                assert!(excerpt.contains("not"));
            }
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
        assert_eq!(provider.calls(), 2, "exactly one repair attempt");
    }

    #[tokio::test]
    async fn test_quota_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![Err(
            ProviderError::QuotaExceeded("monthly cap".into()),
        )]));
        let err = client(provider.clone()).call(&AnswerContract, call()).await.unwrap_err();
        assert!(matches!(err, ModelError::QuotaExceeded(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream() {
        let provider = Arc::new(ScriptedProvider::with_results(vec![Err(ProviderError::Api {
            status: 500,
            message: "boom".into(),
        })]));
        let err = client(provider.clone()).call(&AnswerContract, call()).await.unwrap_err();
        assert!(matches!(err, ModelError::Upstream(ref m) if m.contains("boom")));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_shape_checker_collects_every_problem() {
        let mut shape = ShapeChecker::new(
            json!({"answer": "", "tags": ["ok", 3, null], "zeta": 1, "alpha": 2}),
            &["answer", "tags"],
        )
        .unwrap();
        assert_eq!(shape.required_string("answer"), "");
        assert_eq!(shape.string_list("tags"), vec!["ok".to_string()]);
        let errors = shape.finish().unwrap_err();
        assert_eq!(
            errors,
            vec![
                "field 'answer' must not be empty".to_string(),
                "tags[1] must be a string, got a number".to_string(),
                "tags[2] must be a string, got null".to_string(),
                "unexpected field 'alpha'".to_string(),
                "unexpected field 'zeta'".to_string(),
            ]
        );
    }

    #[test]
    fn test_shape_checker_optional_string() {
        let mut shape =
            ShapeChecker::new(json!({"a": null, "b": "x", "c": 1}), &["a", "b", "c", "d"]).unwrap();
        assert_eq!(shape.optional_string("a"), None);
        assert_eq!(shape.optional_string("b"), Some("x".to_string()));
        assert_eq!(shape.optional_string("c"), None);
        assert_eq!(shape.optional_string("d"), None);
        assert_eq!(
            shape.finish().unwrap_err(),
            vec!["field 'c' must be a string or null, got a number".to_string()]
        );
    }
}
