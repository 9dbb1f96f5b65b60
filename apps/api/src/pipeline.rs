//! Pipeline Orchestrator: composes extraction, fetching, reduction and the
//! structured model client for the two CoverBot operations.
//!
//! Stateless: every call gets a fresh request id on its span and runs under a
//! deadline equal to the sum of its stage budgets. Stages run in order and the
//! first failure ends the call; nothing partial is returned.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cv::contract::ProfileContract;
use crate::cv::prompts::build_extraction_call;
use crate::extract::{DocumentExtractor, ExtractError};
use crate::fetch::{FetchError, FetchResult, SafeFetcher};
use crate::html;
use crate::letter::contract::LetterContract;
use crate::letter::prompts::build_letter_call;
use crate::llm_client::contract::{ModelError, StructuredClient};
use crate::models::letter::{CoverLetter, GenerationRequest, Language};
use crate::models::profile::Profile;

pub const DEFAULT_MAX_JOB_TEXT_CHARS: usize = 8_000;
pub const DEFAULT_MAX_CV_TEXT_CHARS: usize = 30_000;

/// Characters of job text echoed back alongside the letter.
const JOB_EXCERPT_CHARS: usize = 700;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("request did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

/// Coarse failure classes. The HTTP layer picks status codes per variant; this
/// grouping drives logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    SecurityRejection,
    UpstreamFailure,
    SchemaViolation,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Extract(ExtractError::TooLarge { .. }) => ErrorKind::SecurityRejection,
            PipelineError::Extract(_) => ErrorKind::InvalidInput,
            PipelineError::Fetch(FetchError::InvalidUrl(_)) => ErrorKind::InvalidInput,
            PipelineError::Fetch(
                FetchError::InvalidScheme(_)
                | FetchError::BlockedHost { .. }
                | FetchError::TooLarge { .. }
                | FetchError::TooManyRedirects(_),
            ) => ErrorKind::SecurityRejection,
            PipelineError::Fetch(FetchError::Timeout(_) | FetchError::Upstream(_)) => {
                ErrorKind::UpstreamFailure
            }
            PipelineError::Model(ModelError::SchemaViolation { .. }) => ErrorKind::SchemaViolation,
            PipelineError::Model(_) => ErrorKind::UpstreamFailure,
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::DeadlineExceeded(_) => ErrorKind::UpstreamFailure,
        }
    }

    fn log_failure(&self, operation: &'static str) {
        match self.kind() {
            ErrorKind::SecurityRejection => {
                warn!(target: "security", operation, error = %self, "request rejected")
            }
            ErrorKind::InvalidInput => info!(operation, error = %self, "request refused"),
            ErrorKind::SchemaViolation => {
                if let PipelineError::Model(ModelError::SchemaViolation {
                    contract,
                    attempts,
                    excerpt,
                    ..
                }) = self
                {
                    error!(operation, contract, attempts, %excerpt, "model output unusable");
                }
            }
            ErrorKind::UpstreamFailure => error!(operation, error = %self, "upstream failure"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextBudgets {
    pub max_job_text_chars: usize,
    pub max_cv_text_chars: usize,
}

impl Default for TextBudgets {
    fn default() -> Self {
        Self {
            max_job_text_chars: DEFAULT_MAX_JOB_TEXT_CHARS,
            max_cv_text_chars: DEFAULT_MAX_CV_TEXT_CHARS,
        }
    }
}

pub struct Pipeline {
    extractor: DocumentExtractor,
    fetcher: SafeFetcher,
    model: StructuredClient,
    budgets: TextBudgets,
}

impl Pipeline {
    pub fn new(
        extractor: DocumentExtractor,
        fetcher: SafeFetcher,
        model: StructuredClient,
        budgets: TextBudgets,
    ) -> Self {
        Self {
            extractor,
            fetcher,
            model,
            budgets,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.extractor.max_bytes()
    }

    /// Résumé bytes → validated profile.
    pub async fn extract_profile(
        &self,
        bytes: Bytes,
        declared_type: &str,
        language: Language,
    ) -> Result<Profile, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "extract_profile",
            %request_id,
            %language,
            declared_type,
            size = bytes.len()
        );
        let deadline = self.extractor.parse_timeout() + self.model.call_budget();

        run("extract_profile", deadline, async move {
            let text = self.extractor.extract(bytes, declared_type).await?;
            let text = truncate_chars(text.trim(), self.budgets.max_cv_text_chars);
            if text.is_empty() {
                return Err(PipelineError::InvalidInput(
                    "no text could be extracted from the document".to_string(),
                ));
            }

            let profile = self
                .model
                .call(&ProfileContract, build_extraction_call(text, language))
                .await?;
            info!(
                skills = profile.skills.len(),
                experience = profile.experience.len(),
                education = profile.education.len(),
                "profile extracted"
            );
            Ok(profile)
        })
        .instrument(span)
        .await
    }

    /// Job URL + profile → cover letter. The URL is fetched and reduced before
    /// any model call, so a rejected URL never costs a completion.
    pub async fn generate_letter(
        &self,
        request: GenerationRequest,
    ) -> Result<CoverLetter, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "generate_letter",
            %request_id,
            language = %request.language,
            tone = ?request.tone,
            length = ?request.length
        );
        let deadline = self.fetcher.timeout() + self.model.call_budget();

        run("generate_letter", deadline, async move {
            let page = self.fetcher.fetch(&request.job_url).await?;
            info!(
                final_url = %page.final_url,
                status = page.status,
                redirects = page.redirects,
                bytes = page.body.len(),
                elapsed_ms = page.elapsed.as_millis() as u64,
                "job page fetched"
            );

            let page_text = page_text(&page)?;
            let job_text = truncate_chars(page_text.trim(), self.budgets.max_job_text_chars);
            if job_text.is_empty() {
                return Err(PipelineError::InvalidInput(
                    "the job page contains no readable text".to_string(),
                ));
            }

            let profile = request.profile.normalized();
            let call = build_letter_call(
                job_text,
                &profile,
                request.language,
                request.tone,
                request.length,
            )
            .map_err(|e| PipelineError::InvalidInput(format!("profile cannot be encoded: {e}")))?;

            let letter = self.model.call(&LetterContract, call).await?;
            info!(words = letter.split_whitespace().count(), "cover letter generated");

            Ok(CoverLetter {
                cover_letter: letter,
                job_excerpt: Some(truncate_chars(job_text, JOB_EXCERPT_CHARS).to_string()),
            })
        })
        .instrument(span)
        .await
    }
}

/// Applies the overall deadline and logs the failure inside the caller's span.
async fn run<T>(
    operation: &'static str,
    deadline: Duration,
    work: impl Future<Output = Result<T, PipelineError>>,
) -> Result<T, PipelineError> {
    let result = match tokio::time::timeout(deadline, work).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::DeadlineExceeded(deadline)),
    };
    if let Err(err) = &result {
        err.log_failure(operation);
    }
    result
}

/// Decodes a fetched page by its declared type. Missing `Content-Type` is
/// treated as HTML.
fn page_text(page: &FetchResult) -> Result<String, PipelineError> {
    let essence = page
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty());

    match essence.as_deref() {
        None | Some("text/html") | Some("application/xhtml+xml") => Ok(html::reduce(&decode_body(
            &page.body,
            page.content_type.as_deref(),
        ))),
        Some("text/plain") => Ok(decode_body(&page.body, page.content_type.as_deref())),
        Some(other) => Err(PipelineError::InvalidInput(format!(
            "the job page is '{other}', not an HTML or text document"
        ))),
    }
}

/// Decodes with the `charset` parameter of the declared type. Unknown or
/// missing labels fall back to UTF-8; malformed sequences become U+FFFD.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_label)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = encoding.decode(body);
    text.into_owned()
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use httpmock::prelude::*;
    use regex::Regex;

    use crate::fetch::guard::BlockList;
    use crate::fetch::FetchPolicy;
    use crate::llm_client::testing::ScriptedProvider;
    use crate::llm_client::ModelRequest;
    use crate::models::letter::{LetterLength, Tone};

    const JANE_PROFILE: &str = r#"{"name": "Jane Doe", "email": "jane@x.com", "phone": null,
        "skills": ["Python", "SQL"], "experience": [], "education": []}"#;

    fn pipeline_with(provider: Arc<ScriptedProvider>, blocklist: BlockList) -> Pipeline {
        let fetcher = SafeFetcher::new(FetchPolicy {
            blocklist,
            ..FetchPolicy::default()
        })
        .unwrap();
        Pipeline::new(
            DocumentExtractor::default(),
            fetcher,
            StructuredClient::new(provider, Duration::from_secs(5)),
            TextBudgets::default(),
        )
    }

    /// Reaches the local mock server on 127.0.0.1.
    fn local_pipeline(provider: Arc<ScriptedProvider>) -> Pipeline {
        pipeline_with(provider, BlockList::parse_list("10.0.0.0/8").unwrap())
    }

    fn letter_request(job_url: String, length: LetterLength) -> GenerationRequest {
        GenerationRequest {
            job_url,
            profile: Profile {
                name: Some("Jane Doe".into()),
                skills: vec!["Rust".into(), "SQL".into()],
                ..Profile::default()
            },
            language: Language::En,
            tone: Tone::Formal,
            length,
        }
    }

    /// Writes exactly the upper bound of whatever word range the prompt asks for.
    fn word_counting_model(request: &ModelRequest) -> String {
        let pattern = Regex::new(r"between (\d+) and (\d+) words").unwrap();
        let upper: usize = pattern
            .captures(&request.messages[0].content)
            .and_then(|c| c[2].parse().ok())
            .unwrap_or(10);
        let letter = vec!["word"; upper].join(" ");
        serde_json::json!({ "cover_letter": letter }).to_string()
    }

    async fn job_server() -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/job");
                then.status(200)
                    .header("Content-Type", "text/html; charset=utf-8")
                    .body(
                        "<html><head><script>window.steal()</script><style>.x{}</style></head>\
                         <body><h1>Senior Rust Engineer</h1><p>Acme needs async experience.</p></body></html>",
                    );
            })
            .await;
        server
    }

    #[tokio::test]
    async fn test_extracts_profile_from_plain_text_resume() {
        let provider = Arc::new(ScriptedProvider::new(&[JANE_PROFILE]));
        let pipeline = local_pipeline(provider.clone());

        let profile = pipeline
            .extract_profile(Bytes::from_static(b"Jane Doe, jane@x.com, Python, SQL"), "txt", Language::En)
            .await
            .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.email.as_deref(), Some("jane@x.com"));
        assert_eq!(profile.skills, vec!["Python", "SQL"]);
        assert!(profile.experience.is_empty());
        assert!(profile.education.is_empty());

        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.contains("Jane Doe, jane@x.com, Python, SQL"));
    }

    #[tokio::test]
    async fn test_empty_document_never_reaches_model() {
        let provider = Arc::new(ScriptedProvider::new(&[JANE_PROFILE]));
        let err = local_pipeline(provider.clone())
            .extract_profile(Bytes::from_static(b"  \n\t "), "txt", Language::Ru)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_document_type() {
        let provider = Arc::new(ScriptedProvider::new(&[JANE_PROFILE]));
        let err = local_pipeline(provider.clone())
            .extract_profile(Bytes::from_static(b"GIF89a"), "image/gif", Language::Ru)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extract(ExtractError::UnsupportedType(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversize_upload_is_security_rejection() {
        let provider = Arc::new(ScriptedProvider::new(&[JANE_PROFILE]));
        let pipeline = local_pipeline(provider.clone());
        let bytes = Bytes::from(vec![b'a'; pipeline.max_upload_bytes() + 1]);

        let err = pipeline.extract_profile(bytes, "txt", Language::Ru).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extract(ExtractError::TooLarge { .. })));
        assert_eq!(err.kind(), ErrorKind::SecurityRejection);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_metadata_url_is_blocked_without_model_call() {
        let provider = Arc::new(ScriptedProvider::new(&[r#"{"cover_letter": "never"}"#]));
        let pipeline = pipeline_with(provider.clone(), BlockList::default());

        let err = pipeline
            .generate_letter(letter_request(
                "http://169.254.169.254/latest/meta-data".into(),
                LetterLength::Medium,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(FetchError::BlockedHost { .. })), "{err}");
        assert_eq!(err.kind(), ErrorKind::SecurityRejection);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversize_job_page_is_too_large() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/huge");
                then.status(200)
                    .header("Content-Type", "text/html")
                    .body(vec![b'a'; 2_097_153]);
            })
            .await;
        let provider = Arc::new(ScriptedProvider::new(&[r#"{"cover_letter": "never"}"#]));

        let err = local_pipeline(provider.clone())
            .generate_letter(letter_request(server.url("/huge"), LetterLength::Medium))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(FetchError::TooLarge { .. })), "{err}");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_letter_prompt_carries_reduced_page_only() {
        let server = job_server().await;
        let provider = Arc::new(ScriptedProvider::new(&[
            r#"{"cover_letter": "Dear Acme team,\n\nI build async Rust services."}"#,
        ]));

        let letter = local_pipeline(provider.clone())
            .generate_letter(letter_request(server.url("/job"), LetterLength::Medium))
            .await
            .unwrap();
        assert_eq!(letter.cover_letter, "Dear Acme team,\n\nI build async Rust services.");
        let excerpt = letter.job_excerpt.unwrap();
        assert!(excerpt.contains("Senior Rust Engineer"));

        let prompt = &provider.requests()[0].messages[0].content;
        assert!(prompt.contains("Senior Rust Engineer\nAcme needs async experience."));
        assert!(!prompt.contains("window.steal"));
        assert!(!prompt.contains(".x{}"));
    }

    #[tokio::test]
    async fn test_short_letter_is_materially_shorter_than_long() {
        let server = job_server().await;
        let provider = Arc::new(ScriptedProvider::responding_with(word_counting_model));
        let pipeline = local_pipeline(provider.clone());

        let short = pipeline
            .generate_letter(letter_request(server.url("/job"), LetterLength::Short))
            .await
            .unwrap();
        let long = pipeline
            .generate_letter(letter_request(server.url("/job"), LetterLength::Long))
            .await
            .unwrap();

        let short_words = short.cover_letter.split_whitespace().count();
        let long_words = long.cover_letter.split_whitespace().count();
        assert!(short_words * 2 <= long_words, "{short_words} vs {long_words}");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_job_page_is_invalid_input() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/blank");
                then.status(200)
                    .header("Content-Type", "text/html")
                    .body("<html><body><script>only()</script></body></html>");
            })
            .await;
        let provider = Arc::new(ScriptedProvider::new(&[r#"{"cover_letter": "never"}"#]));

        let err = local_pipeline(provider.clone())
            .generate_letter(letter_request(server.url("/blank"), LetterLength::Short))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_non_document_job_page_is_invalid_input() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/logo");
                then.status(200).header("Content-Type", "image/png").body("\u{89}PNG");
            })
            .await;
        let provider = Arc::new(ScriptedProvider::new(&[]));

        let err = local_pipeline(provider)
            .generate_letter(letter_request(server.url("/logo"), LetterLength::Short))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(ref m) if m.contains("image/png")));
    }

    #[tokio::test]
    async fn test_schema_violation_after_repair() {
        let server = job_server().await;
        let provider = Arc::new(ScriptedProvider::new(&[
            r#"{"letter": "wrong field"}"#,
            r#"{"cover_letter": ""}"#,
        ]));

        let err = local_pipeline(provider.clone())
            .generate_letter(letter_request(server.url("/job"), LetterLength::Short))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_page_text_dispatch() {
        let page = |content_type: Option<&str>, body: &'static str| FetchResult {
            body: Bytes::from_static(body.as_bytes()),
            content_type: content_type.map(str::to_owned),
            final_url: url::Url::parse("https://jobs.example.com/1").unwrap(),
            status: 200,
            redirects: 0,
            elapsed: Duration::ZERO,
        };

        assert_eq!(page_text(&page(None, "<p>Hi</p>")).unwrap(), "Hi");
        assert_eq!(
            page_text(&page(Some("application/xhtml+xml"), "<p>Hi</p>")).unwrap(),
            "Hi"
        );
        assert_eq!(
            page_text(&page(Some("text/plain; charset=utf-8"), "<p>Hi</p>")).unwrap(),
            "<p>Hi</p>"
        );
        assert!(page_text(&page(Some("application/json"), "{}")).is_err());
    }

    #[test]
    fn test_page_text_honours_declared_charset() {
        let (cp1251, _, _) = encoding_rs::WINDOWS_1251.encode("Вакансия: разработчик");
        let page = |content_type: &str, body: &[u8]| FetchResult {
            body: Bytes::copy_from_slice(body),
            content_type: Some(content_type.to_string()),
            final_url: url::Url::parse("https://jobs.example.ru/1").unwrap(),
            status: 200,
            redirects: 0,
            elapsed: Duration::ZERO,
        };

        assert_eq!(
            page_text(&page("text/plain; charset=windows-1251", &cp1251[..])).unwrap(),
            "Вакансия: разработчик"
        );

        let mut html = b"<html><body><h1>".to_vec();
        html.extend_from_slice(&cp1251);
        html.extend_from_slice(b"</h1></body></html>");
        assert_eq!(
            page_text(&page("text/html; charset=\"Windows-1251\"", &html)).unwrap(),
            "Вакансия: разработчик"
        );

        // Unknown label: UTF-8.
        assert_eq!(
            page_text(&page("text/plain; charset=x-nonsense", "héllo".as_bytes())).unwrap(),
            "héllo"
        );
    }

    #[test]
    fn test_charset_label() {
        assert_eq!(charset_label("text/html; charset=KOI8-R"), Some("KOI8-R"));
        assert_eq!(charset_label("text/html;Charset=\"utf-8\""), Some("utf-8"));
        assert_eq!(charset_label("text/html"), None);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }
}
