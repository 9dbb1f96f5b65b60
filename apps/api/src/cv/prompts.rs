// All LLM prompt constants for profile extraction.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::contract::ContractCall;
use crate::llm_client::prompts::{fence_untrusted, fill_template, UNTRUSTED_CONTENT_RULE};
use crate::models::letter::Language;

/// Extraction is deterministic; the profile should not vary between calls.
const EXTRACTION_TEMPERATURE: f32 = 0.0;
const EXTRACTION_MAX_TOKENS: u32 = 2048;

/// System prompt for profile extraction.
pub const PROFILE_EXTRACTION_SYSTEM: &str = "\
You extract questionnaire fields from a résumé. Invent NOTHING. \
If a value is not present in the résumé, use null for strings and [] for lists. \
Each experience entry is one position (role, company, dates); \
each education entry is one degree or course (institution, field, dates); \
skills are short names of technologies, tools or competencies.";

/// Extraction prompt template.
/// Replace: {language_name}, {cv_block}
pub const PROFILE_EXTRACTION_PROMPT: &str = r#"Target language: {language_name}.
Keep names, e-mail addresses, phone numbers and technology names exactly as written.
If you rephrase experience or education items, write them in {language_name}.

Résumé text:
{cv_block}"#;

/// Shape description appended to the system prompt by the structured client.
pub const PROFILE_SCHEMA: &str = r#"{
  "name": string | null,
  "email": string | null,
  "phone": string | null,
  "skills": string[],
  "experience": string[],
  "education": string[]
}"#;

pub fn build_extraction_call(cv_text: &str, language: Language) -> ContractCall {
    let cv_block = fence_untrusted("resume", cv_text);
    let prompt = fill_template(
        PROFILE_EXTRACTION_PROMPT,
        &[
            ("language_name", language.english_name()),
            ("cv_block", &cv_block),
        ],
    );

    ContractCall {
        system: format!("{PROFILE_EXTRACTION_SYSTEM}\n\n{UNTRUSTED_CONTENT_RULE}"),
        prompt,
        max_tokens: EXTRACTION_MAX_TOKENS,
        temperature: EXTRACTION_TEMPERATURE,
    }
}
