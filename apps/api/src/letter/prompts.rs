// All LLM prompt constants for cover letter generation.
// Option values map to fixed instruction fragments; nothing the caller sends
// becomes instruction text.

use crate::llm_client::contract::ContractCall;
use crate::llm_client::prompts::{fence_untrusted, fill_template, UNTRUSTED_CONTENT_RULE};
use crate::models::letter::{Language, LetterLength, Tone};
use crate::models::profile::Profile;

const GENERATION_TEMPERATURE: f32 = 0.4;

/// System prompt for letter generation.
pub const LETTER_SYSTEM: &str = "\
You are a career assistant. Write a cover letter for the given vacancy, \
relying ONLY on the candidate profile and the job posting text. \
Do not invent facts: no employers, degrees, years or achievements that are not in the profile. \
Address the letter to the hiring team unless the posting names a contact. \
Do not include placeholders such as [Company] or [Your Name]; omit what is unknown.";

/// Generation prompt template.
/// Replace: {language_instruction}, {tone_instruction}, {length_instruction},
///          {profile_block}, {job_block}
pub const LETTER_PROMPT_TEMPLATE: &str = r#"{language_instruction}
{tone_instruction}
{length_instruction}

Candidate profile (JSON):
{profile_block}

Job posting (text extracted from the web page):
{job_block}

Put the complete letter text, with paragraphs separated by blank lines, in the "cover_letter" field."#;

/// Shape description appended to the system prompt by the structured client.
pub const LETTER_SCHEMA: &str = r#"{
  "cover_letter": string
}"#;

pub fn language_instruction(language: Language) -> &'static str {
    match language {
        Language::Ru => "Write the letter in Russian.",
        Language::En => "Write the letter in English.",
        Language::Fr => "Write the letter in French.",
        Language::Es => "Write the letter in Spanish.",
    }
}

pub fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Formal => "Tone: formal and professional; courteous business register, no slang.",
        Tone::Friendly => "Tone: warm and friendly while staying professional; natural, personable phrasing.",
        Tone::Concise => "Tone: concise and direct; short sentences, no filler, lead with the strongest match.",
    }
}

pub fn length_instruction(length: LetterLength) -> &'static str {
    match length {
        LetterLength::Short => "Target length: between 120 and 160 words.",
        LetterLength::Medium => "Target length: between 180 and 250 words.",
        LetterLength::Long => "Target length: between 300 and 400 words.",
    }
}

pub fn build_letter_call(
    job_text: &str,
    profile: &Profile,
    language: Language,
    tone: Tone,
    length: LetterLength,
) -> Result<ContractCall, serde_json::Error> {
    let profile_block = fence_untrusted("candidate_profile", &serde_json::to_string_pretty(profile)?);
    let job_block = fence_untrusted("job_posting", job_text);
    let prompt = fill_template(
        LETTER_PROMPT_TEMPLATE,
        &[
            ("language_instruction", language_instruction(language)),
            ("tone_instruction", tone_instruction(tone)),
            ("length_instruction", length_instruction(length)),
            ("profile_block", &profile_block),
            ("job_block", &job_block),
        ],
    );

    Ok(ContractCall {
        system: format!("{LETTER_SYSTEM}\n\n{UNTRUSTED_CONTENT_RULE}"),
        prompt,
        max_tokens: length.max_tokens(),
        temperature: GENERATION_TEMPERATURE,
    })
}
