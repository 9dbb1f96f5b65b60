use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::profile::Profile;

/// Output language for letters and reworded profile items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    En,
    Fr,
    Es,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Ru => "ru",
            Language::En => "en",
            Language::Fr => "fr",
            Language::Es => "es",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            Language::Ru => "Russian",
            Language::En => "English",
            Language::Fr => "French",
            Language::Es => "Spanish",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ru" => Ok(Language::Ru),
            "en" => Ok(Language::En),
            "fr" => Ok(Language::Fr),
            "es" => Ok(Language::Es),
            other => Err(format!(
                "unsupported language '{other}'; expected one of ru, en, fr, es"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Formal,
    Friendly,
    Concise,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LetterLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl LetterLength {
    /// Target word range handed to the model.
    pub fn word_range(&self) -> (u32, u32) {
        match self {
            LetterLength::Short => (120, 160),
            LetterLength::Medium => (180, 250),
            LetterLength::Long => (300, 400),
        }
    }

    /// Output token budget: headroom over the upper word bound for JSON framing
    /// and for languages that tokenize less densely than English.
    pub fn max_tokens(&self) -> u32 {
        let (_, upper) = self.word_range();
        upper * 3 + 200
    }
}

/// Body of `POST /letter/from-url`. Omitted options fall back to ru/formal/medium.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub job_url: String,
    pub profile: Profile,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub length: LetterLength,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverLetter {
    pub cover_letter: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_excerpt: Option<String>,
}
