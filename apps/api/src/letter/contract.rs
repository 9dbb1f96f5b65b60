//! `generate-letter` contract: a single non-empty `cover_letter` string.

use serde_json::Value;

use crate::letter::prompts::LETTER_SCHEMA;
use crate::llm_client::contract::{ModelContract, ShapeChecker};

const LETTER_FIELDS: &[&str] = &["cover_letter"];

pub struct LetterContract;

impl ModelContract for LetterContract {
    type Output = String;

    const NAME: &'static str = "generate-letter";

    fn schema(&self) -> &'static str {
        LETTER_SCHEMA
    }

    fn validate(&self, value: Value) -> Result<String, Vec<String>> {
        let mut shape = ShapeChecker::new(value, LETTER_FIELDS)?;
        let letter = shape.required_string("cover_letter");
        shape.finish()?;
        Ok(letter.trim().to_string())
    }
}
