//! `extract-profile` contract: the JSON a model must return for a résumé.

use serde_json::Value;

use crate::cv::prompts::PROFILE_SCHEMA;
use crate::llm_client::contract::{ModelContract, ShapeChecker};
use crate::models::profile::Profile;

const PROFILE_FIELDS: &[&str] = &["name", "email", "phone", "skills", "experience", "education"];

pub struct ProfileContract;

impl ModelContract for ProfileContract {
    type Output = Profile;

    const NAME: &'static str = "extract-profile";

    fn schema(&self) -> &'static str {
        PROFILE_SCHEMA
    }

    fn validate(&self, value: Value) -> Result<Profile, Vec<String>> {
        let mut shape = ShapeChecker::new(value, PROFILE_FIELDS)?;
        let profile = Profile {
            name: shape.optional_string("name"),
            email: shape.optional_string("email"),
            phone: shape.optional_string("phone"),
            skills: shape.string_list("skills"),
            experience: shape.string_list("experience"),
            education: shape.string_list("education"),
        };
        shape.finish()?;
        Ok(profile.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_profile_validates() {
        let profile = ProfileContract
            .validate(json!({
                "name": "Jane Doe",
                "email": "jane@x.com",
                "phone": null,
                "skills": ["Python", "SQL", "Python"],
                "experience": ["Data engineer, Acme, 2021–2024"],
                "education": []
            }))
            .unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jane Doe"));
        assert_eq!(profile.phone, None);
        assert_eq!(profile.skills, vec!["Python", "SQL"]);
    }

    #[test]
    fn test_missing_lists_are_present_and_empty() {
        let profile = ProfileContract.validate(json!({"name": "Jane"})).unwrap();
        assert!(profile.skills.is_empty());
        assert!(profile.experience.is_empty());
        assert!(profile.education.is_empty());
    }

    #[test]
    fn test_wrong_types_are_violations_not_coerced() {
        let errors = ProfileContract
            .validate(json!({"name": ["Jane"], "skills": "Python, SQL", "age": 30}))
            .unwrap_err();
        assert_eq!(
            errors,
            vec![
                "field 'name' must be a string or null, got an array".to_string(),
                "field 'skills' must be an array of strings, got a string".to_string(),
                "unexpected field 'age'".to_string(),
            ]
        );
    }

    #[test]
    fn test_non_object_is_violation() {
        assert!(ProfileContract.validate(json!("Jane Doe")).is_err());
    }
}
