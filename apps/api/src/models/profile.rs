use serde::{Deserialize, Deserializer, Serialize};

/// Candidate profile extracted from a résumé or supplied by the caller.
///
/// The three list fields are always present. A missing or `null` list in
/// incoming JSON deserializes to an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub experience: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub education: Vec<String>,
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Profile {
    /// Trims every value, turns blank strings into `None`, drops blank list
    /// items and repeated items (first occurrence wins).
    pub fn normalized(self) -> Self {
        Self {
            name: normalize_str(self.name),
            email: normalize_str(self.email),
            phone: normalize_str(self.phone),
            skills: normalize_list(self.skills),
            experience: normalize_list(self.experience),
            education: normalize_list(self.education),
        }
    }
}

fn normalize_str(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn normalize_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|seen| seen == item) {
            out.push(item.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_null_lists_become_empty() {
        let p: Profile = serde_json::from_str(r#"{"name": "Jane", "skills": null}"#).unwrap();
        assert_eq!(p.name.as_deref(), Some("Jane"));
        assert!(p.skills.is_empty());
        assert!(p.experience.is_empty());
        assert!(p.education.is_empty());
    }

    #[test]
    fn test_serializes_all_fields() {
        let json = serde_json::to_value(Profile::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": null, "email": null, "phone": null,
                "skills": [], "experience": [], "education": []
            })
        );
    }

    #[test]
    fn test_normalized_trims_and_dedups() {
        let p = Profile {
            name: Some("  Jane Doe ".into()),
            email: Some("   ".into()),
            phone: None,
            skills: vec![" Rust".into(), "SQL".into(), "Rust".into(), "".into()],
            experience: vec!["Acme 2020-2023".into()],
            education: vec![" ".into()],
        }
        .normalized();
        assert_eq!(p.name.as_deref(), Some("Jane Doe"));
        assert_eq!(p.email, None);
        assert_eq!(p.skills, vec!["Rust", "SQL"]);
        assert_eq!(p.experience, vec!["Acme 2020-2023"]);
        assert!(p.education.is_empty());
    }
}
