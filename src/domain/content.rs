use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Field types that only make sense with a fixed set of options.
const CHOICE_TYPES: &[&str] = &["radio", "checkbox", "dropdown"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub level_numbers: Vec<i32>,
    #[serde(default)]
    pub options: Vec<String>,
}

/// The decoded form document: fields, level → employee pool, and the level
/// priority order (index 0 acts first). Re-decoded from the stored text on
/// every request; never mutated after decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormContent {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub level_assignments: BTreeMap<i32, Vec<String>>,
    #[serde(default)]
    pub level_priority_order: Vec<i32>,
}

impl FormContent {
    pub fn decode(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::BadContent("form content is empty".into()));
        }
        serde_json::from_str(raw).map_err(|e| DomainError::BadContent(e.to_string()))
    }

    /// Structural checks applied once, at form creation. Assignment pool
    /// sizes and employee existence are checked by the caller since they
    /// need the employee directory.
    pub fn validate(&self, num_levels: i32) -> Result<(), DomainError> {
        if num_levels < 1 {
            return Err(DomainError::Validation(format!(
                "invalid number of levels: {num_levels}"
            )));
        }

        let order = &self.level_priority_order;
        if order.len() != num_levels as usize {
            return Err(DomainError::Validation(format!(
                "level priority order has {} entries, expected {num_levels}",
                order.len()
            )));
        }
        let mut seen = vec![false; num_levels as usize];
        for &level in order {
            if level < 1 || level > num_levels || seen[(level - 1) as usize] {
                return Err(DomainError::Validation(format!(
                    "level priority order is not a permutation of 1..={num_levels}"
                )));
            }
            seen[(level - 1) as usize] = true;
        }

        for field in &self.fields {
            if field.level_numbers.is_empty() {
                return Err(DomainError::Validation(format!(
                    "field {} has no level assignments",
                    field.id
                )));
            }
            for &level in &field.level_numbers {
                if level < 1 || level > num_levels {
                    return Err(DomainError::Validation(format!(
                        "field {} references level {level}, expected 1..={num_levels}",
                        field.id
                    )));
                }
            }
            if CHOICE_TYPES.contains(&field.field_type.as_str()) && field.options.is_empty() {
                return Err(DomainError::Validation(format!(
                    "{} field {} has no options",
                    field.field_type, field.id
                )));
            }
        }

        Ok(())
    }

    pub fn field_ids(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.id.clone()).collect()
    }

    pub fn has_field(&self, field_id: &str) -> bool {
        self.fields.iter().any(|f| f.id == field_id)
    }

    /// Every level number whose assignment pool contains the employee.
    pub fn employee_levels(&self, employee_id: &str) -> Vec<i32> {
        self.level_assignments
            .iter()
            .filter(|(_, pool)| pool.iter().any(|e| e == employee_id))
            .map(|(&level, _)| level)
            .collect()
    }

    pub fn is_participant(&self, employee_id: &str) -> bool {
        self.level_assignments
            .values()
            .any(|pool| pool.iter().any(|e| e == employee_id))
    }

    /// Ids of fields belonging to at least one of the given levels.
    pub fn field_ids_in_levels(&self, levels: &[i32]) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.level_numbers.iter().any(|l| levels.contains(l)))
            .map(|f| f.id.clone())
            .collect()
    }
}

/// One answered field inside a stored record. The canonical record payload
/// is a JSON array of these with at most one entry per field id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResponse {
    pub employee_id: String,
    pub employee_name: String,
    pub field_id: String,
    pub value: String,
    #[serde(default)]
    pub linked_response_id: Option<String>,
}

pub fn decode_field_responses(raw: &str) -> Result<Vec<FieldResponse>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn encode_field_responses(responses: &[FieldResponse]) -> Result<String, serde_json::Error> {
    serde_json::to_string(responses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(id: &str, levels: &[i32]) -> Field {
        Field {
            id: id.to_string(),
            question: format!("Question {id}"),
            field_type: "text".to_string(),
            level_numbers: levels.to_vec(),
            options: Vec::new(),
        }
    }

    fn content_two_levels() -> FormContent {
        FormContent {
            fields: vec![field("f1", &[1]), field("f2", &[2])],
            level_assignments: BTreeMap::from([
                (1, vec!["alice".to_string()]),
                (2, vec!["bob".to_string()]),
            ]),
            level_priority_order: vec![1, 2],
        }
    }

    #[test]
    fn decode_rejects_empty_and_malformed_documents() {
        assert!(matches!(
            FormContent::decode("   "),
            Err(DomainError::BadContent(_))
        ));
        assert!(matches!(
            FormContent::decode("{not json"),
            Err(DomainError::BadContent(_))
        ));
    }

    #[test]
    fn decode_reads_camel_case_document() {
        let raw = r#"{
            "fields": [
                {"id": "f1", "question": "Name?", "type": "text", "levelNumbers": [1]},
                {"id": "f2", "question": "Pick", "type": "radio", "levelNumbers": [2], "options": ["a", "b"]}
            ],
            "levelAssignments": {"1": ["alice"], "2": ["bob"]},
            "levelPriorityOrder": [1, 2]
        }"#;
        let content = FormContent::decode(raw).unwrap();
        assert_eq!(content.fields.len(), 2);
        assert_eq!(content.level_assignments[&1], vec!["alice"]);
        assert_eq!(content.level_priority_order, vec![1, 2]);
        assert_eq!(content.fields[1].options, vec!["a", "b"]);
    }

    #[test]
    fn validate_rejects_bad_priority_order() {
        let mut content = content_two_levels();
        content.level_priority_order = vec![1, 1];
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));

        content.level_priority_order = vec![1];
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));

        content.level_priority_order = vec![1, 3];
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn validate_rejects_field_without_levels_or_out_of_range() {
        let mut content = content_two_levels();
        content.fields.push(field("f3", &[]));
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));

        content.fields.pop();
        content.fields.push(field("f3", &[5]));
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn validate_requires_options_for_choice_fields() {
        let mut content = content_two_levels();
        content.fields.push(Field {
            id: "pick".to_string(),
            question: "Pick one".to_string(),
            field_type: "radio".to_string(),
            level_numbers: vec![1],
            options: Vec::new(),
        });
        assert!(matches!(
            content.validate(2),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn validate_accepts_well_formed_content() {
        assert!(content_two_levels().validate(2).is_ok());
    }

    #[test]
    fn level_helpers() {
        let content = content_two_levels();
        assert_eq!(content.employee_levels("alice"), vec![1]);
        assert!(content.employee_levels("carol").is_empty());
        assert!(content.is_participant("bob"));
        assert!(!content.is_participant("carol"));
        assert_eq!(content.field_ids_in_levels(&[1]), vec!["f1"]);
        assert_eq!(content.field_ids_in_levels(&[1, 2]), vec!["f1", "f2"]);
    }
}
