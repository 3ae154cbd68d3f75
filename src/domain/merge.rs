//! Per-record merge of repeated submissions. Field-level last-write-wins:
//! an incoming value replaces the stored entry for that field id and is
//! attributed to the new submitter; untouched fields are carried over.

use serde::Deserialize;
use std::collections::HashSet;

use crate::domain::content::FieldResponse;

/// One field of an incoming submission, before attribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedField {
    pub field_id: String,
    pub value: String,
    #[serde(default)]
    pub linked_response_id: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Submitter<'a> {
    pub employee_id: &'a str,
    pub employee_name: &'a str,
}

/// Merge an incoming submission into the existing field responses of a
/// record (pass an empty slice for a brand-new record).
///
/// Post-condition: at most one entry per field id, and the id set is
/// `existing ∪ incoming`.
pub fn merge(
    existing: &[FieldResponse],
    incoming: &[SubmittedField],
    submitter: Submitter<'_>,
) -> Vec<FieldResponse> {
    let mut merged: Vec<FieldResponse> = existing.to_vec();
    for field in incoming {
        merged.retain(|fr| fr.field_id != field.field_id);
        merged.push(FieldResponse {
            employee_id: submitter.employee_id.to_string(),
            employee_name: submitter.employee_name.to_string(),
            field_id: field.field_id.clone(),
            value: field.value.clone(),
            linked_response_id: field.linked_response_id.clone(),
        });
    }
    merged
}

/// Field ids in a submission that the form does not define.
pub fn unknown_field_ids<'a>(
    incoming: &'a [SubmittedField],
    known: &HashSet<&str>,
) -> Vec<&'a str> {
    incoming
        .iter()
        .map(|f| f.field_id.as_str())
        .filter(|id| !known.contains(id))
        .collect()
}

/// Result of removing a single field from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// The record keeps the remaining field responses.
    Remaining(Vec<FieldResponse>),
    /// The removed field was the last one; the whole record must go, not
    /// linger as an empty shell.
    RecordEmpty,
}

/// Remove one field's response. `None` if the record has no entry for that
/// field id.
pub fn remove_field(existing: &[FieldResponse], field_id: &str) -> Option<RemovalOutcome> {
    if !existing.iter().any(|fr| fr.field_id == field_id) {
        return None;
    }
    let remaining: Vec<FieldResponse> = existing
        .iter()
        .filter(|fr| fr.field_id != field_id)
        .cloned()
        .collect();
    Some(if remaining.is_empty() {
        RemovalOutcome::RecordEmpty
    } else {
        RemovalOutcome::Remaining(remaining)
    })
}
