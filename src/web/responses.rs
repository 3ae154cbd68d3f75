use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::domain::access;
use crate::domain::content::{self, FieldResponse, FormContent};
use crate::domain::error::DomainError;
use crate::domain::merge::{self, RemovalOutcome, SubmittedField, Submitter};
use crate::domain::models::Role;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::EmployeeSession;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub record_id: String,
    pub responses: Vec<SubmittedField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFieldRequest {
    pub record_id: String,
    pub field_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDto {
    pub record_id: String,
    pub responder_id: String,
    pub responder_name: String,
    pub responses: Vec<FieldResponseDto>,
}

/// One answered field, flattened with display context for the client.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResponseDto {
    pub field_id: String,
    pub question: String,
    pub value: String,
    pub linked_response_id: Option<String>,
    pub record_id: String,
    pub employee_id: String,
    pub employee_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerFormResponses {
    pub form_id: i64,
    pub form_title: String,
    pub records: Vec<RecordDto>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/api/employee/form/:id/response",
            post(submit_response).delete(delete_field_response),
        )
        .route("/api/employee/form/:id/responses", get(list_responses))
        .route(
            "/api/employee/form/:id/record/:record_id",
            delete(delete_record),
        )
        .route("/api/owner/responses", get(owner_responses))
        .with_state(state)
}

async fn submit_response(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<RecordDto>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let form_content = FormContent::decode(&form.form_content)?;

    if req.record_id.trim().is_empty() {
        return Err(DomainError::Validation("recordId is required".into()).into());
    }
    if req.responses.is_empty() {
        return Err(DomainError::Validation("no responses submitted".into()).into());
    }

    let field_ids = form_content.field_ids();
    let known: HashSet<&str> = field_ids.iter().map(String::as_str).collect();
    let unknown = merge::unknown_field_ids(&req.responses, &known);
    if !unknown.is_empty() {
        return Err(DomainError::Validation(format!(
            "unknown field ids: {}",
            unknown.join(", ")
        ))
        .into());
    }

    let rows = db::responses_by_form(&state.pool, form_id).await?;
    let submitted: Vec<&str> = req.responses.iter().map(|f| f.field_id.as_str()).collect();
    access::authorize_submission(
        &employee_id,
        employee.role,
        &form.owner_employee_id,
        form.is_active,
        &form_content,
        &submitted,
        &rows,
    )?;

    let submitter = Submitter {
        employee_id: &employee.employee_id,
        employee_name: &employee.employee_name,
    };

    // Read-modify-write under a row lock; a racing insert of the same
    // record id trips the unique index and surfaces as Conflict.
    let mut tx = state.pool.begin().await.map_err(anyhow::Error::from)?;
    let existing = db::response_for_update(&mut tx, form_id, &req.record_id).await?;

    let (saved, merged, action) = match existing {
        Some(row) => {
            let stored = content::decode_field_responses(&row.responses)
                .map_err(|e| DomainError::BadContent(e.to_string()))?;
            let merged = merge::merge(&stored, &req.responses, submitter);
            let payload = content::encode_field_responses(&merged)
                .map_err(|e| anyhow::anyhow!("Failed to encode responses: {e}"))?;
            let saved = db::update_response_payload(&mut tx, row.id, &payload).await?;
            (saved, merged, "UPDATE_RESPONSE")
        }
        None => {
            let merged = merge::merge(&[], &req.responses, submitter);
            let payload = content::encode_field_responses(&merged)
                .map_err(|e| anyhow::anyhow!("Failed to encode responses: {e}"))?;
            match db::insert_response(&mut tx, form_id, &employee_id, &req.record_id, &payload)
                .await
            {
                Ok(saved) => (saved, merged, "SUBMIT"),
                Err(e) if db::is_unique_violation(&e) => {
                    return Err(DomainError::Conflict.into());
                }
                Err(e) => return Err(e.into()),
            }
        }
    };
    tx.commit().await.map_err(anyhow::Error::from)?;

    db::insert_activity(
        &state.pool,
        action,
        Some(form_id),
        &form.title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;

    // The DTO is shaped from the merged responses already in memory; the
    // persisted payload is not re-decoded after the commit.
    let names = db::employee_names(&state.pool).await?;
    Ok(Json(record_dto(&saved, merged, &form_content, &names)))
}

async fn list_responses(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
) -> Result<Json<Vec<RecordDto>>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form_content = FormContent::decode(&form.form_content)?;
    let rows = db::responses_by_form(&state.pool, form_id).await?;

    // Owners and the form owner see everything; everyone else sees only the
    // fields their resolved access covers.
    let visible: Option<HashSet<String>> =
        if employee.role == Role::Owner || form.owner_employee_id == employee_id {
            None
        } else {
            let resolved = access::resolve(
                &employee_id,
                employee.role,
                &form.owner_employee_id,
                &form_content,
                &rows,
            )?;
            Some(resolved.accessible_field_ids.into_iter().collect())
        };

    let names = db::employee_names(&state.pool).await?;
    let records = build_records(&rows, &form_content, visible.as_ref(), &names);
    Ok(Json(records))
}

async fn owner_responses(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<OwnerFormResponses>>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    if employee.role != Role::Owner {
        return Err(DomainError::Forbidden.into());
    }

    let names = db::employee_names(&state.pool).await?;
    let forms = db::list_forms(&state.pool).await?;
    let mut out = Vec::with_capacity(forms.len());
    for form in forms {
        let form_content = match FormContent::decode(&form.form_content) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Skipping form {} with bad content: {}", form.id, e);
                continue;
            }
        };
        let rows = db::responses_by_form(&state.pool, form.id).await?;
        out.push(OwnerFormResponses {
            form_id: form.id,
            form_title: form.title,
            records: build_records(&rows, &form_content, None, &names),
        });
    }
    Ok(Json(out))
}

async fn delete_record(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path((form_id, record_id)): Path<(i64, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let row = db::response_for_record(&state.pool, form_id, &record_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    // Only the record's creator or an owner may drop a whole record.
    if employee.role != Role::Owner && row.employee_id != employee_id {
        return Err(DomainError::Forbidden.into());
    }

    db::delete_record(&state.pool, form_id, &record_id).await?;

    let form_title = db::find_form(&state.pool, form_id)
        .await?
        .map(|f| f.title)
        .unwrap_or_else(|| "Unknown Form".to_string());
    db::insert_activity(
        &state.pool,
        "DELETE_RECORD",
        Some(form_id),
        &form_title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;

    Ok(Json(serde_json::json!({ "deleted": record_id })))
}

async fn delete_field_response(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
    Json(req): Json<DeleteFieldRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if req.record_id.trim().is_empty() || req.field_id.trim().is_empty() {
        return Err(DomainError::Validation("recordId and fieldId are required".into()).into());
    }

    let mut tx = state.pool.begin().await.map_err(anyhow::Error::from)?;
    let row = db::response_for_update(&mut tx, form_id, &req.record_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let stored = content::decode_field_responses(&row.responses)
        .map_err(|e| DomainError::BadContent(e.to_string()))?;

    // The employee may only retract answers they wrote, unless privileged.
    let privileged = employee.role == Role::Owner || form.owner_employee_id == employee_id;
    let owns_answer = stored
        .iter()
        .any(|fr| fr.field_id == req.field_id && fr.employee_id == employee_id);
    if !privileged && !owns_answer {
        return Err(DomainError::Forbidden.into());
    }

    let record_emptied = match merge::remove_field(&stored, &req.field_id) {
        None => return Err(DomainError::NotFound.into()),
        Some(RemovalOutcome::RecordEmpty) => {
            db::delete_response(&mut tx, row.id).await?;
            true
        }
        Some(RemovalOutcome::Remaining(rest)) => {
            let payload = content::encode_field_responses(&rest)
                .map_err(|e| anyhow::anyhow!("Failed to encode responses: {e}"))?;
            db::update_response_payload(&mut tx, row.id, &payload).await?;
            false
        }
    };
    tx.commit().await.map_err(anyhow::Error::from)?;

    db::insert_activity(
        &state.pool,
        "DELETE_RESPONSE",
        Some(form_id),
        &form.title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;

    Ok(Json(serde_json::json!({
        "fieldId": req.field_id,
        "recordEmptied": record_emptied,
    })))
}

/// The record creator's display name, from the directory. Field responses
/// carry their own attribution which may be a later submitter, so the
/// creator's name must never be read off a field entry.
fn responder_name(employee_id: &str, names: &HashMap<String, String>) -> String {
    names
        .get(employee_id)
        .cloned()
        .unwrap_or_else(|| employee_id.to_string())
}

/// Flatten stored rows into record DTOs, optionally restricted to a visible
/// field set. Rows with undecodable payloads are skipped, and records left
/// with no visible fields are dropped entirely.
fn build_records(
    rows: &[db::ResponseRow],
    form_content: &FormContent,
    visible: Option<&HashSet<String>>,
    names: &HashMap<String, String>,
) -> Vec<RecordDto> {
    let questions: HashMap<&str, &str> = form_content
        .fields
        .iter()
        .map(|f| (f.id.as_str(), f.question.as_str()))
        .collect();

    let mut records = Vec::new();
    for row in rows {
        let stored = match content::decode_field_responses(&row.responses) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping response row {} with bad payload: {}", row.id, e);
                continue;
            }
        };
        let responses: Vec<FieldResponseDto> = stored
            .into_iter()
            .filter(|fr| visible.map_or(true, |v| v.contains(&fr.field_id)))
            .map(|fr| field_response_dto(fr, &row.record_id, &questions))
            .collect();
        if responses.is_empty() {
            continue;
        }
        records.push(RecordDto {
            record_id: row.record_id.clone(),
            responder_id: row.employee_id.clone(),
            responder_name: responder_name(&row.employee_id, names),
            responses,
        });
    }
    records
}

fn record_dto(
    row: &db::ResponseRow,
    stored: Vec<FieldResponse>,
    form_content: &FormContent,
    names: &HashMap<String, String>,
) -> RecordDto {
    let questions: HashMap<&str, &str> = form_content
        .fields
        .iter()
        .map(|f| (f.id.as_str(), f.question.as_str()))
        .collect();
    RecordDto {
        record_id: row.record_id.clone(),
        responder_id: row.employee_id.clone(),
        responder_name: responder_name(&row.employee_id, names),
        responses: stored
            .into_iter()
            .map(|fr| field_response_dto(fr, &row.record_id, &questions))
            .collect(),
    }
}

fn field_response_dto(
    fr: FieldResponse,
    record_id: &str,
    questions: &HashMap<&str, &str>,
) -> FieldResponseDto {
    FieldResponseDto {
        question: questions
            .get(fr.field_id.as_str())
            .copied()
            .unwrap_or("Unknown Question")
            .to_string(),
        record_id: record_id.to_string(),
        field_id: fr.field_id,
        value: fr.value,
        linked_response_id: fr.linked_response_id,
        employee_id: fr.employee_id,
        employee_name: fr.employee_name,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::domain::content::Field;

    fn content() -> FormContent {
        FormContent {
            fields: vec![Field {
                id: "f1".to_string(),
                question: "Amount?".to_string(),
                field_type: "text".to_string(),
                level_numbers: vec![1],
                options: Vec::new(),
            }],
            level_assignments: BTreeMap::from([(1, vec!["alice".to_string()])]),
            level_priority_order: vec![1],
        }
    }

    fn row(creator: &str, payload: &str) -> db::ResponseRow {
        db::ResponseRow {
            id: 1,
            form_id: 1,
            employee_id: creator.to_string(),
            record_id: "r1".to_string(),
            responses: payload.to_string(),
            created_at: Utc::now(),
        }
    }

    fn names() -> HashMap<String, String> {
        HashMap::from([
            ("alice".to_string(), "Alice".to_string()),
            ("bob".to_string(), "Bob".to_string()),
        ])
    }

    #[test]
    fn responder_name_follows_the_record_creator_not_field_attribution() {
        // Record created by alice, but her only surviving field was later
        // overwritten by bob. The listing must still name alice.
        let payload =
            r#"[{"employeeId":"bob","employeeName":"Bob","fieldId":"f1","value":"200"}]"#;
        let records = build_records(&[row("alice", payload)], &content(), None, &names());

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].responder_id, "alice");
        assert_eq!(records[0].responder_name, "Alice");
        // Field-level attribution keeps pointing at the overwriter.
        assert_eq!(records[0].responses[0].employee_id, "bob");
        assert_eq!(records[0].responses[0].employee_name, "Bob");
    }

    #[test]
    fn responder_name_falls_back_to_the_id_when_not_in_the_directory() {
        let payload =
            r#"[{"employeeId":"ghost","employeeName":"Ghost","fieldId":"f1","value":"1"}]"#;
        let records = build_records(&[row("ghost", payload)], &content(), None, &HashMap::new());
        assert_eq!(records[0].responder_name, "ghost");
    }

    #[test]
    fn record_dto_resolves_the_creator_through_the_directory() {
        let stored = vec![FieldResponse {
            employee_id: "bob".to_string(),
            employee_name: "Bob".to_string(),
            field_id: "f1".to_string(),
            value: "200".to_string(),
            linked_response_id: None,
        }];
        let dto = record_dto(&row("alice", "[]"), stored, &content(), &names());
        assert_eq!(dto.responder_id, "alice");
        assert_eq!(dto.responder_name, "Alice");
    }

    #[test]
    fn invisible_fields_are_filtered_and_empty_records_dropped() {
        let payload =
            r#"[{"employeeId":"alice","employeeName":"Alice","fieldId":"f1","value":"100"}]"#;
        let visible: HashSet<String> = HashSet::from(["other".to_string()]);
        let records = build_records(
            &[row("alice", payload)],
            &content(),
            Some(&visible),
            &names(),
        );
        assert!(records.is_empty());
    }
}
