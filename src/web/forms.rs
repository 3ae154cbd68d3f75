use std::collections::{BTreeMap, HashMap};

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db;
use crate::domain::access;
use crate::domain::content::{FieldResponse, FormContent};
use crate::domain::error::DomainError;
use crate::domain::models::Role;
use crate::domain::view;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::EmployeeSession;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFormRequest {
    pub title: String,
    /// The fields document as submitted by the form builder; level
    /// assignments and priority order are supplied separately and embedded
    /// here at creation.
    pub form_content: String,
    pub num_levels: i32,
    pub level_assignments: Vec<LevelAssignmentInput>,
    pub level_priority_order: Vec<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAssignmentInput {
    pub level_number: i32,
    pub employee_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDto {
    pub id: i64,
    pub title: String,
    pub owner_employee_id: String,
    pub num_levels: i32,
    pub is_active: bool,
}

impl From<db::FormRow> for FormDto {
    fn from(f: db::FormRow) -> Self {
        FormDto {
            id: f.id,
            title: f.title,
            owner_employee_id: f.owner_employee_id,
            num_levels: f.num_levels,
            is_active: f.is_active,
        }
    }
}

/// The form as one employee sees it right now: decoded content plus the
/// computed access view. Read-only; the stored content is never mutated.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFormView {
    pub id: i64,
    pub title: String,
    pub owner_employee_id: String,
    pub num_levels: i32,
    pub is_active: bool,
    pub content: FormContent,
    pub accessible_field_ids: Vec<String>,
    pub can_fill_current_level: bool,
    pub higher_priority_responses: HashMap<String, Vec<FieldResponse>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub is_active: Option<bool>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/employee/form", post(create_form))
        .route("/api/employee/forms", get(list_forms))
        .route("/api/employee/form/:id", get(get_form).delete(delete_form))
        .route("/api/employee/form/:id/status", put(toggle_status))
        .with_state(state)
}

async fn create_form(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Json(req): Json<CreateFormRequest>,
) -> Result<Json<FormDto>, ApiError> {
    let owner = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let mut content = FormContent::decode(&req.form_content)?;

    if req.level_assignments.len() != req.num_levels as usize {
        return Err(DomainError::Validation(format!(
            "{} level assignments provided, expected {}",
            req.level_assignments.len(),
            req.num_levels
        ))
        .into());
    }

    let mut assignments: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for assignment in &req.level_assignments {
        if assignment.level_number < 1 || assignment.level_number > req.num_levels {
            return Err(DomainError::Validation(format!(
                "invalid level number in assignment: {}",
                assignment.level_number
            ))
            .into());
        }
        if assignment.employee_ids.is_empty() {
            return Err(DomainError::Validation(format!(
                "no employees assigned to level {}",
                assignment.level_number
            ))
            .into());
        }
        for emp_id in &assignment.employee_ids {
            if db::find_employee(&state.pool, emp_id).await?.is_none() {
                return Err(DomainError::Validation(format!(
                    "unknown employee {emp_id} in level assignment"
                ))
                .into());
            }
        }
        if assignments
            .insert(assignment.level_number, assignment.employee_ids.clone())
            .is_some()
        {
            return Err(DomainError::Validation(format!(
                "duplicate assignment for level {}",
                assignment.level_number
            ))
            .into());
        }
    }

    content.level_assignments = assignments;
    content.level_priority_order = req.level_priority_order.clone();
    content.validate(req.num_levels)?;

    let encoded = serde_json::to_string(&content)
        .map_err(|e| anyhow::anyhow!("Failed to encode form content: {e}"))?;
    let form = db::insert_form(&state.pool, &req.title, &encoded, &employee_id, req.num_levels).await?;

    db::insert_activity(
        &state.pool,
        "CREATE",
        Some(form.id),
        &form.title,
        &employee_id,
        &owner.employee_name,
    )
    .await?;
    tracing::debug!("Form {} created by employee {}", form.id, employee_id);

    Ok(Json(form.into()))
}

async fn list_forms(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<FormDto>>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let all_forms = db::list_forms(&state.pool).await?;
    if employee.role == Role::Owner {
        return Ok(Json(all_forms.into_iter().map(Into::into).collect()));
    }

    // Owned forms plus forms where the employee sits on some level. Forms
    // with undecodable content are skipped here, not fatal to the listing.
    let visible = all_forms
        .into_iter()
        .filter(|form| {
            if form.owner_employee_id == employee_id {
                return true;
            }
            match FormContent::decode(&form.form_content) {
                Ok(content) => content.is_participant(&employee_id),
                Err(e) => {
                    tracing::warn!("Skipping form {} with bad content: {}", form.id, e);
                    false
                }
            }
        })
        .map(Into::into)
        .collect();
    Ok(Json(visible))
}

async fn get_form(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
) -> Result<Json<ResolvedFormView>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    // The form being resolved is the primary object: a decode failure here
    // aborts, unlike sibling rows scanned during aggregation.
    let content = FormContent::decode(&form.form_content)?;

    let rows = db::responses_by_form(&state.pool, form_id).await?;
    let access = access::resolve(
        &employee_id,
        employee.role,
        &form.owner_employee_id,
        &content,
        &rows,
    )?;

    let is_privileged = employee.role == Role::Owner || form.owner_employee_id == employee_id;
    let higher_priority_responses = if is_privileged {
        HashMap::new()
    } else {
        let names = db::employee_names(&state.pool).await?;
        let employee_levels = content.employee_levels(&employee_id);
        view::higher_priority_view(&employee_id, &content, &employee_levels, &rows, &names)
    };

    Ok(Json(ResolvedFormView {
        id: form.id,
        title: form.title,
        owner_employee_id: form.owner_employee_id,
        num_levels: form.num_levels,
        is_active: form.is_active,
        content,
        accessible_field_ids: access.accessible_field_ids,
        can_fill_current_level: access.can_fill_current_level,
        higher_priority_responses,
    }))
}

async fn toggle_status(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<FormDto>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if employee.role != Role::Owner && form.owner_employee_id != employee_id {
        tracing::warn!(
            "Unauthorized status change on form {} by employee {}",
            form_id,
            employee_id
        );
        return Err(DomainError::Forbidden.into());
    }

    let new_status = req
        .is_active
        .ok_or_else(|| DomainError::Validation("isActive is required".into()))?;
    let updated = db::set_form_active(&state.pool, form_id, new_status)
        .await?
        .ok_or(DomainError::NotFound)?;

    db::insert_activity(
        &state.pool,
        "STATUS_CHANGE",
        Some(updated.id),
        &updated.title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;

    Ok(Json(updated.into()))
}

async fn delete_form(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if employee.role != Role::Owner && form.owner_employee_id != employee_id {
        return Err(DomainError::Forbidden.into());
    }

    // Log first: the trail keeps the form's id and title after deletion.
    db::insert_activity(
        &state.pool,
        "DELETE",
        Some(form.id),
        &form.title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;
    db::delete_form_with_responses(&state.pool, form_id).await?;

    tracing::debug!(
        "Deleted form {} and its responses; activity preserved",
        form_id
    );
    Ok(Json(serde_json::json!({ "deleted": form_id })))
}
