use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db;
use crate::domain::content::FormContent;
use crate::domain::error::DomainError;
use crate::domain::models::Role;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::EmployeeSession;

const RECENT_LIMIT: i64 = 10;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
    pub action_type: String,
    pub form_id: Option<i64>,
    pub form_title: String,
    pub employee_id: String,
    pub employee_name: String,
    pub timestamp: DateTime<Utc>,
}

impl From<db::ActivityRow> for ActivityDto {
    fn from(a: db::ActivityRow) -> Self {
        ActivityDto {
            action_type: a.action_type,
            form_id: a.form_id,
            form_title: a.form_title,
            employee_id: a.employee_id,
            employee_name: a.employee_name,
            timestamp: a.timestamp,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/employee/recent-activity", get(recent_activity))
        .route("/api/employee/form/:id/activity", get(form_activity))
        .route(
            "/api/employee/form/:id/activity/add-record",
            post(log_add_record),
        )
        .with_state(state)
}

/// Owners get the global feed; everyone else gets activity scoped to forms
/// they are assigned to or have touched before.
async fn recent_activity(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<ActivityDto>>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    if employee.role == Role::Owner {
        let rows = db::recent_activity(&state.pool, RECENT_LIMIT).await?;
        return Ok(Json(rows.into_iter().map(Into::into).collect()));
    }

    let mut form_ids: HashSet<i64> = HashSet::new();
    for form in db::list_forms(&state.pool).await? {
        if form.owner_employee_id == employee_id {
            form_ids.insert(form.id);
            continue;
        }
        match FormContent::decode(&form.form_content) {
            Ok(content) if content.is_participant(&employee_id) => {
                form_ids.insert(form.id);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Skipping form {} with bad content: {}", form.id, e);
            }
        }
    }
    form_ids.extend(db::form_ids_touched_by(&state.pool, &employee_id).await?);

    if form_ids.is_empty() {
        return Ok(Json(Vec::new()));
    }
    let ids: Vec<i64> = form_ids.into_iter().collect();
    let rows = db::recent_activity_for_forms(&state.pool, &ids, RECENT_LIMIT).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

async fn form_activity(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
    Path(form_id): Path<i64>,
) -> Result<Json<Vec<ActivityDto>>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    let form = db::find_form(&state.pool, form_id)
        .await?
        .ok_or(DomainError::NotFound)?;

    let allowed = employee.role == Role::Owner
        || form.owner_employee_id == employee_id
        || FormContent::decode(&form.form_content)
            .map(|c| c.is_participant(&employee_id))
            .unwrap_or(false);
    if !allowed {
        return Err(DomainError::Forbidden.into());
    }

    let rows = db::activity_for_form(&state.pool, form_id).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Records that an employee opened a fresh record on a form. The client
/// calls this when a new record id is minted, before any field is saved.
async fn log_add_record(
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

    db::insert_activity(
        &state.pool,
        "ADD_RECORD",
        Some(form.id),
        &form.title,
        &employee_id,
        &employee.employee_name,
    )
    .await?;

    Ok(Json(serde_json::json!({ "logged": true })))
}
