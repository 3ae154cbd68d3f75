use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::db;
use crate::domain::error::DomainError;
use crate::domain::models::Role;
use crate::state::SharedState;
use crate::web::error::ApiError;
use crate::web::session::EmployeeSession;

/// Directory entry without the credential hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeDto {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub role: Role,
}

impl From<db::Employee> for EmployeeDto {
    fn from(e: db::Employee) -> Self {
        EmployeeDto {
            employee_id: e.employee_id,
            employee_name: e.employee_name,
            department: e.department,
            role: e.role,
        }
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/employee/profile", get(profile))
        .route("/api/employee/all", get(all_employees))
        .with_state(state)
}

async fn profile(
    EmployeeSession(employee_id): EmployeeSession,
    State(state): State<SharedState>,
) -> Result<Json<EmployeeDto>, ApiError> {
    let employee = db::find_employee(&state.pool, &employee_id)
        .await?
        .ok_or(DomainError::NotFound)?;
    Ok(Json(employee.into()))
}

async fn all_employees(
    EmployeeSession(_): EmployeeSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<EmployeeDto>>, ApiError> {
    let employees = db::list_employees(&state.pool).await?;
    Ok(Json(employees.into_iter().map(Into::into).collect()))
}
