pub mod seed;

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use crate::domain::models::Role;

#[derive(Debug, Clone, FromRow)]
pub struct Employee {
    pub employee_id: String,
    pub employee_name: String,
    pub department: String,
    pub role: Role,
    pub hash: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FormRow {
    pub id: i64,
    pub title: String,
    pub form_content: String,
    pub owner_employee_id: String,
    pub num_levels: i32,
    pub is_active: bool,
}

/// One logical record of a form. `responses` is the JSON-encoded array of
/// field responses; it is decoded fresh wherever it is read.
#[derive(Debug, Clone, FromRow)]
pub struct ResponseRow {
    pub id: i64,
    pub form_id: i64,
    pub employee_id: String,
    pub record_id: String,
    pub responses: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub action_type: String,
    pub form_id: Option<i64>,
    pub form_title: String,
    pub employee_id: String,
    pub employee_name: String,
    pub timestamp: DateTime<Utc>,
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

// ---- employees ----

pub async fn find_employee(pool: &PgPool, employee_id: &str) -> Result<Option<Employee>> {
    let employee = sqlx::query_as::<_, Employee>(
        r#"
        SELECT employee_id, employee_name, department, role, hash
        FROM employees
        WHERE employee_id = $1
        "#,
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?;
    Ok(employee)
}

pub async fn list_employees(pool: &PgPool) -> Result<Vec<Employee>> {
    let employees = sqlx::query_as::<_, Employee>(
        r#"
        SELECT employee_id, employee_name, department, role, hash
        FROM employees
        ORDER BY employee_id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(employees)
}

/// Display-name lookup used when attributing responses.
pub async fn employee_names(pool: &PgPool) -> Result<HashMap<String, String>> {
    let employees = list_employees(pool).await?;
    Ok(employees
        .into_iter()
        .map(|e| (e.employee_id, e.employee_name))
        .collect())
}

pub async fn count_employees(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn insert_employee(
    pool: &PgPool,
    employee_id: &str,
    employee_name: &str,
    department: &str,
    role: Role,
    hash: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO employees (employee_id, employee_name, department, role, hash)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (employee_id) DO NOTHING
        "#,
    )
    .bind(employee_id)
    .bind(employee_name)
    .bind(department)
    .bind(role)
    .bind(hash)
    .execute(pool)
    .await?;
    Ok(())
}

// ---- forms ----

pub async fn insert_form(
    pool: &PgPool,
    title: &str,
    form_content: &str,
    owner_employee_id: &str,
    num_levels: i32,
) -> Result<FormRow> {
    let form = sqlx::query_as::<_, FormRow>(
        r#"
        INSERT INTO forms (title, form_content, owner_employee_id, num_levels)
        VALUES ($1, $2, $3, $4)
        RETURNING id, title, form_content, owner_employee_id, num_levels, is_active
        "#,
    )
    .bind(title)
    .bind(form_content)
    .bind(owner_employee_id)
    .bind(num_levels)
    .fetch_one(pool)
    .await?;
    Ok(form)
}

pub async fn find_form(pool: &PgPool, form_id: i64) -> Result<Option<FormRow>> {
    let form = sqlx::query_as::<_, FormRow>(
        r#"
        SELECT id, title, form_content, owner_employee_id, num_levels, is_active
        FROM forms
        WHERE id = $1
        "#,
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?;
    Ok(form)
}

pub async fn list_forms(pool: &PgPool) -> Result<Vec<FormRow>> {
    let forms = sqlx::query_as::<_, FormRow>(
        r#"
        SELECT id, title, form_content, owner_employee_id, num_levels, is_active
        FROM forms
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(forms)
}

pub async fn set_form_active(pool: &PgPool, form_id: i64, active: bool) -> Result<Option<FormRow>> {
    let form = sqlx::query_as::<_, FormRow>(
        r#"
        UPDATE forms
        SET is_active = $2
        WHERE id = $1
        RETURNING id, title, form_content, owner_employee_id, num_levels, is_active
        "#,
    )
    .bind(form_id)
    .bind(active)
    .fetch_optional(pool)
    .await?;
    Ok(form)
}

/// Deletes a form and its responses together. Activity log rows keep their
/// form_id and survive.
pub async fn delete_form_with_responses(pool: &PgPool, form_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM responses WHERE form_id = $1")
        .bind(form_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM forms WHERE id = $1")
        .bind(form_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

// ---- responses ----

pub async fn responses_by_form(pool: &PgPool, form_id: i64) -> Result<Vec<ResponseRow>> {
    let rows = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, form_id, employee_id, record_id, responses, created_at
        FROM responses
        WHERE form_id = $1
        ORDER BY id
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn response_for_record(
    pool: &PgPool,
    form_id: i64,
    record_id: &str,
) -> Result<Option<ResponseRow>> {
    let row = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, form_id, employee_id, record_id, responses, created_at
        FROM responses
        WHERE form_id = $1 AND record_id = $2
        "#,
    )
    .bind(form_id)
    .bind(record_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Locking read for the merge read-modify-write. Concurrent merges on the
/// same record queue up behind the row lock instead of interleaving.
pub async fn response_for_update(
    tx: &mut Transaction<'_, Postgres>,
    form_id: i64,
    record_id: &str,
) -> Result<Option<ResponseRow>> {
    let row = sqlx::query_as::<_, ResponseRow>(
        r#"
        SELECT id, form_id, employee_id, record_id, responses, created_at
        FROM responses
        WHERE form_id = $1 AND record_id = $2
        FOR UPDATE
        "#,
    )
    .bind(form_id)
    .bind(record_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row)
}

/// Insert a new record. A concurrent insert of the same `(form_id,
/// record_id)` hits the unique index; the caller maps that to `Conflict`.
pub async fn insert_response(
    tx: &mut Transaction<'_, Postgres>,
    form_id: i64,
    employee_id: &str,
    record_id: &str,
    payload: &str,
) -> Result<ResponseRow> {
    let row = sqlx::query_as::<_, ResponseRow>(
        r#"
        INSERT INTO responses (form_id, employee_id, record_id, responses)
        VALUES ($1, $2, $3, $4)
        RETURNING id, form_id, employee_id, record_id, responses, created_at
        "#,
    )
    .bind(form_id)
    .bind(employee_id)
    .bind(record_id)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

pub async fn update_response_payload(
    tx: &mut Transaction<'_, Postgres>,
    response_id: i64,
    payload: &str,
) -> Result<ResponseRow> {
    let row = sqlx::query_as::<_, ResponseRow>(
        r#"
        UPDATE responses
        SET responses = $2, created_at = now()
        WHERE id = $1
        RETURNING id, form_id, employee_id, record_id, responses, created_at
        "#,
    )
    .bind(response_id)
    .bind(payload)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row)
}

pub async fn delete_response(tx: &mut Transaction<'_, Postgres>, response_id: i64) -> Result<()> {
    sqlx::query("DELETE FROM responses WHERE id = $1")
        .bind(response_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_record(pool: &PgPool, form_id: i64, record_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM responses WHERE form_id = $1 AND record_id = $2")
        .bind(form_id)
        .bind(record_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ---- activity log ----

pub async fn insert_activity(
    pool: &PgPool,
    action_type: &str,
    form_id: Option<i64>,
    form_title: &str,
    employee_id: &str,
    employee_name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (action_type, form_id, form_title, employee_id, employee_name)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(action_type)
    .bind(form_id)
    .bind(form_title)
    .bind(employee_id)
    .bind(employee_name)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn recent_activity(pool: &PgPool, limit: i64) -> Result<Vec<ActivityRow>> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"
        SELECT id, action_type, form_id, form_title, employee_id, employee_name, timestamp
        FROM activity_log
        WHERE action_type <> 'VIEW'
        ORDER BY timestamp DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_activity_for_forms(
    pool: &PgPool,
    form_ids: &[i64],
    limit: i64,
) -> Result<Vec<ActivityRow>> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"
        SELECT id, action_type, form_id, form_title, employee_id, employee_name, timestamp
        FROM activity_log
        WHERE form_id = ANY($1) AND action_type <> 'VIEW'
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(form_ids)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn activity_for_form(pool: &PgPool, form_id: i64) -> Result<Vec<ActivityRow>> {
    let rows = sqlx::query_as::<_, ActivityRow>(
        r#"
        SELECT id, action_type, form_id, form_title, employee_id, employee_name, timestamp
        FROM activity_log
        WHERE form_id = $1
        ORDER BY timestamp DESC
        "#,
    )
    .bind(form_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Forms an employee has ever acted on, per the activity trail. Keeps
/// historical activity visible after an employee is unassigned.
pub async fn form_ids_touched_by(pool: &PgPool, employee_id: &str) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT DISTINCT form_id
        FROM activity_log
        WHERE employee_id = $1 AND form_id IS NOT NULL
        "#,
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}
