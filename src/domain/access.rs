//! Access resolution and level gating. Pure functions over the decoded form
//! content and the stored response rows; safe to call concurrently.

use std::collections::HashSet;

use crate::db::ResponseRow;
use crate::domain::content::{decode_field_responses, FormContent};
use crate::domain::error::DomainError;
use crate::domain::models::Role;

/// What a given employee may see and do on a form right now. Recomputed on
/// every read; never stored.
#[derive(Debug, Clone)]
pub struct ResolvedAccess {
    pub accessible_field_ids: Vec<String>,
    pub can_fill_current_level: bool,
}

/// Position of the employee's highest-priority level in the priority order.
/// Lower index = higher priority; the name follows the index value.
pub fn lowest_priority_index(content: &FormContent, employee_levels: &[i32]) -> Option<usize> {
    employee_levels
        .iter()
        .filter_map(|level| {
            content
                .level_priority_order
                .iter()
                .position(|entry| entry == level)
        })
        .min()
}

/// Field ids with at least one stored response anywhere in the form.
/// Rows whose payload fails to decode are skipped, not fatal.
pub fn responded_field_ids(rows: &[ResponseRow]) -> HashSet<String> {
    let mut responded = HashSet::new();
    for row in rows {
        match decode_field_responses(&row.responses) {
            Ok(field_responses) => {
                responded.extend(field_responses.into_iter().map(|fr| fr.field_id));
            }
            Err(e) => {
                tracing::warn!("Skipping undecodable response row {}: {}", row.id, e);
            }
        }
    }
    responded
}

/// Whether the level at `priority_index` is unlocked: every field owned by a
/// level that outranks it has received at least one response.
///
/// The gate is global across records — any response anywhere in the form
/// satisfies it for a field id. One completed higher-priority record
/// therefore unlocks every record's fill permission (documented design
/// choice, pinned by `gate_is_global_across_records`).
pub fn is_unlocked(content: &FormContent, priority_index: usize, rows: &[ResponseRow]) -> bool {
    if priority_index == 0 {
        return true;
    }

    let higher_levels = &content.level_priority_order[..priority_index];
    let higher_field_ids = content.field_ids_in_levels(higher_levels);
    if higher_field_ids.is_empty() {
        return true;
    }

    let responded = responded_field_ids(rows);
    higher_field_ids.iter().all(|id| responded.contains(id))
}

/// Resolve the accessible field set and the current-level fill permission
/// for one employee on one form.
pub fn resolve(
    employee_id: &str,
    role: Role,
    form_owner_id: &str,
    content: &FormContent,
    rows: &[ResponseRow],
) -> Result<ResolvedAccess, DomainError> {
    if role == Role::Owner || employee_id == form_owner_id {
        return Ok(ResolvedAccess {
            accessible_field_ids: content.field_ids(),
            can_fill_current_level: true,
        });
    }

    let employee_levels = content.employee_levels(employee_id);
    if employee_levels.is_empty() {
        return Err(DomainError::Forbidden);
    }

    let accessible_field_ids = content.field_ids_in_levels(&employee_levels);

    // A level absent from the priority order has no defined position; treat
    // it as locked rather than guessing.
    let can_fill_current_level = match lowest_priority_index(content, &employee_levels) {
        Some(index) => is_unlocked(content, index, rows),
        None => false,
    };

    Ok(ResolvedAccess {
        accessible_field_ids,
        can_fill_current_level,
    })
}

/// Decide whether a submission may proceed: the form must be active, the
/// submitter a participant (or bypassing), their current level unlocked, and
/// every submitted field id inside their accessible set. Everything here is
/// `Forbidden`; field ids the form does not define at all are the caller's
/// validation concern.
pub fn authorize_submission(
    employee_id: &str,
    role: Role,
    form_owner_id: &str,
    form_is_active: bool,
    content: &FormContent,
    submitted_field_ids: &[&str],
    rows: &[ResponseRow],
) -> Result<(), DomainError> {
    if !form_is_active {
        return Err(DomainError::Forbidden);
    }

    let resolved = resolve(employee_id, role, form_owner_id, content, rows)?;
    if !resolved.can_fill_current_level {
        return Err(DomainError::Forbidden);
    }

    let accessible: HashSet<&str> = resolved
        .accessible_field_ids
        .iter()
        .map(String::as_str)
        .collect();
    if submitted_field_ids.iter().any(|id| !accessible.contains(id)) {
        return Err(DomainError::Forbidden);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::content::Field;

    fn field(id: &str, levels: &[i32]) -> Field {
        Field {
            id: id.to_string(),
            question: format!("Question {id}"),
            field_type: "text".to_string(),
            level_numbers: levels.to_vec(),
            options: Vec::new(),
        }
    }

    fn row(id: i64, employee: &str, record: &str, payload: &str) -> ResponseRow {
        ResponseRow {
            id,
            form_id: 1,
            employee_id: employee.to_string(),
            record_id: record.to_string(),
            responses: payload.to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    fn answer(employee: &str, field_id: &str, value: &str) -> String {
        format!(
            r#"[{{"employeeId":"{employee}","employeeName":"{employee}","fieldId":"{field_id}","value":"{value}","linkedResponseId":null}}]"#
        )
    }

    fn three_level_content() -> FormContent {
        FormContent {
            fields: vec![field("f1", &[1]), field("f2", &[2]), field("f3", &[3])],
            level_assignments: BTreeMap::from([
                (1, vec!["alice".to_string()]),
                (2, vec!["bob".to_string()]),
                (3, vec!["carol".to_string()]),
            ]),
            level_priority_order: vec![1, 2, 3],
        }
    }

    #[test]
    fn owner_role_sees_everything_regardless_of_assignments() {
        let content = three_level_content();
        let access = resolve("nobody", Role::Owner, "alice", &content, &[]).unwrap();
        assert_eq!(access.accessible_field_ids, vec!["f1", "f2", "f3"]);
        assert!(access.can_fill_current_level);
    }

    #[test]
    fn form_creator_gets_the_same_bypass() {
        let content = three_level_content();
        let access = resolve("dave", Role::Employee, "dave", &content, &[]).unwrap();
        assert_eq!(access.accessible_field_ids, vec!["f1", "f2", "f3"]);
        assert!(access.can_fill_current_level);
    }

    #[test]
    fn unassigned_employee_is_forbidden() {
        let content = three_level_content();
        assert!(matches!(
            resolve("mallory", Role::Employee, "owner", &content, &[]),
            Err(DomainError::Forbidden)
        ));
    }

    #[test]
    fn top_priority_level_is_always_unlocked() {
        let content = three_level_content();
        let access = resolve("alice", Role::Employee, "owner", &content, &[]).unwrap();
        assert_eq!(access.accessible_field_ids, vec!["f1"]);
        assert!(access.can_fill_current_level);
    }

    #[test]
    fn level_three_unlocks_only_after_levels_one_and_two_answered() {
        let content = three_level_content();

        let access = resolve("carol", Role::Employee, "owner", &content, &[]).unwrap();
        assert!(!access.can_fill_current_level);

        // Only level 1 answered: still locked.
        let rows = vec![row(1, "alice", "r1", &answer("alice", "f1", "ok"))];
        let access = resolve("carol", Role::Employee, "owner", &content, &rows).unwrap();
        assert!(!access.can_fill_current_level);

        // Levels 1 and 2 answered: unlocked.
        let rows = vec![
            row(1, "alice", "r1", &answer("alice", "f1", "ok")),
            row(2, "bob", "r1", &answer("bob", "f2", "ok")),
        ];
        let access = resolve("carol", Role::Employee, "owner", &content, &rows).unwrap();
        assert!(access.can_fill_current_level);
    }

    #[test]
    fn gate_is_vacuously_open_when_higher_levels_own_no_fields() {
        let mut content = three_level_content();
        // Reassign every field to level 3: levels 1 and 2 have nothing to
        // wait for.
        for f in &mut content.fields {
            f.level_numbers = vec![3];
        }
        assert!(is_unlocked(&content, 2, &[]));
    }

    #[test]
    fn gate_is_global_across_records() {
        // Documented behavior, not an accident: an answer to f1 in record
        // r1 unlocks level 2 for record r2 as well.
        let content = three_level_content();
        let rows = vec![row(1, "alice", "r1", &answer("alice", "f1", "ok"))];
        assert!(is_unlocked(&content, 1, &rows));
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let content = three_level_content();
        let rows = vec![
            row(1, "alice", "r1", "{{{ not json"),
            row(2, "alice", "r2", &answer("alice", "f1", "ok")),
        ];
        assert!(is_unlocked(&content, 1, &rows));
        // A malformed row alone satisfies nothing.
        let rows = vec![row(1, "alice", "r1", "{{{ not json")];
        assert!(!is_unlocked(&content, 1, &rows));
    }

    #[test]
    fn locked_level_submission_is_forbidden_until_higher_levels_answer() {
        let content = three_level_content();

        // Nothing answered yet: bob on level 2 may not write f2.
        assert!(matches!(
            authorize_submission("bob", Role::Employee, "owner", true, &content, &["f2"], &[]),
            Err(DomainError::Forbidden)
        ));

        // After alice answers f1, bob's level unlocks.
        let rows = vec![row(1, "alice", "r1", &answer("alice", "f1", "ok"))];
        assert!(
            authorize_submission("bob", Role::Employee, "owner", true, &content, &["f2"], &rows)
                .is_ok()
        );
    }

    #[test]
    fn submission_outside_the_accessible_field_set_is_forbidden() {
        let content = three_level_content();
        // alice sits on level 1; f2 belongs to level 2.
        assert!(matches!(
            authorize_submission("alice", Role::Employee, "owner", true, &content, &["f2"], &[]),
            Err(DomainError::Forbidden)
        ));
    }

    #[test]
    fn inactive_form_rejects_submissions_even_from_unlocked_levels() {
        let content = three_level_content();
        assert!(matches!(
            authorize_submission("alice", Role::Employee, "owner", false, &content, &["f1"], &[]),
            Err(DomainError::Forbidden)
        ));
    }

    #[test]
    fn owner_submission_bypasses_the_gate_but_not_an_inactive_form() {
        let content = three_level_content();
        assert!(
            authorize_submission("nobody", Role::Owner, "alice", true, &content, &["f3"], &[])
                .is_ok()
        );
        assert!(matches!(
            authorize_submission("nobody", Role::Owner, "alice", false, &content, &["f3"], &[]),
            Err(DomainError::Forbidden)
        ));
    }

    #[test]
    fn lowest_priority_index_picks_highest_priority_level() {
        let mut content = three_level_content();
        content.level_priority_order = vec![2, 3, 1];
        // Employee on levels 1 and 3: level 3 sits at index 1, level 1 at
        // index 2 — the smaller index wins.
        assert_eq!(lowest_priority_index(&content, &[1, 3]), Some(1));
        assert_eq!(lowest_priority_index(&content, &[]), None);
    }
}
