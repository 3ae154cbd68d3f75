//! The higher-priority view: per relevant field, the latest answer from
//! every *other* employee at or above the viewer's level, shown to the
//! viewer for context but never for editing.

use std::collections::HashMap;

use crate::db::ResponseRow;
use crate::domain::access::lowest_priority_index;
use crate::domain::content::{decode_field_responses, FieldResponse, FormContent};

/// Build the field id → latest responses map for a non-owner viewer.
///
/// Rows may arrive in any order; they are sorted newest first by
/// `(created_at, id)` here rather than trusting storage ordering, and the
/// first occurrence per employee per field wins. The viewer's own rows are
/// excluded — the view is about what was entered by others. `names` maps
/// employee ids to display names; unknown ids fall back to the id itself.
pub fn higher_priority_view(
    viewer_id: &str,
    content: &FormContent,
    employee_levels: &[i32],
    rows: &[ResponseRow],
    names: &HashMap<String, String>,
) -> HashMap<String, Vec<FieldResponse>> {
    let Some(viewer_index) = lowest_priority_index(content, employee_levels) else {
        return HashMap::new();
    };

    let order = &content.level_priority_order;
    let relevant_levels = &order[..(viewer_index + 1).min(order.len())];
    let relevant_field_ids = content.field_ids_in_levels(relevant_levels);

    let mut ordered: Vec<&ResponseRow> = rows.iter().collect();
    ordered.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

    // employee id -> field id -> their latest response for that field
    let mut latest: HashMap<String, HashMap<String, FieldResponse>> = HashMap::new();

    for row in ordered {
        if row.employee_id == viewer_id {
            continue;
        }
        let field_responses = match decode_field_responses(&row.responses) {
            Ok(frs) => frs,
            Err(e) => {
                tracing::warn!("Skipping undecodable response row {}: {}", row.id, e);
                continue;
            }
        };

        let per_employee = latest.entry(row.employee_id.clone()).or_default();
        for fr in field_responses {
            if !relevant_field_ids.contains(&fr.field_id) {
                continue;
            }
            // Newest-first scan: the first entry seen per field is the
            // latest one.
            per_employee.entry(fr.field_id.clone()).or_insert(FieldResponse {
                employee_id: row.employee_id.clone(),
                employee_name: names
                    .get(&row.employee_id)
                    .cloned()
                    .unwrap_or_else(|| row.employee_id.clone()),
                field_id: fr.field_id,
                value: fr.value,
                linked_response_id: fr.linked_response_id,
            });
        }
    }

    let mut view: HashMap<String, Vec<FieldResponse>> = HashMap::new();
    for per_employee in latest.into_values() {
        for (field_id, fr) in per_employee {
            view.entry(field_id).or_default().push(fr);
        }
    }
    for responses in view.values_mut() {
        responses.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
    }
    view
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, Utc};

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

    fn content() -> FormContent {
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

    fn row(id: i64, employee: &str, record: &str, age_minutes: i64, payload: &str) -> ResponseRow {
        ResponseRow {
            id,
            form_id: 1,
            employee_id: employee.to_string(),
            record_id: record.to_string(),
            responses: payload.to_string(),
            created_at: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    fn answer(employee: &str, field_id: &str, value: &str) -> String {
        format!(
            r#"[{{"employeeId":"{employee}","employeeName":"{employee}","fieldId":"{field_id}","value":"{value}"}}]"#
        )
    }

    fn names() -> HashMap<String, String> {
        HashMap::from([
            ("alice".to_string(), "Alice".to_string()),
            ("bob".to_string(), "Bob".to_string()),
        ])
    }

    #[test]
    fn viewer_sees_higher_priority_answers() {
        // After alice answers f1, bob's view must show alice's value
        // under f1.
        let rows = vec![row(1, "alice", "r1", 10, &answer("alice", "f1", "ok"))];
        let view = higher_priority_view("bob", &content(), &[2], &rows, &names());

        let f1 = view.get("f1").expect("f1 present");
        assert_eq!(f1.len(), 1);
        assert_eq!(f1[0].employee_id, "alice");
        assert_eq!(f1[0].employee_name, "Alice");
        assert_eq!(f1[0].value, "ok");
    }

    #[test]
    fn viewer_own_rows_are_excluded() {
        let rows = vec![
            row(1, "alice", "r1", 10, &answer("alice", "f1", "from-alice")),
            row(2, "bob", "r2", 5, &answer("bob", "f2", "from-bob")),
        ];
        let view = higher_priority_view("bob", &content(), &[2], &rows, &names());
        assert!(view.contains_key("f1"));
        assert!(!view.contains_key("f2"));
    }

    #[test]
    fn fields_below_the_viewer_are_not_relevant() {
        let rows = vec![row(1, "carol", "r1", 10, &answer("carol", "f3", "later"))];
        let view = higher_priority_view("bob", &content(), &[2], &rows, &names());
        assert!(view.is_empty());
    }

    #[test]
    fn latest_record_wins_per_employee_per_field() {
        let rows = vec![
            row(1, "alice", "r1", 60, &answer("alice", "f1", "stale")),
            row(2, "alice", "r2", 5, &answer("alice", "f1", "fresh")),
        ];
        // Pass in storage order oldest-first on purpose: the builder must
        // sort, not trust the caller.
        let view = higher_priority_view("bob", &content(), &[2], &rows, &names());
        let f1 = view.get("f1").unwrap();
        assert_eq!(f1.len(), 1);
        assert_eq!(f1[0].value, "fresh");
    }

    #[test]
    fn one_entry_per_responding_employee() {
        let dave_answer = answer("dave", "f1", "also");
        let mut c = content();
        c.level_assignments
            .get_mut(&1)
            .unwrap()
            .push("dave".to_string());
        let rows = vec![
            row(1, "alice", "r1", 10, &answer("alice", "f1", "ok")),
            row(2, "dave", "r2", 5, &dave_answer),
        ];
        let view = higher_priority_view("bob", &c, &[2], &rows, &names());
        let f1 = view.get("f1").unwrap();
        assert_eq!(f1.len(), 2);
        assert_eq!(f1[0].employee_id, "alice");
        assert_eq!(f1[1].employee_id, "dave");
        // No display name on file for dave: fall back to the id.
        assert_eq!(f1[1].employee_name, "dave");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let rows = vec![
            row(1, "alice", "r1", 10, "%%% broken"),
            row(2, "alice", "r2", 5, &answer("alice", "f1", "ok")),
        ];
        let view = higher_priority_view("bob", &content(), &[2], &rows, &names());
        assert_eq!(view.get("f1").unwrap()[0].value, "ok");
    }

    #[test]
    fn no_levels_means_empty_view() {
        let rows = vec![row(1, "alice", "r1", 10, &answer("alice", "f1", "ok"))];
        let view = higher_priority_view("mallory", &content(), &[], &rows, &names());
        assert!(view.is_empty());
    }
}
