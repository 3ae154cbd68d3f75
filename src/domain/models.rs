use serde::{Deserialize, Serialize};

/// OWNER bypasses level gating and field visibility on every form; the
/// creator of a specific form gets the same bypass for that form only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "employee_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Employee,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "EMPLOYEE",
            Role::Owner => "OWNER",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "EMPLOYEE" => Ok(Role::Employee),
            "OWNER" => Ok(Role::Owner),
            _ => Err(()),
        }
    }
}
