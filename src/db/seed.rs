use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use sqlx::PgPool;

use crate::db;
use crate::domain::models::Role;

struct SeedEmployee<'a> {
    employee_id: &'a str,
    name: &'a str,
    department: &'a str,
    role: Role,
    password: &'a str,
}

/// First-boot employee directory. Only runs against an empty table so a
/// redeploy never resets changed passwords.
pub async fn seed_employees(pool: &PgPool) -> Result<()> {
    if db::count_employees(pool).await? > 0 {
        return Ok(());
    }

    let employees = vec![
        SeedEmployee {
            employee_id: "E100",
            name: "Priya Sharma",
            department: "Operations",
            role: Role::Owner,
            password: "owner123",
        },
        SeedEmployee {
            employee_id: "E101",
            name: "Arjun Mehta",
            department: "Finance",
            role: Role::Employee,
            password: "password123",
        },
        SeedEmployee {
            employee_id: "E102",
            name: "Kavya Nair",
            department: "Finance",
            role: Role::Employee,
            password: "password123",
        },
        SeedEmployee {
            employee_id: "E103",
            name: "Rohan Gupta",
            department: "Procurement",
            role: Role::Employee,
            password: "password123",
        },
        SeedEmployee {
            employee_id: "E104",
            name: "Sneha Iyer",
            department: "HR",
            role: Role::Employee,
            password: "password123",
        },
    ];

    let argon = Argon2::default();
    for employee in employees {
        let salt = SaltString::generate(rand_core::OsRng);
        let hash = argon
            .hash_password(employee.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        db::insert_employee(
            pool,
            employee.employee_id,
            employee.name,
            employee.department,
            employee.role,
            &hash,
        )
        .await?;
    }

    tracing::info!("Seeded initial employee directory");
    Ok(())
}
