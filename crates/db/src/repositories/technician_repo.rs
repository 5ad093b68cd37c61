//! Repository for the `technicians` table.

use fieldops_core::types::DbId;
use sqlx::PgPool;

use crate::models::technician::{CreateTechnician, Technician};

/// Column list for `technicians` queries.
const COLUMNS: &str = "id, handle, name, is_active, is_admin, created_at, updated_at";

pub struct TechnicianRepo;

impl TechnicianRepo {
    /// Register a technician.
    pub async fn create(pool: &PgPool, input: &CreateTechnician) -> Result<Technician, sqlx::Error> {
        let query = format!(
            "INSERT INTO technicians (handle, name, is_active, is_admin) \
             VALUES ($1, $2, COALESCE($3, true), COALESCE($4, false)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Technician>(&query)
            .bind(&input.handle)
            .bind(&input.name)
            .bind(input.is_active)
            .bind(input.is_admin)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Technician>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM technicians WHERE id = $1");
        sqlx::query_as::<_, Technician>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a technician by their messaging-channel handle.
    pub async fn find_by_handle(
        pool: &PgPool,
        handle: &str,
    ) -> Result<Option<Technician>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM technicians WHERE handle = $1");
        sqlx::query_as::<_, Technician>(&query)
            .bind(handle)
            .fetch_optional(pool)
            .await
    }
}
