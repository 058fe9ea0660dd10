use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use utoipa::ToSchema;

/// Employee master row from the read-only c3ais database.
///
/// This service never writes to c3ais; the row is a directory lookup used for
/// profile display and for resolving the trusted reference photo.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "employee_id": 10023,
    "employee_name": "Budi Santoso",
    "department_name": "Information Technology",
    "position_name": "Software Engineer",
    "identity_file_name": "photos/10023.jpg"
}))]
pub struct C3aisEmployee {
    #[schema(example = 10023)]
    pub employee_id: u64,
    #[schema(example = "Budi Santoso")]
    pub employee_name: String,
    #[schema(example = "Information Technology", nullable = true)]
    pub department_name: Option<String>,
    #[schema(example = "Software Engineer", nullable = true)]
    pub position_name: Option<String>,
    /// Relative path of the enrolled reference photo, if any.
    #[schema(example = "photos/10023.jpg", nullable = true)]
    pub identity_file_name: Option<String>,
}

pub async fn find_by_id(
    c3ais: &MySqlPool,
    employee_id: u64,
) -> Result<Option<C3aisEmployee>, sqlx::Error> {
    sqlx::query_as::<_, C3aisEmployee>(
        r#"
        SELECT employee_id, employee_name, department_name, position_name, identity_file_name
        FROM ki_employee
        WHERE employee_id = ?
        "#,
    )
    .bind(employee_id)
    .fetch_optional(c3ais)
    .await
}

/// Reference photo path for face comparison, if the employee has one enrolled.
pub async fn reference_photo(
    c3ais: &MySqlPool,
    employee_id: u64,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<String>>(
        r#"SELECT identity_file_name FROM ki_employee WHERE employee_id = ?"#,
    )
    .bind(employee_id)
    .fetch_optional(c3ais)
    .await
    .map(|row| row.flatten())
}
