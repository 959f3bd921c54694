use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Directory view of an employee, attached to attendance and leave rows at
/// read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1000,
        "employee_code": "EMP-001",
        "first_name": "John",
        "last_name": "Doe",
        "department_id": 10,
        "status": "active"
    })
)]
pub struct EmployeeProfile {
    #[schema(example = 1000)]
    pub id: u64,

    #[schema(example = "EMP-001")]
    pub employee_code: String,

    #[schema(example = "John")]
    pub first_name: String,

    #[schema(example = "Doe")]
    pub last_name: String,

    #[schema(example = 10)]
    pub department_id: u64,

    #[schema(example = "active")]
    pub status: String,
}
