use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A non-working day. `department_id = None` applies to everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Holiday {
    pub id: u64,
    #[schema(example = "Independence Day")]
    pub name: String,
    #[schema(value_type = String, format = "date")]
    pub date: NaiveDate,
    pub department_id: Option<u64>,
}

impl Holiday {
    pub fn applies_to(&self, department_id: Option<u64>) -> bool {
        match self.department_id {
            None => true,
            Some(dept) => department_id == Some(dept),
        }
    }
}
