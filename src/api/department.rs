use serde::{Deserialize, Serialize};

use crate::db;

pub use crate::db::department::Id;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: Id,
    pub name: String,
    pub is_specific: bool,
}

impl From<db::Department> for Department {
    fn from(department: db::Department) -> Self {
        Self {
            id: department.id,
            name: department.name,
            is_specific: department.is_specific,
        }
    }
}
